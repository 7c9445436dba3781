//! Failure taxonomies for the network core and HTTP pipeline.
//!
//! Transient I/O failures are logged at the step where they occur and consumed
//! there; they abort the request chain and never cross the asynchronous
//! boundary back to the caller.

use std::io;

use thiserror::Error;

/// Errors produced while decoding an HTTP response from the wire.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed status line")]
    BadStatusLine,

    #[error("malformed header line")]
    BadHeader,

    #[error("invalid content length")]
    BadContentLength,

    #[error("malformed chunked encoding")]
    BadChunk,

    #[error("connection closed before the response completed")]
    UnexpectedEof,
}

/// A failed step of the asynchronous request pipeline.
///
/// Each variant corresponds to one step of the chain; whichever step fails
/// aborts the whole request at that point.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("address resolution failed: {0}")]
    Resolve(io::Error),

    #[error("connect failed: {0}")]
    Connect(io::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(io::Error),

    #[error("request write failed: {0}")]
    Write(io::Error),

    #[error("response read failed: {0}")]
    Read(io::Error),

    #[error("response parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("request timed out")]
    Timeout,
}
