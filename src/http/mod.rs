//! HTTP client pipeline and wire codec.
//!
//! - [`message`]: [`Method`], [`Request`], [`Response`] and request encoding
//! - [`parse`]: incremental response parser (Content-Length, chunked, and
//!   EOF-delimited framing)
//! - [`url`]: percent-encoding of request targets
//! - [`client`]: [`Client`], the per-connection asynchronous request/response
//!   state machine
//!
//! [`Method`]: message::Method
//! [`Request`]: message::Request
//! [`Response`]: message::Response
//! [`Client`]: client::Client

pub mod client;
pub mod message;
pub mod parse;
pub mod url;
