//! Synchronization and asynchronous-I/O substrate.
//!
//! This crate provides the coordination layer an application builds on: named
//! boolean events with a multi-event wait, a coordinated global shutdown
//! broadcast, tracked worker threads with a process-wide parent/child
//! registry, and a pooled network core that drives an epoll reactor plus an
//! asynchronous HTTP client pipeline on top of it.
//!
//! # Architecture
//!
//! - **Hub**: One lock + condition variable coordinating all [`Event`]s it
//!   created, the live registry of blocked wait sites, and the exit-all
//!   broadcast
//! - **Event**: Shared-ownership manual- or auto-reset boolean signal
//! - **Worker**: Cooperatively-cancellable OS thread, registered in a
//!   [`ThreadRegistry`] tree and joined when its handle is dropped
//! - **NetCore**: Fixed pool of workers alternating between draining a shared
//!   reactor and parking on the hub until woken or told to exit
//! - **Client**: Per-connection HTTP request/response state machine
//!   (resolve, connect, optional TLS handshake, write, read) with keep-alive

pub mod error;
pub mod http;
pub mod net;
pub mod sync;
pub mod worker;

pub use error::{ParseError, PipelineError};
pub use http::client::Client;
pub use http::message::{Method, Request, Response};
pub use net::core::NetCore;
pub use sync::{Event, Hub, ResetPolicy, WaitOutcome};
pub use worker::registry::ThreadRegistry;
pub use worker::{StopToken, Worker};
