//! Pooled asynchronous network core.
//!
//! - [`core`]: [`NetCore`], the reactor plus its worker pool and wake/exit
//!   protocol
//! - [`reactor`]: shared job queue, readiness interests, and timers driven by
//!   whichever pool worker runs it
//! - [`poller`]: epoll/eventfd/timerfd wrappers
//! - [`socket`]: non-blocking socket operations over raw file descriptors
//! - [`tls`]: trust-store loading and client TLS configuration
//!
//! [`NetCore`]: core::NetCore

pub mod core;
pub(crate) mod poller;
pub(crate) mod reactor;
pub(crate) mod socket;
pub(crate) mod tls;
