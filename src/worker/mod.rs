//! Tracked, cooperatively-cancellable worker threads.
//!
//! A [`Worker`] owns one OS thread. The thread registers itself (and its
//! parent/child relationship) in a [`ThreadRegistry`] when its body starts and
//! deregisters when the body returns, so the registry's tree always reflects
//! the live threads. Dropping the owning handle requests cooperative
//! cancellation through the worker's stop event and joins the thread.
//!
//! Bodies that are meant to be stoppable must include their stop event (or
//! rely on the hub's exit-all broadcast) in every wait; a body that blocks on
//! unrelated signals forever will block the join forever. That is a caller
//! contract, not something the wrapper defends against.

pub mod registry;

use crate::sync::event::{Event, ResetPolicy};
use crate::sync::hub::Hub;
use crate::worker::registry::{ThreadRegistry, current_thread_id};

use std::panic::Location;
use std::thread::JoinHandle;

use tracing::{debug, error};

/// Cooperative cancellation signal handed to a worker body.
#[derive(Clone)]
pub struct StopToken {
    event: Event,
}

impl StopToken {
    /// The stop event itself, for inclusion in a multi-event wait.
    pub fn event(&self) -> Event {
        self.event.clone()
    }

    /// Whether stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.event.is_set()
    }
}

/// Owning handle to a tracked worker thread.
///
/// The last thing that happens to a worker is its handle being dropped:
/// that requests cancellation and blocks until the thread body returns, so a
/// worker never outlives its owner.
///
/// # Example
/// ```ignore
/// let worker = Worker::spawn(&registry, &hub, "poller", move |stop| {
///     loop {
///         match hub.wait(&[tick.clone(), stop.event()], None) {
///             WaitOutcome::Signaled(0) => poll_once(),
///             _ => break,
///         }
///     }
/// });
/// drop(worker); // requests stop, joins
/// ```
pub struct Worker {
    name: String,
    stop: Event,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a tracked thread running `body(stop_token)`.
    ///
    /// The spawning thread is recorded as the parent; if it is itself
    /// untracked, the worker is linked under the registry's root. The worker's
    /// platform thread id is assigned once the body starts running.
    #[track_caller]
    pub fn spawn<F>(registry: &ThreadRegistry, hub: &Hub, name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let name = name.into();
        let location = Location::caller();
        let stop = hub.event(format!("{name}::stop"), ResetPolicy::Manual);
        let token = StopToken { event: stop.clone() };
        let parent = current_thread_id();
        let registry = registry.clone();
        let registered_name = name.clone();

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let id = current_thread_id();
                registry.register(id, parent, registered_name, location.file(), location.line());
                // Deregisters even if the body unwinds.
                let _deregister = Deregister {
                    registry: registry.clone(),
                    id,
                };
                body(token);
            })
            .expect("failed to spawn worker thread");

        debug!(worker = %name, "worker spawned");
        Self {
            name,
            stop,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests cooperative cancellation without joining.
    pub fn request_stop(&self) {
        self.stop.set();
    }

    /// The worker's stop event.
    pub fn stop_event(&self) -> Event {
        self.stop.clone()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop.set();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                // No supervision policy exists for worker bodies; a panicking
                // body takes the process down at join.
                error!(worker = %self.name, "worker thread panicked");
                std::process::abort();
            }
            debug!(worker = %self.name, "worker joined");
        }
    }
}

struct Deregister {
    registry: ThreadRegistry,
    id: i32,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
