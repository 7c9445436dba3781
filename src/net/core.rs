//! The pooled network core.

use crate::net::reactor::Reactor;
use crate::net::tls;
use crate::sync::event::{Event, ResetPolicy};
use crate::sync::hub::{Hub, WaitOutcome};
use crate::worker::registry::ThreadRegistry;
use crate::worker::{StopToken, Worker};

use std::mem;
use std::sync::{Arc, Mutex};

use rustls::RootCertStore;
use tracing::{debug, warn};

/// Shared asynchronous I/O core: one reactor plus a fixed pool of tracked
/// workers that drive it.
///
/// Each pool worker alternates between waiting on `{wake, exit, stop}` and
/// driving the reactor until it runs out of ready work. [`NetCore::wake_up`]
/// is signaled by every asynchronous step of every pipeline, so parked
/// workers resume draining the reactor promptly rather than polling.
///
/// The core is an explicitly constructed, shared object: build exactly one,
/// hand `Arc` clones to whatever creates clients, and call [`NetCore::exit`]
/// to tear it down deterministically.
///
/// # Example
/// ```ignore
/// let hub = Hub::new();
/// let registry = ThreadRegistry::new();
/// let core = NetCore::start(&hub, &registry, 4).expect("thread count > 0");
///
/// let client = Client::new(core.clone(), "example.com", 443, true, false);
/// // ... issue requests ...
///
/// core.exit();
/// ```
pub struct NetCore {
    hub: Hub,
    reactor: Arc<Reactor>,
    workers: Mutex<Vec<Worker>>,
    wake: Event,
    exit: Event,
    certificates: Vec<u8>,
    roots: Arc<RootCertStore>,
}

impl NetCore {
    /// Constructs the core with a pool of `thread_count` workers.
    ///
    /// A zero thread count is a configuration error and yields `None` rather
    /// than a crash or an empty pool.
    pub fn start(hub: &Hub, registry: &ThreadRegistry, thread_count: usize) -> Option<Arc<Self>> {
        if thread_count == 0 {
            warn!("network core requested with zero threads; no instance created");
            return None;
        }

        let reactor = match Reactor::new() {
            Ok(reactor) => Arc::new(reactor),
            Err(err) => {
                warn!(%err, "network core could not create its reactor");
                return None;
            }
        };

        let (certificates, roots) = tls::load_trust_store();

        let core = Arc::new(Self {
            hub: hub.clone(),
            reactor,
            workers: Mutex::new(Vec::with_capacity(thread_count)),
            wake: hub.event("net::core::wake", ResetPolicy::Auto),
            exit: hub.event("net::core::exit", ResetPolicy::Manual),
            certificates,
            roots: Arc::new(roots),
        });

        debug!(thread_count, "network core starting");
        let mut workers = core.workers.lock().unwrap();
        for i in 0..thread_count {
            let worker_core = Arc::clone(&core);
            workers.push(Worker::spawn(
                registry,
                hub,
                format!("net::core::{i}"),
                move |stop| worker_core.worker_loop(stop),
            ));
        }
        drop(workers);

        Some(core)
    }

    fn worker_loop(&self, stop: StopToken) {
        let signals = [self.wake.clone(), self.exit.clone(), stop.event()];
        loop {
            match self.hub.wait(&signals, None) {
                WaitOutcome::Signaled(0) => self.reactor.run(),
                _ => break,
            }
        }
    }

    /// Signals the wake event so parked pool workers resume draining the
    /// reactor. Called by every asynchronous step of every pipeline.
    pub fn wake_up(&self) {
        self.wake.set();
    }

    /// Stops the reactor, requests cancellation on every pool worker, joins
    /// them, and clears the pool. Idempotent.
    pub fn exit(&self) {
        self.exit.set();
        self.reactor.stop();
        let workers = mem::take(&mut *self.workers.lock().unwrap());
        if !workers.is_empty() {
            debug!(count = workers.len(), "network core joining workers");
        }
        drop(workers);
    }

    /// Raw PEM bytes of the trust store loaded at construction.
    pub fn certificates(&self) -> &[u8] {
        &self.certificates
    }

    /// Number of pool workers still owned by the core.
    pub fn thread_count(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    pub(crate) fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    pub(crate) fn roots(&self) -> &Arc<RootCertStore> {
        &self.roots
    }
}

impl Drop for NetCore {
    fn drop(&mut self) {
        self.exit();
    }
}
