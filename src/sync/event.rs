//! Shared-ownership boolean signals.

use crate::sync::hub::HubShared;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// What happens to an event's value once waiters have observed it signaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// The event stays signaled until [`Event::reset`] is called.
    Manual,
    /// The event clears itself once every waiter that observed it signaled
    /// has finished consuming it.
    Auto,
}

pub(crate) struct EventInner {
    name: String,
    policy: ResetPolicy,
    value: AtomicBool,
    waiters: AtomicUsize,
    hub: Arc<HubShared>,
}

/// A named boolean signal created from a [`Hub`].
///
/// Cloning an `Event` clones a handle to the same underlying signal; any
/// number of independent subsystems may hold the same logical event, and the
/// event lives as long as its longest holder.
///
/// All value transitions go through the owning hub's lock so they stay
/// coherent with concurrent [`Hub::wait`] calls.
///
/// # Example
/// ```ignore
/// let hub = Hub::new();
/// let ready = hub.event("worker::ready", ResetPolicy::Manual);
/// ready.set();
/// assert_eq!(hub.wait(&[ready.clone()], None), WaitOutcome::Signaled(0));
/// ```
///
/// [`Hub`]: crate::sync::Hub
/// [`Hub::wait`]: crate::sync::Hub::wait
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    pub(crate) fn new(name: String, policy: ResetPolicy, hub: Arc<HubShared>) -> Self {
        Self {
            inner: Arc::new(EventInner {
                name,
                policy,
                value: AtomicBool::new(false),
                waiters: AtomicUsize::new(0),
                hub,
            }),
        }
    }

    /// The diagnostic display name. Not an identity key; two distinct events
    /// may share a name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Signals the event, waking every blocked wait that includes it.
    ///
    /// Any number of distinct multi-waits may list the same event, so all
    /// waiters are notified, not just one.
    pub fn set(&self) {
        let _guard = self.inner.hub.table.lock().unwrap();
        self.inner.value.store(true, Ordering::SeqCst);
        self.inner.hub.condvar.notify_all();
    }

    /// Clears a manual-reset event. No-op for auto-reset events, which clear
    /// themselves through waiter bookkeeping.
    pub fn reset(&self) {
        if self.inner.policy == ResetPolicy::Auto {
            return;
        }
        let _guard = self.inner.hub.table.lock().unwrap();
        self.inner.value.store(false, Ordering::SeqCst);
    }

    /// Snapshot of the current value, for diagnostics.
    pub fn is_set(&self) -> bool {
        self.inner.value.load(Ordering::SeqCst)
    }

    // Waiter bookkeeping below is only called while the hub lock is held.

    pub(crate) fn mark_waiting(&self) {
        if self.inner.policy == ResetPolicy::Auto {
            self.inner.waiters.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// The last waiter of a batch to finish consuming an auto-reset event
    /// clears its value; earlier waiters only decrement the count.
    pub(crate) fn finish_waiting(&self) {
        if self.inner.policy != ResetPolicy::Auto {
            return;
        }
        if self.inner.waiters.load(Ordering::SeqCst) > 0
            && self.inner.waiters.fetch_sub(1, Ordering::SeqCst) == 1
        {
            self.inner.value.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) fn shares_hub(&self, hub: &Arc<HubShared>) -> bool {
        Arc::ptr_eq(&self.inner.hub, hub)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.inner.name)
            .field("policy", &self.inner.policy)
            .field("value", &self.is_set())
            .finish()
    }
}
