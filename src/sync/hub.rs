//! The multi-event wait coordinator.
//!
//! A [`Hub`] owns the single lock and condition variable that all of its
//! events' `set`/`reset` calls and all [`Hub::wait`] calls go through, the
//! live registry of blocked wait sites, and the exit-all broadcast. One hub is
//! one synchronization domain; an application normally constructs exactly one
//! and hands clones to its subsystems, while tests construct private hubs.

use crate::sync::event::{Event, ResetPolicy};
use crate::sync::registry::{Registration, WaitTable};

use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::info;

/// How a [`Hub::wait`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The zero-based index of the first signaled event in list order.
    /// Ties are broken by list order, not by signal time.
    Signaled(usize),
    /// The deadline elapsed with nothing signaled.
    TimedOut,
    /// The exit-all broadcast fired. Takes precedence over any signaled event.
    ExitAll,
}

pub(crate) struct HubShared {
    pub(crate) table: Mutex<WaitTable>,
    pub(crate) condvar: Condvar,
    pub(crate) exiting: AtomicBool,
}

/// Coordinator for a set of [`Event`]s and the threads waiting on them.
///
/// Cloning a `Hub` clones a handle to the same synchronization domain.
///
/// # Example
/// ```ignore
/// let hub = Hub::new();
/// let wake = hub.event("pool::wake", ResetPolicy::Auto);
/// let exit = hub.event("pool::exit", ResetPolicy::Manual);
///
/// match hub.wait(&[wake, exit], Some(Duration::from_secs(5))) {
///     WaitOutcome::Signaled(0) => { /* woken */ }
///     WaitOutcome::Signaled(_) | WaitOutcome::ExitAll => { /* shut down */ }
///     WaitOutcome::TimedOut => { /* idle tick */ }
/// }
/// ```
#[derive(Clone)]
pub struct Hub {
    shared: Arc<HubShared>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(HubShared {
                table: Mutex::new(WaitTable::new()),
                condvar: Condvar::new(),
                exiting: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a new event coordinated by this hub.
    pub fn event(&self, name: impl Into<String>, policy: ResetPolicy) -> Event {
        Event::new(name.into(), policy, self.shared.clone())
    }

    /// Blocks the calling thread until one of `events` is signaled, the
    /// exit-all broadcast fires, or `timeout` elapses (`None` waits forever).
    ///
    /// The call site is registered in the hub's diagnostic table for the
    /// duration of the wait, on every exit path; see [`Hub::wait_report`].
    ///
    /// Auto-reset fairness: before each blocking attempt every auto-reset
    /// event in the list gains a waiter; on leaving the attempt the waiter is
    /// released, and the waiter whose release empties the count clears the
    /// event. An auto-reset event is therefore never cleared while other
    /// waiters that observed it signaled are still consuming it, and is
    /// cleared exactly once per signaling pulse.
    ///
    /// `events` must be non-empty and every event must have been created by
    /// this hub.
    #[track_caller]
    pub fn wait(&self, events: &[Event], timeout: Option<Duration>) -> WaitOutcome {
        debug_assert!(!events.is_empty(), "wait requires at least one event");
        debug_assert!(
            events.iter().all(|e| e.shares_hub(&self.shared)),
            "wait on events from a different hub"
        );

        let location = Location::caller();
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let indefinite = timeout.is_none();

        // Declared before the lock guard so its removal (which re-locks the
        // table) runs after the guard is released, on every exit path.
        let _registration: Registration;
        let mut guard = self.shared.table.lock().unwrap();
        _registration = Registration::insert(self.shared.clone(), &mut guard, location, events);

        loop {
            if self.shared.exiting.load(Ordering::SeqCst) {
                return WaitOutcome::ExitAll;
            }

            for event in events {
                event.mark_waiting();
            }

            if let Some(index) = first_signaled(events) {
                release_waiters(events);
                return WaitOutcome::Signaled(index);
            }

            let shared = Arc::clone(&self.shared);
            let parked = move |_: &mut WaitTable| {
                !(shared.exiting.load(Ordering::SeqCst) || events.iter().any(Event::is_set))
            };

            if indefinite {
                guard = self.shared.condvar.wait_while(guard, parked).unwrap();
            } else {
                let remaining = deadline
                    .map(|d| d.saturating_duration_since(Instant::now()))
                    .unwrap_or(Duration::MAX);
                if remaining.is_zero() {
                    release_waiters(events);
                    return WaitOutcome::TimedOut;
                }
                let (reacquired, result) = self
                    .shared
                    .condvar
                    .wait_timeout_while(guard, remaining, parked)
                    .unwrap();
                guard = reacquired;
                if result.timed_out()
                    && !self.shared.exiting.load(Ordering::SeqCst)
                    && first_signaled(events).is_none()
                {
                    release_waiters(events);
                    return WaitOutcome::TimedOut;
                }
            }

            if self.shared.exiting.load(Ordering::SeqCst) {
                release_waiters(events);
                return WaitOutcome::ExitAll;
            }

            if let Some(index) = first_signaled(events) {
                release_waiters(events);
                return WaitOutcome::Signaled(index);
            }

            // Spurious pass; release this attempt's waiters and try again.
            release_waiters(events);
        }
    }

    /// Fires the exit-all broadcast.
    ///
    /// Every blocked and future [`Hub::wait`] on this hub returns
    /// [`WaitOutcome::ExitAll`], even if a listed event is also signaled.
    /// The broadcast is never cleared for the life of the hub; this is the
    /// only whole-domain cancellation mechanism.
    pub fn exit_all(&self) {
        info!("exit-all broadcast");
        let _guard = self.shared.table.lock().unwrap();
        self.shared.exiting.store(true, Ordering::SeqCst);
        self.shared.condvar.notify_all();
    }

    /// Whether the exit-all broadcast has fired.
    pub fn is_exiting(&self) -> bool {
        self.shared.exiting.load(Ordering::SeqCst)
    }

    /// Number of wait calls currently registered as blocked on this hub.
    pub fn waiting_count(&self) -> usize {
        self.shared.table.lock().unwrap().len()
    }

    /// Renders the live table of blocked wait sites: source location,
    /// right-aligned registration index, and a `{name: true|false, ...}`
    /// snapshot of each awaited event. Intended for logging.
    pub fn wait_report(&self) -> String {
        self.shared.table.lock().unwrap().render()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

fn first_signaled(events: &[Event]) -> Option<usize> {
    events.iter().position(Event::is_set)
}

fn release_waiters(events: &[Event]) {
    for event in events {
        event.finish_waiting();
    }
}
