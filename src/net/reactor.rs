//! Shared readiness reactor driven by the network core's worker pool.
//!
//! The reactor holds three kinds of pending work: queued jobs (completions
//! ready to run), one-shot readiness interests on file descriptors, and
//! one-shot timers. Any number of pool workers may call [`Reactor::run`]
//! concurrently; one-shot epoll registrations guarantee each readiness event
//! is dispatched exactly once. `run` returns when the reactor is out of work
//! or stopped, and the caller parks on its hub until woken again.

use crate::net::poller::{self, Poller};

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tracing::error;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Identifies one armed timer; the id guards against timer fd reuse so a
/// stale cancel can never hit a newer timer.
pub(crate) struct TimerKey {
    fd: i32,
    id: u64,
}

pub(crate) struct Reactor {
    poller: Poller,
    jobs: Mutex<VecDeque<Job>>,
    interests: Mutex<HashMap<i32, Job>>,
    timers: Mutex<HashMap<i32, (u64, Job)>>,
    next_timer_id: AtomicU64,
    stopped: AtomicBool,
}

impl Reactor {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            jobs: Mutex::new(VecDeque::new()),
            interests: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            next_timer_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        })
    }

    /// Queues a completion to run on the next worker that drives the reactor,
    /// interrupting a blocked `epoll_wait` if necessary.
    pub(crate) fn schedule(&self, job: Job) {
        if self.stopped() {
            return;
        }
        self.jobs.lock().unwrap().push_back(job);
        self.poller.notify();
    }

    /// Runs `job` once `fd` becomes readable.
    pub(crate) fn on_readable(&self, fd: i32, job: Job) -> io::Result<()> {
        self.register(fd, poller::READABLE, job)
    }

    /// Runs `job` once `fd` becomes writable.
    pub(crate) fn on_writable(&self, fd: i32, job: Job) -> io::Result<()> {
        self.register(fd, poller::WRITABLE, job)
    }

    fn register(&self, fd: i32, interest: u32, job: Job) -> io::Result<()> {
        self.interests.lock().unwrap().insert(fd, job);
        if let Err(err) = self.poller.arm(fd, interest) {
            self.interests.lock().unwrap().remove(&fd);
            return Err(err);
        }
        Ok(())
    }

    /// Runs `job` after `delay`. The returned key cancels the timer.
    pub(crate) fn after(&self, delay: Duration, job: Job) -> io::Result<TimerKey> {
        let fd = poller::new_timer(delay)?;
        let id = self.next_timer_id.fetch_add(1, Ordering::SeqCst);
        self.timers.lock().unwrap().insert(fd, (id, job));
        if let Err(err) = self.poller.arm(fd, poller::READABLE) {
            self.timers.lock().unwrap().remove(&fd);
            unsafe { libc::close(fd) };
            return Err(err);
        }
        Ok(TimerKey { fd, id })
    }

    /// Cancels an armed timer; a no-op if it already fired.
    pub(crate) fn cancel_timer(&self, key: TimerKey) {
        let mut timers = self.timers.lock().unwrap();
        if timers.get(&key.fd).is_some_and(|(id, _)| *id == key.id) {
            timers.remove(&key.fd);
            drop(timers);
            self.poller.forget(key.fd);
            unsafe { libc::close(key.fd) };
        }
    }

    /// Drops any pending interest on `fd`. The associated completion never
    /// runs; callers close the fd themselves.
    pub(crate) fn forget(&self, fd: i32) {
        self.interests.lock().unwrap().remove(&fd);
        self.poller.forget(fd);
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stops the reactor and interrupts every worker blocked inside it.
    /// Pending jobs, interests, and timers are abandoned.
    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.poller.notify();
    }

    fn has_pending(&self) -> bool {
        !self.jobs.lock().unwrap().is_empty()
            || !self.interests.lock().unwrap().is_empty()
            || !self.timers.lock().unwrap().is_empty()
    }

    /// Drives the reactor until it has no more work or is stopped.
    ///
    /// Jobs run outside every reactor lock, so completions may freely
    /// schedule follow-up work or register new interests.
    pub(crate) fn run(&self) {
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 64];

        loop {
            loop {
                let job = self.jobs.lock().unwrap().pop_front();
                match job {
                    Some(job) => job(),
                    None => break,
                }
            }

            if self.stopped() {
                return;
            }

            if !self.has_pending() {
                return;
            }

            let n = match self.poller.wait(&mut events, -1) {
                Ok(n) => n,
                Err(err) => {
                    error!(%err, "reactor poll failed");
                    return;
                }
            };

            for event in &events[..n] {
                let fd = event.u64 as i32;

                if fd == self.poller.notify_fd() {
                    // Left signaled during stop so every parked worker wakes.
                    if !self.stopped() {
                        self.poller.drain_notify();
                    }
                    continue;
                }

                let fired_timer = self.timers.lock().unwrap().remove(&fd);
                if let Some((_, job)) = fired_timer {
                    self.poller.forget(fd);
                    unsafe { libc::close(fd) };
                    self.jobs.lock().unwrap().push_back(job);
                    continue;
                }

                let ready = self.interests.lock().unwrap().remove(&fd);
                if let Some(job) = ready {
                    self.jobs.lock().unwrap().push_back(job);
                }
            }
        }
    }
}
