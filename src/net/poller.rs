use std::io;
use std::time::Duration;

pub(crate) const READABLE: u32 = (libc::EPOLLIN | libc::EPOLLRDHUP) as u32;
pub(crate) const WRITABLE: u32 = libc::EPOLLOUT as u32;

/// epoll instance plus the eventfd used to interrupt a blocked wait.
pub(crate) struct Poller {
    epoll_fd: i32,
    notify_fd: i32,
}

impl Poller {
    pub(crate) fn new() -> io::Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let notify_fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if notify_fd < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll_fd) };
            return Err(err);
        }

        let poller = Self { epoll_fd, notify_fd };
        // The notify fd stays level-triggered so every blocked waiter sees it.
        poller.ctl(libc::EPOLL_CTL_ADD, notify_fd, libc::EPOLLIN as u32)?;
        Ok(poller)
    }

    fn ctl(&self, op: i32, fd: i32, events: u32) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Arms a one-shot interest for `fd`; re-arm by calling again after the
    /// event fires.
    pub(crate) fn arm(&self, fd: i32, interest: u32) -> io::Result<()> {
        let flags = interest | libc::EPOLLONESHOT as u32;
        match self.ctl(libc::EPOLL_CTL_ADD, fd, flags) {
            Err(err) if err.raw_os_error() == Some(libc::EEXIST) => {
                self.ctl(libc::EPOLL_CTL_MOD, fd, flags)
            }
            other => other,
        }
    }

    pub(crate) fn forget(&self, fd: i32) {
        let _ = self.ctl(libc::EPOLL_CTL_DEL, fd, 0);
    }

    /// Blocks until events arrive (`timeout_ms` of -1 waits forever).
    /// An interrupted wait reports zero events rather than an error.
    pub(crate) fn wait(
        &self,
        events: &mut [libc::epoll_event],
        timeout_ms: i32,
    ) -> io::Result<usize> {
        let n = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                events.as_mut_ptr(),
                events.len() as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(n as usize)
    }

    pub(crate) fn notify_fd(&self) -> i32 {
        self.notify_fd
    }

    /// Interrupts one (or more) blocked [`Poller::wait`] calls.
    pub(crate) fn notify(&self) {
        let one: u64 = 1;
        unsafe {
            libc::write(self.notify_fd, &one as *const u64 as *const libc::c_void, 8);
        }
    }

    pub(crate) fn drain_notify(&self) {
        let mut counter: u64 = 0;
        unsafe {
            libc::read(
                self.notify_fd,
                &mut counter as *mut u64 as *mut libc::c_void,
                8,
            );
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.notify_fd);
            libc::close(self.epoll_fd);
        }
    }
}

/// Creates a one-shot monotonic timer fd armed for `delay`.
pub(crate) fn new_timer(delay: Duration) -> io::Result<i32> {
    let fd = unsafe {
        libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_CLOEXEC | libc::TFD_NONBLOCK)
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    // A zeroed it_value would disarm the timer, so a zero delay still fires.
    let nanos = delay.subsec_nanos().max(if delay.as_secs() == 0 { 1 } else { 0 });
    let spec = libc::itimerspec {
        it_interval: libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        },
        it_value: libc::timespec {
            tv_sec: delay.as_secs() as libc::time_t,
            tv_nsec: nanos as libc::c_long,
        },
    };

    let ret = unsafe { libc::timerfd_settime(fd, 0, &spec, std::ptr::null_mut()) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }
    Ok(fd)
}

pub(crate) fn set_nonblocking(fd: i32) {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    unsafe {
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
}
