//! Asynchronous HTTP client pipeline.
//!
//! One [`Client`] is one logical connection: a state machine stepping through
//! resolve, connect, optional TLS handshake, write, and read, with each step
//! registered on the network core's reactor and executed by whichever pool
//! worker drains it next. Issuing a request never blocks the calling thread.
//!
//! Exactly one request may be in flight per client at a time; callers must
//! serialize requests per instance. The in-flight chain holds owning
//! references to the client, so it stays alive mid-flight even if the caller
//! drops its handle.
//!
//! Every step failure is logged, aborts the chain at that step, and neither
//! invokes the completion handler nor retries; retry is the caller's choice
//! by issuing a new request.

use crate::error::PipelineError;
use crate::http::message::{Method, Request, Response};
use crate::http::url::url_encode;
use crate::net::core::NetCore;
use crate::net::reactor::TimerKey;
use crate::net::socket::{self, FdIo};
use crate::net::tls;

use std::collections::VecDeque;
use std::io::{self, Read as _, Write as _};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tracing::{debug, error, trace, warn};

/// Completion handler: original request, response, remote address, and port.
pub type Handler = Box<dyn FnOnce(&Request, &Response, &str, u16) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Resolving,
    Connecting,
    Handshaking,
    Writing,
    Reading,
    Closed,
}

struct Conn {
    phase: Phase,
    seq: u64,
    fd: Option<i32>,
    tls: Option<rustls::ClientConnection>,
    addrs: VecDeque<SocketAddr>,
    last_connect_err: Option<io::Error>,
    request: Option<Request>,
    handler: Option<Handler>,
    keep_alive: bool,
    encoded: Vec<u8>,
    written: usize,
    parser: crate::http::parse::ResponseParser,
    timer: Option<TimerKey>,
}

struct Shared {
    core: Arc<NetCore>,
    host: String,
    port: u16,
    secure: bool,
    allow_self_signed: bool,
    conn: Mutex<Conn>,
}

/// HTTP client bound to a [`NetCore`].
///
/// Cloning a `Client` clones a handle to the same connection.
///
/// # Example
/// ```ignore
/// let client = Client::new(core.clone(), "example.com", 80, false, false);
/// client.get(
///     "/status",
///     |_request, response, addr, port| {
///         println!("{addr}:{port} -> {}", response.status);
///     },
///     Duration::from_secs(30),
///     false,
/// );
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Shared>,
}

impl Client {
    pub fn new(
        core: Arc<NetCore>,
        host: impl Into<String>,
        port: u16,
        secure: bool,
        allow_self_signed: bool,
    ) -> Self {
        let host = host.into();
        debug!(%host, port, secure, "client created");
        Self {
            inner: Arc::new(Shared {
                core,
                host,
                port,
                secure,
                allow_self_signed,
                conn: Mutex::new(Conn {
                    phase: Phase::Idle,
                    seq: 0,
                    fd: None,
                    tls: None,
                    addrs: VecDeque::new(),
                    last_connect_err: None,
                    request: None,
                    handler: None,
                    keep_alive: false,
                    encoded: Vec::new(),
                    written: 0,
                    parser: crate::http::parse::ResponseParser::new(),
                    timer: None,
                }),
            }),
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.inner.conn.lock().unwrap().keep_alive
    }

    pub fn set_keep_alive(&self, keep_alive: bool) {
        self.inner.conn.lock().unwrap().keep_alive = keep_alive;
    }

    /// Whether the underlying transport is currently open (kept alive from a
    /// previous request).
    pub fn is_connected(&self) -> bool {
        self.inner.conn.lock().unwrap().fd.is_some()
    }

    /// Closes the transport. A pending asynchronous step is abandoned: its
    /// completion never runs and its handler is never invoked.
    pub fn close(&self) {
        let mut conn = self.inner.conn.lock().unwrap();
        if let Some(fd) = conn.fd.take() {
            debug!(host = %self.inner.host, port = self.inner.port, "client closed");
            self.inner.core.reactor().forget(fd);
            socket::close(fd);
        }
        if let Some(key) = conn.timer.take() {
            self.inner.core.reactor().cancel_timer(key);
        }
        conn.tls = None;
        conn.handler = None;
        conn.phase = Phase::Closed;
    }

    pub fn head<H>(&self, path: &str, handler: H, timeout: Duration, keep_alive: bool)
    where
        H: FnOnce(&Request, &Response, &str, u16) + Send + 'static,
    {
        self.request(Request::new(Method::Head, path), handler, timeout, keep_alive);
    }

    pub fn get<H>(&self, path: &str, handler: H, timeout: Duration, keep_alive: bool)
    where
        H: FnOnce(&Request, &Response, &str, u16) + Send + 'static,
    {
        self.request(Request::new(Method::Get, path), handler, timeout, keep_alive);
    }

    pub fn put<H>(
        &self,
        path: &str,
        body: impl Into<Vec<u8>>,
        content_type: &str,
        handler: H,
        timeout: Duration,
        keep_alive: bool,
    ) where
        H: FnOnce(&Request, &Response, &str, u16) + Send + 'static,
    {
        let mut request = Request::new(Method::Put, path);
        request.set_header("Content-Type", content_type);
        request.body = body.into();
        self.request(request, handler, timeout, keep_alive);
    }

    pub fn post<H>(
        &self,
        path: &str,
        body: impl Into<Vec<u8>>,
        content_type: &str,
        handler: H,
        timeout: Duration,
        keep_alive: bool,
    ) where
        H: FnOnce(&Request, &Response, &str, u16) + Send + 'static,
    {
        let mut request = Request::new(Method::Post, path);
        request.set_header("Content-Type", content_type);
        request.body = body.into();
        self.request(request, handler, timeout, keep_alive);
    }

    pub fn delete<H>(&self, path: &str, handler: H, timeout: Duration, keep_alive: bool)
    where
        H: FnOnce(&Request, &Response, &str, u16) + Send + 'static,
    {
        self.request(Request::new(Method::Delete, path), handler, timeout, keep_alive);
    }

    /// Issues a request on this connection.
    ///
    /// An already-open (kept-alive) transport goes straight to the write
    /// step; otherwise the chain starts from resolution. Calling this while a
    /// previous request is still in flight is a contract violation; behavior
    /// is unspecified and the earlier request may be dropped without its
    /// handler running.
    pub fn request<H>(&self, mut request: Request, handler: H, timeout: Duration, keep_alive: bool)
    where
        H: FnOnce(&Request, &Response, &str, u16) + Send + 'static,
    {
        let inner = &self.inner;
        request.target = url_encode(&request.target);
        if request.target.is_empty() {
            request.target.push('/');
        }
        request.set_header("Host", inner.host.clone());
        if request.header("User-Agent").is_none() {
            request.set_header("User-Agent", concat!("appcore/", env!("CARGO_PKG_VERSION")));
        }
        request.set_header("Connection", if keep_alive { "keep-alive" } else { "close" });
        if !request.body.is_empty() || matches!(request.method, Method::Post | Method::Put) {
            request.set_header("Content-Length", request.body.len().to_string());
        }
        debug!(
            host = %inner.host,
            port = inner.port,
            method = %request.method,
            target = %request.target,
            "request"
        );

        let mut conn = inner.conn.lock().unwrap();
        conn.seq = conn.seq.wrapping_add(1);
        let seq = conn.seq;
        conn.keep_alive = keep_alive;
        conn.parser.reset(request.method == Method::Head);
        conn.encoded = request.encode();
        conn.written = 0;
        conn.request = Some(request);
        conn.handler = Some(Box::new(handler));
        conn.addrs.clear();
        conn.last_connect_err = None;

        let timer_client = Arc::clone(inner);
        match inner.core.reactor().after(
            timeout,
            Box::new(move || {
                Shared::on_timeout(&timer_client, seq);
                timer_client.core.wake_up();
            }),
        ) {
            Ok(key) => conn.timer = Some(key),
            Err(err) => warn!(%err, "failed to arm request timer"),
        }

        let connected = conn.fd.is_some();
        conn.phase = if connected {
            Phase::Writing
        } else {
            Phase::Resolving
        };
        drop(conn);

        let step_client = Arc::clone(inner);
        inner.core.reactor().schedule(Box::new(move || {
            if connected {
                Shared::start_write(&step_client, seq);
            } else {
                Shared::resolve(&step_client, seq);
            }
            step_client.core.wake_up();
        }));
        inner.core.wake_up();
    }
}

impl Shared {
    fn stale(conn: &Conn, seq: u64) -> bool {
        conn.seq != seq || matches!(conn.phase, Phase::Idle | Phase::Closed)
    }

    fn register_readable(
        this: &Arc<Shared>,
        seq: u64,
        fd: i32,
        next: fn(&Arc<Shared>, u64),
        wrap: fn(io::Error) -> PipelineError,
    ) {
        let client = Arc::clone(this);
        let result = this.core.reactor().on_readable(
            fd,
            Box::new(move || {
                next(&client, seq);
                client.core.wake_up();
            }),
        );
        if let Err(err) = result {
            Self::abort(this, seq, wrap(err));
        }
    }

    fn register_writable(
        this: &Arc<Shared>,
        seq: u64,
        fd: i32,
        next: fn(&Arc<Shared>, u64),
        wrap: fn(io::Error) -> PipelineError,
    ) {
        let client = Arc::clone(this);
        let result = this.core.reactor().on_writable(
            fd,
            Box::new(move || {
                next(&client, seq);
                client.core.wake_up();
            }),
        );
        if let Err(err) = result {
            Self::abort(this, seq, wrap(err));
        }
    }

    /// Resolves the target host and port, then moves on to connecting.
    /// Resolution runs on the pool worker executing this step.
    fn resolve(this: &Arc<Shared>, seq: u64) {
        trace!(host = %this.host, port = this.port, "resolve");
        let resolved = (this.host.as_str(), this.port).to_socket_addrs();

        let mut conn = this.conn.lock().unwrap();
        if Self::stale(&conn, seq) {
            return;
        }
        match resolved {
            Ok(addrs) => {
                conn.addrs = addrs.collect();
                if conn.addrs.is_empty() {
                    drop(conn);
                    Self::abort(
                        this,
                        seq,
                        PipelineError::Resolve(io::Error::new(
                            io::ErrorKind::NotFound,
                            "host resolved to no addresses",
                        )),
                    );
                    return;
                }
                conn.phase = Phase::Connecting;
                drop(conn);
                Self::connect_next(this, seq);
            }
            Err(err) => {
                drop(conn);
                Self::abort(this, seq, PipelineError::Resolve(err));
            }
        }
    }

    /// Attempts the next resolved address; the chain fails only once every
    /// address has been tried.
    fn connect_next(this: &Arc<Shared>, seq: u64) {
        loop {
            let addr = {
                let mut conn = this.conn.lock().unwrap();
                if Self::stale(&conn, seq) {
                    return;
                }
                match conn.addrs.pop_front() {
                    Some(addr) => addr,
                    None => {
                        let err = conn.last_connect_err.take().unwrap_or_else(|| {
                            io::Error::new(io::ErrorKind::AddrNotAvailable, "no address reachable")
                        });
                        drop(conn);
                        Self::abort(this, seq, PipelineError::Connect(err));
                        return;
                    }
                }
            };

            trace!(%addr, "connect");
            match socket::connect(&addr) {
                Ok((fd, false)) => {
                    let mut conn = this.conn.lock().unwrap();
                    if Self::stale(&conn, seq) {
                        socket::close(fd);
                        return;
                    }
                    conn.fd = Some(fd);
                    drop(conn);
                    Self::on_connected(this, seq);
                    return;
                }
                Ok((fd, true)) => {
                    {
                        let mut conn = this.conn.lock().unwrap();
                        if Self::stale(&conn, seq) {
                            socket::close(fd);
                            return;
                        }
                        conn.fd = Some(fd);
                    }
                    Self::register_writable(this, seq, fd, Self::finish_connect, PipelineError::Connect);
                    return;
                }
                Err(err) => {
                    let mut conn = this.conn.lock().unwrap();
                    if Self::stale(&conn, seq) {
                        return;
                    }
                    conn.last_connect_err = Some(err);
                    // Fall through to the next address.
                }
            }
        }
    }

    /// Checks the outcome of an in-progress connect once the socket reports
    /// writable.
    fn finish_connect(this: &Arc<Shared>, seq: u64) {
        let fd = {
            let conn = this.conn.lock().unwrap();
            if Self::stale(&conn, seq) {
                return;
            }
            match conn.fd {
                Some(fd) => fd,
                None => return,
            }
        };
        match socket::take_error(fd) {
            Ok(()) => Self::on_connected(this, seq),
            Err(err) => {
                let mut conn = this.conn.lock().unwrap();
                if Self::stale(&conn, seq) {
                    return;
                }
                debug!(%err, "connect attempt failed; trying next address");
                conn.fd = None;
                conn.last_connect_err = Some(err);
                drop(conn);
                socket::close(fd);
                Self::connect_next(this, seq);
            }
        }
    }

    fn on_connected(this: &Arc<Shared>, seq: u64) {
        let mut conn = this.conn.lock().unwrap();
        if Self::stale(&conn, seq) {
            return;
        }
        if !this.secure {
            conn.phase = Phase::Writing;
            drop(conn);
            Self::start_write(this, seq);
            return;
        }

        conn.phase = Phase::Handshaking;
        let config = tls::client_config(this.core.roots(), this.allow_self_signed);
        let name = match ServerName::try_from(this.host.clone()) {
            Ok(name) => name,
            Err(err) => {
                drop(conn);
                Self::abort(this, seq, PipelineError::Handshake(io::Error::other(err)));
                return;
            }
        };
        match rustls::ClientConnection::new(config, name) {
            Ok(session) => conn.tls = Some(session),
            Err(err) => {
                drop(conn);
                Self::abort(this, seq, PipelineError::Handshake(io::Error::other(err)));
                return;
            }
        }
        drop(conn);
        Self::advance_handshake(this, seq);
    }

    /// Pumps the TLS handshake until it completes or needs the socket.
    fn advance_handshake(this: &Arc<Shared>, seq: u64) {
        let mut conn = this.conn.lock().unwrap();
        if Self::stale(&conn, seq) {
            return;
        }
        let Some(fd) = conn.fd else { return };
        let Some(mut session) = conn.tls.take() else { return };
        let mut io = FdIo(fd);

        loop {
            if !session.is_handshaking() {
                trace!(host = %this.host, "handshake complete");
                conn.tls = Some(session);
                conn.phase = Phase::Writing;
                drop(conn);
                Self::start_write(this, seq);
                return;
            }

            if session.wants_write() {
                match session.write_tls(&mut io) {
                    Ok(_) => continue,
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        conn.tls = Some(session);
                        drop(conn);
                        Self::register_writable(
                            this,
                            seq,
                            fd,
                            Self::advance_handshake,
                            PipelineError::Handshake,
                        );
                        return;
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        drop(conn);
                        Self::abort(this, seq, PipelineError::Handshake(err));
                        return;
                    }
                }
            }

            match session.read_tls(&mut io) {
                Ok(0) => {
                    drop(conn);
                    Self::abort(
                        this,
                        seq,
                        PipelineError::Handshake(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "peer closed during handshake",
                        )),
                    );
                    return;
                }
                Ok(_) => match session.process_new_packets() {
                    Ok(_) => continue,
                    Err(err) => {
                        drop(conn);
                        Self::abort(this, seq, PipelineError::Handshake(io::Error::other(err)));
                        return;
                    }
                },
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    conn.tls = Some(session);
                    drop(conn);
                    Self::register_readable(
                        this,
                        seq,
                        fd,
                        Self::advance_handshake,
                        PipelineError::Handshake,
                    );
                    return;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    drop(conn);
                    Self::abort(this, seq, PipelineError::Handshake(err));
                    return;
                }
            }
        }
    }

    fn start_write(this: &Arc<Shared>, seq: u64) {
        let mut conn = this.conn.lock().unwrap();
        if Self::stale(&conn, seq) {
            return;
        }
        conn.phase = Phase::Writing;
        if conn.tls.is_some() {
            // The encoded request is buffered into the session once; the
            // flush loop moves it onto the wire.
            let encoded = std::mem::take(&mut conn.encoded);
            let Some(session) = conn.tls.as_mut() else { return };
            if let Err(err) = session.writer().write_all(&encoded) {
                drop(conn);
                Self::abort(this, seq, PipelineError::Write(err));
                return;
            }
            conn.encoded = encoded;
            drop(conn);
            Self::flush_tls(this, seq);
        } else {
            drop(conn);
            Self::write_plain(this, seq);
        }
    }

    fn write_plain(this: &Arc<Shared>, seq: u64) {
        let mut conn = this.conn.lock().unwrap();
        if Self::stale(&conn, seq) {
            return;
        }
        let Some(fd) = conn.fd else { return };
        let mut io = FdIo(fd);

        while conn.written < conn.encoded.len() {
            let offset = conn.written;
            match io.write(&conn.encoded[offset..]) {
                Ok(0) => {
                    drop(conn);
                    Self::abort(
                        this,
                        seq,
                        PipelineError::Write(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "write returned zero bytes",
                        )),
                    );
                    return;
                }
                Ok(n) => conn.written += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    drop(conn);
                    Self::register_writable(this, seq, fd, Self::write_plain, PipelineError::Write);
                    return;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    drop(conn);
                    Self::abort(this, seq, PipelineError::Write(err));
                    return;
                }
            }
        }

        conn.phase = Phase::Reading;
        drop(conn);
        Self::read_some(this, seq);
    }

    fn flush_tls(this: &Arc<Shared>, seq: u64) {
        let mut conn = this.conn.lock().unwrap();
        if Self::stale(&conn, seq) {
            return;
        }
        let Some(fd) = conn.fd else { return };
        let Some(mut session) = conn.tls.take() else { return };
        let mut io = FdIo(fd);

        while session.wants_write() {
            match session.write_tls(&mut io) {
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    conn.tls = Some(session);
                    drop(conn);
                    Self::register_writable(this, seq, fd, Self::flush_tls, PipelineError::Write);
                    return;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    drop(conn);
                    Self::abort(this, seq, PipelineError::Write(err));
                    return;
                }
            }
        }

        conn.tls = Some(session);
        conn.phase = Phase::Reading;
        drop(conn);
        Self::read_some(this, seq);
    }

    fn read_some(this: &Arc<Shared>, seq: u64) {
        let conn = this.conn.lock().unwrap();
        if Self::stale(&conn, seq) {
            return;
        }
        let Some(fd) = conn.fd else { return };
        if conn.tls.is_some() {
            Self::read_tls_some(this, conn, seq, fd);
        } else {
            Self::read_plain_some(this, conn, seq, fd);
        }
    }

    fn read_plain_some(this: &Arc<Shared>, mut conn: MutexGuard<'_, Conn>, seq: u64, fd: i32) {
        let mut buf = [0u8; 8192];
        let mut io = FdIo(fd);

        loop {
            match io.read(&mut buf) {
                Ok(0) => {
                    Self::finish_at_eof(this, conn, seq);
                    return;
                }
                Ok(n) => {
                    conn.parser.feed(&buf[..n]);
                    match conn.parser.try_complete() {
                        Ok(Some(response)) => {
                            Self::deliver(this, conn, response);
                            return;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            drop(conn);
                            Self::abort(this, seq, err.into());
                            return;
                        }
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    drop(conn);
                    Self::register_readable(this, seq, fd, Self::read_some, PipelineError::Read);
                    return;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    drop(conn);
                    Self::abort(this, seq, PipelineError::Read(err));
                    return;
                }
            }
        }
    }

    fn read_tls_some(this: &Arc<Shared>, mut conn: MutexGuard<'_, Conn>, seq: u64, fd: i32) {
        let Some(mut session) = conn.tls.take() else { return };
        let mut buf = [0u8; 8192];
        let mut io = FdIo(fd);

        loop {
            // Surface any decrypted plaintext before touching the socket.
            let mut saw_close = false;
            loop {
                match session.reader().read(&mut buf) {
                    Ok(0) => {
                        saw_close = true;
                        break;
                    }
                    Ok(n) => conn.parser.feed(&buf[..n]),
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) => {
                        drop(conn);
                        Self::abort(this, seq, PipelineError::Read(err));
                        return;
                    }
                }
            }

            match conn.parser.try_complete() {
                Ok(Some(response)) => {
                    conn.tls = Some(session);
                    Self::deliver(this, conn, response);
                    return;
                }
                Ok(None) => {}
                Err(err) => {
                    drop(conn);
                    Self::abort(this, seq, err.into());
                    return;
                }
            }

            if saw_close {
                Self::finish_at_eof(this, conn, seq);
                return;
            }

            match session.read_tls(&mut io) {
                Ok(0) => {
                    Self::finish_at_eof(this, conn, seq);
                    return;
                }
                Ok(_) => {
                    if let Err(err) = session.process_new_packets() {
                        drop(conn);
                        Self::abort(this, seq, PipelineError::Read(io::Error::other(err)));
                        return;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    conn.tls = Some(session);
                    drop(conn);
                    Self::register_readable(this, seq, fd, Self::read_some, PipelineError::Read);
                    return;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    drop(conn);
                    Self::abort(this, seq, PipelineError::Read(err));
                    return;
                }
            }
        }
    }

    /// The peer closed the transport; either that completes a read-until-close
    /// response or it truncated the message.
    fn finish_at_eof(this: &Arc<Shared>, mut conn: MutexGuard<'_, Conn>, seq: u64) {
        match conn.parser.finish_eof() {
            Ok(Some(response)) => {
                // The transport is gone regardless of what was requested.
                conn.keep_alive = false;
                Self::deliver(this, conn, response);
            }
            Ok(None) => {
                drop(conn);
                Self::abort(
                    this,
                    seq,
                    PipelineError::Read(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed before response",
                    )),
                );
            }
            Err(err) => {
                drop(conn);
                Self::abort(this, seq, err.into());
            }
        }
    }

    /// Hands the response to the completion handler and leaves the connection
    /// open (keep-alive) or closed for the next request.
    fn deliver(this: &Arc<Shared>, mut conn: MutexGuard<'_, Conn>, response: Response) {
        if let Some(key) = conn.timer.take() {
            this.core.reactor().cancel_timer(key);
        }
        let request = conn.request.take();
        let handler = conn.handler.take();
        if conn.keep_alive {
            conn.phase = Phase::Idle;
        } else {
            if let Some(fd) = conn.fd.take() {
                this.core.reactor().forget(fd);
                socket::close(fd);
            }
            conn.tls = None;
            conn.phase = Phase::Closed;
        }
        drop(conn);

        debug!(
            host = %this.host,
            port = this.port,
            status = response.status,
            "response delivered"
        );
        if let (Some(request), Some(handler)) = (request, handler) {
            handler(&request, &response, &this.host, this.port);
        }
    }

    fn on_timeout(this: &Arc<Shared>, seq: u64) {
        {
            let mut conn = this.conn.lock().unwrap();
            if Self::stale(&conn, seq) {
                return;
            }
            conn.timer = None;
        }
        Self::abort(this, seq, PipelineError::Timeout);
    }

    /// Tears the chain down at the failing step. The handler is dropped
    /// without being invoked and nothing is retried.
    fn abort(this: &Arc<Shared>, seq: u64, pipeline_error: PipelineError) {
        let mut conn = this.conn.lock().unwrap();
        if Self::stale(&conn, seq) {
            return;
        }
        error!(
            host = %this.host,
            port = this.port,
            error = %pipeline_error,
            "request aborted"
        );
        if let Some(key) = conn.timer.take() {
            this.core.reactor().cancel_timer(key);
        }
        if let Some(fd) = conn.fd.take() {
            this.core.reactor().forget(fd);
            socket::close(fd);
        }
        conn.tls = None;
        conn.addrs.clear();
        conn.request = None;
        conn.handler = None;
        conn.phase = Phase::Closed;
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let conn = self.conn.get_mut().unwrap();
        if let Some(fd) = conn.fd.take() {
            self.core.reactor().forget(fd);
            socket::close(fd);
        }
        if let Some(key) = conn.timer.take() {
            self.core.reactor().cancel_timer(key);
        }
        debug!(host = %self.host, port = self.port, "client dropped");
    }
}
