use appcore::{Client, Hub, NetCore, ResetPolicy, Response, ThreadRegistry, WaitOutcome};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Reads one request head (and ignores any body) from the socket.
fn read_request_head(socket: &mut std::net::TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = socket.read(&mut buf).expect("server read");
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
        if request.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    request
}

#[test]
fn get_delivers_response_and_closes_without_keep_alive() {
    init_tracing();
    let hub = Hub::new();
    let registry = ThreadRegistry::new();
    let core = NetCore::start(&hub, &registry, 2).expect("core");

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let server = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().expect("accept");
        let request = read_request_head(&mut socket);
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
            .expect("server write");
        request
    });

    let client = Client::new(core.clone(), "127.0.0.1", port, false, false);
    let done = hub.event("get::done", ResetPolicy::Manual);
    let delivered: Arc<Mutex<Option<(Response, String, u16)>>> = Arc::new(Mutex::new(None));

    client.get(
        "/status",
        {
            let done = done.clone();
            let delivered = delivered.clone();
            move |request, response, addr, port| {
                assert_eq!(request.target, "/status");
                *delivered.lock().unwrap() = Some((response.clone(), addr.to_string(), port));
                done.set();
            }
        },
        Duration::from_secs(10),
        false,
    );

    assert_eq!(
        hub.wait(&[done], Some(Duration::from_secs(10))),
        WaitOutcome::Signaled(0)
    );

    let wire = server.join().expect("server join");
    let head = String::from_utf8_lossy(&wire);
    assert!(head.starts_with("GET /status HTTP/1.1\r\n"), "head: {head}");
    assert!(head.contains("Host: 127.0.0.1\r\n"), "head: {head}");
    assert!(head.contains("User-Agent: appcore/"), "head: {head}");
    assert!(head.contains("Connection: close\r\n"), "head: {head}");

    let delivered = delivered.lock().unwrap().take().expect("handler ran once");
    assert_eq!(delivered.0.status, 200);
    assert_eq!(delivered.0.body, b"ok");
    assert_eq!(delivered.1, "127.0.0.1");
    assert_eq!(delivered.2, port);

    // No keep-alive: the transport is closed after delivery.
    assert!(!client.is_connected());

    core.exit();
}

#[test]
fn keep_alive_reuses_the_connection() {
    init_tracing();
    let hub = Hub::new();
    let registry = ThreadRegistry::new();
    let core = NetCore::start(&hub, &registry, 2).expect("core");

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    // A single accepted connection serves both requests.
    let server = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().expect("accept");
        for body in [&b"one"[..], &b"two"[..]] {
            let _ = read_request_head(&mut socket);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n",
                body.len()
            );
            socket.write_all(response.as_bytes()).expect("server write");
            socket.write_all(body).expect("server write");
        }
    });

    let client = Client::new(core.clone(), "127.0.0.1", port, false, false);

    for expected in ["one", "two"] {
        let done = hub.event("keep_alive::done", ResetPolicy::Manual);
        let body: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        client.get(
            "/reuse",
            {
                let done = done.clone();
                let body = body.clone();
                move |_request, response, _addr, _port| {
                    *body.lock().unwrap() = response.body.clone();
                    done.set();
                }
            },
            Duration::from_secs(10),
            true,
        );
        assert_eq!(
            hub.wait(&[done], Some(Duration::from_secs(10))),
            WaitOutcome::Signaled(0)
        );
        assert_eq!(body.lock().unwrap().as_slice(), expected.as_bytes());
        assert!(client.is_connected());
    }

    client.close();
    server.join().expect("server join");
    core.exit();
}

#[test]
fn second_request_reconnects_after_close() {
    init_tracing();
    let hub = Hub::new();
    let registry = ThreadRegistry::new();
    let core = NetCore::start(&hub, &registry, 2).expect("core");

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    // Two accepts: the client reconnects from scratch for the second request.
    let server = std::thread::spawn(move || {
        for _ in 0..2 {
            let (mut socket, _) = listener.accept().expect("accept");
            let _ = read_request_head(&mut socket);
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .expect("server write");
        }
    });

    let client = Client::new(core.clone(), "127.0.0.1", port, false, false);
    for _ in 0..2 {
        let done = hub.event("reconnect::done", ResetPolicy::Manual);
        client.get(
            "/again",
            {
                let done = done.clone();
                move |_request, response, _addr, _port| {
                    assert_eq!(response.status, 200);
                    done.set();
                }
            },
            Duration::from_secs(10),
            false,
        );
        assert_eq!(
            hub.wait(&[done], Some(Duration::from_secs(10))),
            WaitOutcome::Signaled(0)
        );
        assert!(!client.is_connected());
    }

    server.join().expect("server join");
    core.exit();
}

#[test]
fn post_sends_body_and_content_type() {
    init_tracing();
    let hub = Hub::new();
    let registry = ThreadRegistry::new();
    let core = NetCore::start(&hub, &registry, 2).expect("core");

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let server = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().expect("accept");
        let mut received = read_request_head(&mut socket);
        // Read the rest of the body if it was not in the first reads.
        let header_end = received
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("header end")
            + 4;
        while received.len() < header_end + 7 {
            let mut buf = [0u8; 256];
            let n = socket.read(&mut buf).expect("server read");
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .expect("server write");
        received
    });

    let client = Client::new(core.clone(), "127.0.0.1", port, false, false);
    let done = hub.event("post::done", ResetPolicy::Manual);
    client.post(
        "/submit",
        &b"payload"[..],
        "text/plain",
        {
            let done = done.clone();
            move |request, response, _addr, _port| {
                assert_eq!(request.header("Content-Length"), Some("7"));
                assert_eq!(response.status, 201);
                done.set();
            }
        },
        Duration::from_secs(10),
        false,
    );

    assert_eq!(
        hub.wait(&[done], Some(Duration::from_secs(10))),
        WaitOutcome::Signaled(0)
    );

    let wire = server.join().expect("server join");
    let text = String::from_utf8_lossy(&wire);
    assert!(text.starts_with("POST /submit HTTP/1.1\r\n"), "wire: {text}");
    assert!(text.contains("Content-Type: text/plain\r\n"), "wire: {text}");
    assert!(text.contains("Content-Length: 7\r\n"), "wire: {text}");
    assert!(text.ends_with("payload"), "wire: {text}");

    core.exit();
}

#[test]
fn resolve_failure_never_invokes_the_handler() {
    init_tracing();
    let hub = Hub::new();
    let registry = ThreadRegistry::new();
    let core = NetCore::start(&hub, &registry, 1).expect("core");

    let client = Client::new(core.clone(), "host.invalid", 80, false, false);
    let done = hub.event("resolve::done", ResetPolicy::Manual);
    let called = Arc::new(AtomicBool::new(false));

    client.get(
        "/",
        {
            let done = done.clone();
            let called = called.clone();
            move |_request, _response, _addr, _port| {
                called.store(true, Ordering::SeqCst);
                done.set();
            }
        },
        Duration::from_secs(5),
        false,
    );

    // The chain aborts at resolution; the handler never runs.
    assert_eq!(
        hub.wait(&[done], Some(Duration::from_secs(2))),
        WaitOutcome::TimedOut
    );
    assert!(!called.load(Ordering::SeqCst));

    core.exit();
}

#[test]
fn unresponsive_server_times_out_without_invoking_the_handler() {
    init_tracing();
    let hub = Hub::new();
    let registry = ThreadRegistry::new();
    let core = NetCore::start(&hub, &registry, 1).expect("core");

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let server = std::thread::spawn(move || {
        // Accept and hold the connection open without ever responding.
        let (socket, _) = listener.accept().expect("accept");
        std::thread::sleep(Duration::from_millis(1500));
        drop(socket);
    });

    let client = Client::new(core.clone(), "127.0.0.1", port, false, false);
    let done = hub.event("timeout::done", ResetPolicy::Manual);
    let called = Arc::new(AtomicBool::new(false));

    client.get(
        "/slow",
        {
            let done = done.clone();
            let called = called.clone();
            move |_request, _response, _addr, _port| {
                called.store(true, Ordering::SeqCst);
                done.set();
            }
        },
        Duration::from_millis(300),
        false,
    );

    assert_eq!(
        hub.wait(&[done], Some(Duration::from_secs(2))),
        WaitOutcome::TimedOut
    );
    assert!(!called.load(Ordering::SeqCst));
    // The timeout closed the transport.
    assert!(!client.is_connected());

    server.join().expect("server join");
    core.exit();
}
