use appcore::{Hub, NetCore, ThreadRegistry};
use std::time::{Duration, Instant};

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn zero_threads_yields_no_instance() {
    let hub = Hub::new();
    let registry = ThreadRegistry::new();
    assert!(NetCore::start(&hub, &registry, 0).is_none());
}

#[test]
fn pool_workers_register_and_exit_joins_them() {
    let hub = Hub::new();
    let registry = ThreadRegistry::new();
    let core = NetCore::start(&hub, &registry, 2).expect("core");

    wait_until("pool registration", || {
        let tree = registry.thread_tree();
        tree.contains("net::core::0") && tree.contains("net::core::1")
    });
    assert_eq!(core.thread_count(), 2);

    // Waking an idle pool is harmless.
    core.wake_up();

    core.exit();
    assert_eq!(core.thread_count(), 0);
    assert!(!registry.thread_tree().contains("net::core::"));

    // Idempotent.
    core.exit();
}

#[test]
fn exit_all_stops_the_pool() {
    let hub = Hub::new();
    let registry = ThreadRegistry::new();
    let core = NetCore::start(&hub, &registry, 2).expect("core");

    wait_until("pool registration", || {
        let tree = registry.thread_tree();
        tree.contains("net::core::0") && tree.contains("net::core::1")
    });

    hub.exit_all();
    wait_until("pool deregistration", || {
        !registry.thread_tree().contains("net::core::")
    });

    core.exit();
}
