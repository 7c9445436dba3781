use appcore::{Hub, ThreadRegistry, Worker};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn worker_registers_while_alive_and_joins_on_drop() {
    let hub = Hub::new();
    let registry = ThreadRegistry::new();

    let observed_stop = Arc::new(AtomicBool::new(false));
    let worker = Worker::spawn(&registry, &hub, "unit::worker", {
        let hub = hub.clone();
        let observed_stop = observed_stop.clone();
        move |stop| {
            let _ = hub.wait(&[stop.event()], None);
            observed_stop.store(stop.is_stop_requested(), Ordering::SeqCst);
        }
    });

    assert_eq!(worker.name(), "unit::worker");
    wait_until("worker registration", || {
        registry.thread_tree().contains("unit::worker")
    });

    drop(worker);

    // The handle's drop requested stop and joined; the body saw the request
    // and the registry entry is gone.
    assert!(observed_stop.load(Ordering::SeqCst));
    assert!(!registry.thread_tree().contains("unit::worker"));
}

#[test]
fn worker_tree_nests_children_under_parents() {
    let hub = Hub::new();
    let registry = ThreadRegistry::new();

    let parent = Worker::spawn(&registry, &hub, "tree::parent", {
        let hub = hub.clone();
        let registry = registry.clone();
        move |stop| {
            let child = Worker::spawn(&registry, &hub, "tree::child", {
                let hub = hub.clone();
                move |stop| {
                    let _ = hub.wait(&[stop.event()], None);
                }
            });
            let _ = hub.wait(&[stop.event()], None);
            drop(child);
        }
    });

    wait_until("parent and child registration", || {
        let tree = registry.thread_tree();
        tree.contains("tree::parent") && tree.contains("tree::child")
    });

    let tree = registry.thread_tree();
    let parent_line = tree
        .lines()
        .find(|line| line.contains("tree::parent"))
        .expect("parent line");
    let child_line = tree
        .lines()
        .find(|line| line.contains("tree::child"))
        .expect("child line");
    assert!(tree.starts_with("main ("));
    assert!(parent_line.starts_with("    tree::parent"));
    assert!(child_line.starts_with("        tree::child"));

    drop(parent);
    let tree = registry.thread_tree();
    assert!(!tree.contains("tree::parent"));
    assert!(!tree.contains("tree::child"));
}

#[test]
fn exit_all_releases_worker_bodies() {
    let hub = Hub::new();
    let registry = ThreadRegistry::new();

    let worker = Worker::spawn(&registry, &hub, "exiting::worker", {
        let hub = hub.clone();
        move |stop| {
            let _ = hub.wait(&[stop.event()], None);
        }
    });

    wait_until("worker registration", || {
        registry.thread_tree().contains("exiting::worker")
    });

    // The body waits only on its stop event, but the broadcast still
    // unblocks it.
    hub.exit_all();
    wait_until("worker deregistration", || {
        !registry.thread_tree().contains("exiting::worker")
    });
    drop(worker);
}
