//! Process-wide registry of tracked threads.
//!
//! The registry keeps a parent/child tree of every live [`Worker`] thread
//! rooted at the thread that constructed it. Links are only valid while a
//! worker is alive: each thread registers on body entry and removes itself on
//! body exit. Guarded by its own lock, independent of the event hub's.
//!
//! [`Worker`]: crate::worker::Worker

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

/// Platform thread id of the calling thread.
pub(crate) fn current_thread_id() -> i32 {
    unsafe { libc::gettid() }
}

struct ThreadNode {
    name: String,
    file: &'static str,
    line: u32,
    parent: i32,
    children: BTreeSet<i32>,
}

struct RegistryInner {
    root_id: i32,
    root_children: BTreeSet<i32>,
    threads: HashMap<i32, ThreadNode>,
}

/// Registry of live tracked threads, rendered as an indented tree.
///
/// Cloning a `ThreadRegistry` clones a handle to the same registry. The
/// constructing thread becomes the permanent root of the tree.
#[derive(Clone)]
pub struct ThreadRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                root_id: current_thread_id(),
                root_children: BTreeSet::new(),
                threads: HashMap::new(),
            })),
        }
    }

    /// Id of the root (constructing) thread.
    pub fn root_id(&self) -> i32 {
        self.inner.lock().unwrap().root_id
    }

    /// Whether the given platform thread id is currently registered.
    pub fn is_registered(&self, id: i32) -> bool {
        self.inner.lock().unwrap().threads.contains_key(&id)
    }

    pub(crate) fn register(&self, id: i32, parent: i32, name: String, file: &'static str, line: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.threads.insert(
            id,
            ThreadNode {
                name,
                file,
                line,
                parent,
                children: BTreeSet::new(),
            },
        );
        // Untracked parents fall back to the root.
        match inner.threads.get_mut(&parent) {
            Some(node) => {
                node.children.insert(id);
            }
            None => {
                inner.root_children.insert(id);
            }
        }
    }

    pub(crate) fn deregister(&self, id: i32) {
        let mut inner = self.inner.lock().unwrap();
        let Some(node) = inner.threads.remove(&id) else {
            return;
        };
        let parent = node.parent;
        match inner.threads.get_mut(&parent) {
            Some(parent_node) => {
                parent_node.children.remove(&id);
            }
            None => {
                inner.root_children.remove(&id);
            }
        }
    }

    /// One-line description of a registered thread: name plus creation site.
    pub fn describe(&self, id: i32) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .threads
            .get(&id)
            .map(|node| format!("{} ({}:{})", node.name, node.file, node.line))
    }

    /// Renders the live thread tree as indented `name (id):` lines, four
    /// spaces per nesting level, rooted at the constructing thread.
    pub fn thread_tree(&self) -> String {
        let inner = self.inner.lock().unwrap();
        let mut out = String::new();
        let _ = writeln!(out, "main ({}):", inner.root_id);
        for id in &inner.root_children {
            descend(&inner, *id, 1, &mut out);
        }
        out
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn descend(inner: &RegistryInner, id: i32, depth: usize, out: &mut String) {
    let Some(node) = inner.threads.get(&id) else {
        return;
    };
    for _ in 0..depth {
        out.push_str("    ");
    }
    let _ = writeln!(out, "{} ({id}):", node.name);
    for child in &node.children {
        descend(inner, *child, depth + 1, out);
    }
}
