//! Live table of blocked wait sites.
//!
//! Every [`Hub::wait`] call registers itself here while it blocks and removes
//! itself on any outcome, so a report rendered at any moment answers "what is
//! everything waiting on, and on what condition".
//!
//! [`Hub::wait`]: crate::sync::Hub::wait

use crate::sync::event::Event;
use crate::sync::hub::HubShared;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::panic::Location;
use std::sync::{Arc, MutexGuard};

pub(crate) struct WaitEntry {
    file: &'static str,
    line: u32,
    column: u32,
    events: Vec<Event>,
}

pub(crate) struct WaitTable {
    next_index: u64,
    entries: BTreeMap<u64, WaitEntry>,
}

impl WaitTable {
    pub(crate) fn new() -> Self {
        Self {
            next_index: 0,
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, location: &'static Location<'static>, events: &[Event]) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.entries.insert(
            index,
            WaitEntry {
                file: location.file(),
                line: location.line(),
                column: location.column(),
                events: events.to_vec(),
            },
        );
        index
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// One line per registration, grouped by call site: the site header is
    /// printed once and repeated entries at the same site are padded to align
    /// under it, followed by the right-aligned registration index and a
    /// snapshot of each awaited event's value.
    pub(crate) fn render(&self) -> String {
        let mut sites: BTreeMap<(&str, u32, u32), Vec<(u64, &WaitEntry)>> = BTreeMap::new();
        for (index, entry) in &self.entries {
            sites
                .entry((entry.file, entry.line, entry.column))
                .or_default()
                .push((*index, entry));
        }

        let mut out = String::new();
        for ((file, line, column), entries) in &sites {
            let header = format!("{file}:{line}:{column}");
            for (position, (index, entry)) in entries.iter().enumerate() {
                if position == 0 {
                    out.push_str(&header);
                } else {
                    out.extend(std::iter::repeat_n(' ', header.len()));
                }
                let _ = write!(out, "{index:>8} -> {{");
                for (n, event) in entry.events.iter().enumerate() {
                    if n > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}: {}", event.name(), event.is_set());
                }
                out.push_str("}\n");
            }
        }
        out
    }
}

/// Scoped handle to one wait registration; removal happens on drop so the
/// table stays correct under early return.
pub(crate) struct Registration {
    shared: Arc<HubShared>,
    index: u64,
}

impl Registration {
    pub(crate) fn insert(
        shared: Arc<HubShared>,
        table: &mut MutexGuard<'_, WaitTable>,
        location: &'static Location<'static>,
        events: &[Event],
    ) -> Self {
        let index = table.insert(location, events);
        Self { shared, index }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.shared.table.lock().unwrap().entries.remove(&self.index);
    }
}
