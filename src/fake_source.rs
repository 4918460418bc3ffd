//! A deterministic, in-memory `Kernel` implementation for tests: no real
//! filesystem watch is installed, events are injected directly via
//! `push_event`, and the clock is advanced explicitly rather than read from
//! the OS.

use crate::kernel::{Kernel, RawEvent};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

pub struct FakeEventSource {
    next_wd: i32,
    children: HashMap<PathBuf, HashMap<String, bool>>,
    queue: VecDeque<RawEvent>,
    clock: u64,
}

impl FakeEventSource {
    pub fn new() -> Self {
        FakeEventSource {
            next_wd: 1,
            children: HashMap::new(),
            queue: VecDeque::new(),
            clock: 0,
        }
    }

    /// Declares that `parent` contains `name` (a directory if `isdir`), as
    /// `read_dir` would report it, for the startup reconciliation walk.
    pub fn seed_dir_entry(&mut self, parent: impl Into<PathBuf>, name: impl Into<String>, isdir: bool) {
        self.children.entry(parent.into()).or_default().insert(name.into(), isdir);
    }

    pub fn push_event(&mut self, raw: RawEvent) {
        self.queue.push_back(raw);
    }

    pub fn advance_clock(&mut self, ticks: u64) {
        self.clock += ticks;
    }
}

impl Kernel for FakeEventSource {
    fn add_watch(&mut self, _path: &Path) -> std::io::Result<i32> {
        let wd = self.next_wd;
        self.next_wd += 1;
        Ok(wd)
    }

    fn remove_watch(&mut self, _wd: i32) -> std::io::Result<()> {
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> std::io::Result<HashMap<String, bool>> {
        Ok(self.children.get(path).cloned().unwrap_or_default())
    }

    fn real_dir(&self, path: &Path) -> std::io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    fn now(&self) -> u64 {
        self.clock
    }

    fn next_event(&mut self, _deadline: Option<u64>) -> Option<RawEvent> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::EventType;

    #[test]
    fn seeded_children_surface_through_read_dir() {
        let mut src = FakeEventSource::new();
        src.seed_dir_entry("/root", "a", false);
        src.seed_dir_entry("/root", "b", true);
        let children = src.read_dir(Path::new("/root")).unwrap();
        assert_eq!(children.get("a"), Some(&false));
        assert_eq!(children.get("b"), Some(&true));
    }

    #[test]
    fn pushed_events_drain_in_fifo_order() {
        let mut src = FakeEventSource::new();
        src.push_event(RawEvent { etype: EventType::Create, wd: 1, isdir: false, time: 0, name: "a".into(), wd2: None, name2: None });
        src.push_event(RawEvent { etype: EventType::Create, wd: 1, isdir: false, time: 0, name: "b".into(), wd2: None, name2: None });
        assert_eq!(src.next_event(None).unwrap().name, "a");
        assert_eq!(src.next_event(None).unwrap().name, "b");
        assert!(src.next_event(None).is_none());
    }
}
