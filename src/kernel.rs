//! The abstract kernel file-event facility. The engine is written entirely
//! against this trait; `inotify_source` provides the real Linux backend and
//! `fake_source` a deterministic test double.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::delay::EventType;

/// One translated filesystem-change notification from the host facility.
/// `wd`/`wd2` are opaque kernel handles; the watch registry resolves them to
/// absolute paths before an event reaches a `Sync`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub etype: EventType,
    pub wd: i32,
    pub isdir: bool,
    pub time: u64,
    pub name: String,
    /// Present only for `Move` events: the destination side.
    pub wd2: Option<i32>,
    pub name2: Option<String>,
}

/// Everything the engine needs from the operating system's event facility
/// and its clock. A single implementation backs one running daemon;
/// `read_dir`/`real_dir` are used by the watch registry's recursive
/// reconciliation walk, the rest by the main loop and `Watch`.
pub trait Kernel {
    /// Installs a watch on `path`, returning its watch descriptor.
    fn add_watch(&mut self, path: &Path) -> std::io::Result<i32>;

    /// Removes a previously installed watch. Errors are logged by the
    /// caller, never fatal — watch-add/remove failures are tolerated and
    /// coverage may be partial.
    fn remove_watch(&mut self, wd: i32) -> std::io::Result<()>;

    /// Lists the immediate children of `path`, each tagged with whether it
    /// is itself a directory. Used by `add_watch`'s recursive enumeration.
    fn read_dir(&self, path: &Path) -> std::io::Result<HashMap<String, bool>>;

    /// Canonicalizes `path` (resolves symlinks, `.`, `..`).
    fn real_dir(&self, path: &Path) -> std::io::Result<PathBuf>;

    /// Monotonic ticks since some unspecified epoch.
    fn now(&self) -> u64;

    /// Blocks until either a kernel event is available or `deadline` (in
    /// `now()` ticks) elapses, whichever comes first. `None` means no
    /// deadline: block indefinitely for the next event.
    fn next_event(&mut self, deadline: Option<u64>) -> Option<RawEvent>;

    /// Reports and clears a pending event-queue overflow (the host facility
    /// dropped events because the daemon wasn't draining its queue fast
    /// enough). The main loop treats this as a fatal loss of coverage and
    /// enters fade rather than risk mirroring from a gap it can't see.
    /// Backends with no such failure mode (e.g. the in-memory test double)
    /// never have anything to report.
    fn take_overflow(&mut self) -> bool {
        false
    }
}

pub fn add_to_clock(t: u64, secs: u64) -> u64 {
    t + secs
}

pub fn clock_before(a: u64, b: u64) -> bool {
    a < b
}

pub fn earlier(a: u64, b: u64) -> u64 {
    a.min(b)
}
