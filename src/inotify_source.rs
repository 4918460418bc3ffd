//! The real Linux backend for the abstract `Kernel` trait, built on the
//! `inotify` crate's blocking API.

use crate::delay::EventType;
use crate::kernel::{Kernel, RawEvent};
use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

fn watch_mask() -> WatchMask {
    WatchMask::CREATE
        | WatchMask::DELETE
        | WatchMask::DELETE_SELF
        | WatchMask::MODIFY
        | WatchMask::ATTRIB
        | WatchMask::MOVED_FROM
        | WatchMask::MOVED_TO
}

/// `inotify::WatchDescriptor` carries no public integer handle, so this
/// source hands the engine its own opaque `i32` ids and keeps the bijection
/// with the real descriptor locally.
pub struct InotifyEventSource {
    inotify: Inotify,
    next_id: i32,
    id_to_wd: HashMap<i32, WatchDescriptor>,
    wd_to_id: HashMap<WatchDescriptor, i32>,
    buffer: [u8; 4096],
    /// Pending `MOVED_FROM` waiting to be paired with its `MOVED_TO` by
    /// inotify's move cookie.
    pending_move: HashMap<u32, (i32, String)>,
    started: Instant,
    overflowed: bool,
}

impl InotifyEventSource {
    pub fn new() -> io::Result<Self> {
        Ok(InotifyEventSource {
            inotify: Inotify::init()?,
            next_id: 1,
            id_to_wd: HashMap::new(),
            wd_to_id: HashMap::new(),
            buffer: [0; 4096],
            pending_move: HashMap::new(),
            started: Instant::now(),
            overflowed: false,
        })
    }
}

impl Kernel for InotifyEventSource {
    fn add_watch(&mut self, path: &Path) -> io::Result<i32> {
        let wd = self.inotify.add_watch(path, watch_mask())?;
        if let Some(&existing) = self.wd_to_id.get(&wd) {
            return Ok(existing);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.id_to_wd.insert(id, wd.clone());
        self.wd_to_id.insert(wd, id);
        Ok(id)
    }

    fn remove_watch(&mut self, id: i32) -> io::Result<()> {
        if let Some(wd) = self.id_to_wd.remove(&id) {
            self.wd_to_id.remove(&wd);
            self.inotify.rm_watch(wd)?;
        }
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> io::Result<HashMap<String, bool>> {
        let mut out = HashMap::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let isdir = entry.file_type()?.is_dir();
            out.insert(name, isdir);
        }
        Ok(out)
    }

    fn real_dir(&self, path: &Path) -> io::Result<PathBuf> {
        path.canonicalize()
    }

    fn now(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    fn next_event(&mut self, deadline: Option<u64>) -> Option<RawEvent> {
        loop {
            let timeout = deadline.map(|d| {
                let remaining = d.saturating_sub(self.now());
                Duration::from_secs(remaining)
            });
            let events = match timeout {
                Some(t) if t.as_secs() == 0 => {
                    // Deadline already passed; do a non-blocking drain only.
                    self.inotify.read_events(&mut self.buffer).ok()?
                }
                _ => self.inotify.read_events_blocking(&mut self.buffer).ok()?,
            };

            for event in events {
                if event.mask.contains(EventMask::Q_OVERFLOW) {
                    self.overflowed = true;
                    return None;
                }
                let name = match event.name {
                    Some(os) => os.to_string_lossy().into_owned(),
                    None => continue,
                };
                let isdir = event.mask.contains(EventMask::ISDIR);
                let id = match self.wd_to_id.get(&event.wd) {
                    Some(&id) => id,
                    None => continue,
                };
                let now = self.now();

                if event.mask.contains(EventMask::MOVED_FROM) {
                    self.pending_move.insert(event.cookie, (id, name));
                    continue;
                }
                if event.mask.contains(EventMask::MOVED_TO) {
                    if let Some((from_wd, from_name)) = self.pending_move.remove(&event.cookie) {
                        return Some(RawEvent {
                            etype: EventType::Move,
                            wd: from_wd,
                            isdir,
                            time: now,
                            name: from_name,
                            wd2: Some(id),
                            name2: Some(name),
                        });
                    }
                    return Some(RawEvent { etype: EventType::Create, wd: id, isdir, time: now, name, wd2: None, name2: None });
                }

                let etype = if event.mask.contains(EventMask::CREATE) {
                    EventType::Create
                } else if event.mask.contains(EventMask::DELETE) || event.mask.contains(EventMask::DELETE_SELF) {
                    EventType::Delete
                } else if event.mask.contains(EventMask::ATTRIB) {
                    EventType::Attrib
                } else if event.mask.contains(EventMask::MODIFY) {
                    EventType::Modify
                } else {
                    continue;
                };

                return Some(RawEvent { etype, wd: id, isdir, time: now, name, wd2: None, name2: None });
            }
        }
    }

    fn take_overflow(&mut self) -> bool {
        std::mem::replace(&mut self.overflowed, false)
    }
}
