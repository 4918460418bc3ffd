//! The narrow view a user `action`/`init`/`collect` callback sees of the
//! next event (or batch of events) and the handful of mutating operations
//! it is allowed to perform.

use crate::delay::{Alarm, Delay, DelayStatus, EventType};
use crate::sync::{SyncConfig, SyncState};
use log::warn;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

/// Which side of a `Move` this delay represents, from the point of view of
/// whoever is looking at it through an `Inlet`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveSide {
    None,
    From,
    To,
}

pub struct Inlet {
    delays: Vec<Delay>,
    config: Rc<SyncConfig>,
    state: Rc<RefCell<SyncState>>,
}

impl Inlet {
    pub fn single(delay: Delay, config: Rc<SyncConfig>, state: Rc<RefCell<SyncState>>) -> Self {
        Inlet { delays: vec![delay], config, state }
    }

    pub fn batch(delays: Vec<Delay>, config: Rc<SyncConfig>, state: Rc<RefCell<SyncState>>) -> Self {
        Inlet { delays, config, state }
    }

    pub fn is_list(&self) -> bool {
        self.delays.len() != 1
    }

    fn primary(&self) -> &Delay {
        &self.delays[0]
    }

    pub fn etype(&self) -> EventType {
        self.primary().etype()
    }

    pub fn status(&self) -> DelayStatus {
        self.primary().status()
    }

    pub fn path(&self) -> String {
        self.primary().path()
    }

    pub fn path2(&self) -> Option<String> {
        self.primary().path2()
    }

    pub fn isdir(&self) -> bool {
        self.primary().is_dir()
    }

    pub fn mv(&self) -> MoveSide {
        match self.etype() {
            EventType::Move => MoveSide::From,
            _ => MoveSide::None,
        }
    }

    /// Basename with trailing slash preserved for directories.
    pub fn name(&self) -> String {
        basename_of(&self.path())
    }

    /// Basename without a trailing slash.
    pub fn basename(&self) -> String {
        self.name().trim_end_matches('/').to_string()
    }

    /// Parent directory, with a trailing slash.
    pub fn pathdir(&self) -> String {
        dirname_of(&self.path())
    }

    /// `path` without a trailing slash.
    pub fn pathname(&self) -> String {
        self.path().trim_end_matches('/').to_string()
    }

    pub fn source(&self) -> PathBuf {
        self.config.source.clone()
    }

    pub fn source_path(&self) -> PathBuf {
        join_relative(&self.config.source, &self.path())
    }

    pub fn source_pathname(&self) -> PathBuf {
        join_relative(&self.config.source, &self.pathname())
    }

    pub fn target(&self) -> String {
        self.config.target.clone()
    }

    pub fn target_path(&self) -> String {
        join_target(&self.config.target, &self.path())
    }

    pub fn target_pathname(&self) -> String {
        join_target(&self.config.target, &self.pathname())
    }

    pub fn config(&self) -> Rc<SyncConfig> {
        self.config.clone()
    }

    /// All `(etype, path, path2)` triples in the batch, optionally rewritten
    /// by `mutator`.
    pub fn get_paths<F>(&self, mutator: Option<F>) -> Vec<(EventType, String, Option<String>)>
    where
        F: Fn(EventType, String, Option<String>) -> (EventType, String, Option<String>),
    {
        self.delays
            .iter()
            .map(|d| {
                let triple = (d.etype(), d.path(), d.path2());
                match &mutator {
                    Some(f) => f(triple.0, triple.1, triple.2),
                    None => triple,
                }
            })
            .collect()
    }

    pub fn delays(&self) -> &[Delay] {
        &self.delays
    }

    /// Launches `command` as the action for this event (or batch). The
    /// delay(s) transition to `Active` and are registered against the
    /// resulting pid so a later `collect(pid, ...)` can find them.
    pub fn spawn(&self, mut command: Command) -> std::io::Result<u32> {
        // Dropping `Child` here does not wait() or kill(); reaping happens
        // out-of-band when the main loop's SIGCHLD handler calls `collect`.
        let child = command.spawn()?;
        let pid = child.id();
        let mut state = self.state.borrow_mut();
        for d in &self.delays {
            d.set_status(DelayStatus::Active);
        }
        state.register_process(pid, self.delays.clone());
        Ok(pid)
    }

    /// Drops `event` from the FIFO without running an action for it. Must be
    /// `Wait`, otherwise logged and ignored.
    pub fn discard_event(&self, event: &Delay) {
        if event.status() != DelayStatus::Wait {
            warn!(
                "discardEvent called on a delay that is not waiting (status={}): {}",
                event.status(),
                event
            );
            return;
        }
        event.set_status(DelayStatus::Done);
        self.state.borrow_mut().fifo.remove_delay(event);
    }

    /// Appends a blanket (full reconciliation) delay, used from `init`.
    pub fn create_blanket_event(&self) -> Delay {
        self.state.borrow_mut().fifo.add_blanket(Alarm::Immediate)
    }

    pub fn add_exclude(&self, pattern: &str) {
        self.state.borrow_mut().excludes.add(pattern);
    }

    pub fn rm_exclude(&self, pattern: &str) {
        self.state.borrow_mut().excludes.remove(pattern);
    }
}

fn basename_of(path: &str) -> String {
    let is_dir = path.ends_with('/');
    let trimmed = path.trim_end_matches('/');
    let base = Path::new(trimmed)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if is_dir {
        format!("{}/", base)
    } else {
        base
    }
}

fn dirname_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => format!("{}/", &trimmed[..idx]),
        None => String::new(),
    }
}

fn join_relative(base: &Path, relative: &str) -> PathBuf {
    let mut p = base.to_path_buf();
    p.push(relative.trim_end_matches('/'));
    p
}

fn join_target(target: &str, relative: &str) -> String {
    let target = target.trim_end_matches('/');
    let relative = relative.trim_end_matches('/');
    if relative.is_empty() {
        target.to_string()
    } else {
        format!("{}/{}", target, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_and_dirname_preserve_directory_slash() {
        assert_eq!(basename_of("a/b/c"), "c");
        assert_eq!(basename_of("a/b/c/"), "c/");
        assert_eq!(dirname_of("a/b/c"), "a/b/");
        assert_eq!(dirname_of("a/b/c/"), "a/b/");
        assert_eq!(dirname_of("c"), "");
    }

    #[test]
    fn target_join_strips_duplicate_slashes() {
        assert_eq!(join_target("host:/dest/", "sub/file"), "host:/dest/sub/file");
        assert_eq!(join_target("host:/dest", ""), "host:/dest");
    }
}
