//! Periodic status-file writer.

use crate::sync::Sync;
use crate::watch::Watch;
use log::warn;
use std::fs;
use std::path::Path;
use std::rc::Rc;

pub struct StatusWriter {
    path: std::path::PathBuf,
    interval: u64,
    last_written: Option<u64>,
}

impl StatusWriter {
    pub fn new(path: impl Into<std::path::PathBuf>, interval: u64) -> Self {
        StatusWriter { path: path.into(), interval, last_written: None }
    }

    /// Rewrites the status file if `interval` seconds have elapsed since
    /// the last write (or it has never been written).
    pub fn maybe_write(&mut self, now: u64, syncs: &[Rc<Sync>], watch: &Watch) {
        let due = match self.last_written {
            Some(last) => now.saturating_sub(last) >= self.interval,
            None => true,
        };
        if !due {
            return;
        }

        let mut out = String::new();
        for sync in syncs {
            sync.status_report(&mut out);
        }
        watch.registry_report(&mut out);

        if let Err(e) = fs::write(&self.path, out) {
            warn!("failed to write status file {}: {}", self.path.display(), e);
        }
        self.last_written = Some(now);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
