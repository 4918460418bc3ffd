//! Bidirectional `wd ⇄ absolute_path` map, plus `sync → watched_root`
//! bindings, and the recursive watch-installation walk.

use crate::kernel::Kernel;
use crate::sync::Sync;
use log::warn;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub struct Watch {
    wd_to_path: HashMap<i32, PathBuf>,
    path_to_wd: HashMap<PathBuf, i32>,
    /// Index into `syncs`, keyed by the sync's watched root.
    roots: HashMap<PathBuf, usize>,
    syncs: Vec<Rc<Sync>>,
}

impl Watch {
    pub fn new() -> Self {
        Watch {
            wd_to_path: HashMap::new(),
            path_to_wd: HashMap::new(),
            roots: HashMap::new(),
            syncs: Vec::new(),
        }
    }

    pub fn syncs(&self) -> &[Rc<Sync>] {
        &self.syncs
    }

    pub fn path_of(&self, wd: i32) -> Option<&Path> {
        self.wd_to_path.get(&wd).map(PathBuf::as_path)
    }

    /// Binds `root` to `sync` and installs a recursive watch on it without
    /// raising synthetic events: the startup blanket delay (added by
    /// `Sync::run_init`) handles the initial reconciliation instead.
    pub fn add_sync(&mut self, kernel: &mut dyn Kernel, sync: Rc<Sync>, root: PathBuf) {
        let idx = self.syncs.len();
        self.syncs.push(sync);
        self.roots.insert(root.clone(), idx);
        self.add_watch(kernel, &root, true, None, 0);
    }

    /// Installs a watch on `path`. If `recurse`, walks into subdirectories
    /// installing watches on each. If `raise_sync` is given, synthesizes a
    /// `Create` delay (at `raise_time`) for every child found, used when a
    /// directory appears after startup and needs its existing contents
    /// picked up.
    pub fn add_watch(
        &mut self,
        kernel: &mut dyn Kernel,
        path: &Path,
        recurse: bool,
        raise_sync: Option<&Rc<Sync>>,
        raise_time: u64,
    ) {
        let wd = match kernel.add_watch(path) {
            Ok(wd) => wd,
            Err(e) => {
                warn!("failed to add watch on {}: {}", path.display(), e);
                return;
            }
        };

        if let Some(stale) = self.wd_to_path.insert(wd, path.to_path_buf()) {
            if stale != path {
                self.path_to_wd.remove(&stale);
            }
        }
        self.path_to_wd.insert(path.to_path_buf(), wd);

        if !recurse && raise_sync.is_none() {
            return;
        }

        let children = match kernel.read_dir(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to enumerate {}: {}", path.display(), e);
                return;
            }
        };

        for (name, is_dir) in children {
            let child_path = path.join(&name);
            if is_dir && recurse {
                self.add_watch(kernel, &child_path, recurse, raise_sync, raise_time);
            }
            if let Some(sync) = raise_sync {
                let prefix = match path.strip_prefix(sync.source()) {
                    Ok(relative) if relative.as_os_str().is_empty() => String::new(),
                    Ok(relative) => format!("{}/", relative.to_string_lossy()),
                    Err(_) => String::new(),
                };
                let mut rel = format!("{}{}", prefix, name);
                if is_dir {
                    rel.push('/');
                }
                sync.delay(crate::delay::EventType::Create, Some(raise_time), raise_time, rel, None);
            }
        }
    }

    /// Removes the watch on `path`. If `ask_kernel`, asks the OS facility to
    /// drop it too; when a watch is being "moved" across a rename the
    /// kernel has already discarded it, so the caller passes `false`.
    pub fn remove_watch(&mut self, kernel: &mut dyn Kernel, path: &Path, ask_kernel: bool) {
        let wd = match self.path_to_wd.remove(path) {
            Some(wd) => wd,
            None => return,
        };
        self.wd_to_path.remove(&wd);
        if ask_kernel {
            if let Err(e) = kernel.remove_watch(wd) {
                warn!("failed to remove watch on {}: {}", path.display(), e);
            }
        }
    }

    pub fn registry_report(&self, out: &mut String) {
        use std::fmt::Write as _;
        let mut entries: Vec<_> = self.wd_to_path.iter().collect();
        entries.sort_by_key(|(wd, _)| **wd);
        for (wd, path) in entries {
            let _ = writeln!(out, "{}: {}", wd, path.display());
        }
    }
}
