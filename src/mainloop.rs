//! Daemon lifecycle and the central dispatch loop.

use crate::dispatch::dispatch;
use crate::kernel::Kernel;
use crate::status::StatusWriter;
use crate::sync::Sync;
use crate::watch::Watch;
use log::{error, info, warn};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DaemonStatus {
    Init,
    Run,
    Fade,
}

pub struct MainLoop {
    kernel: Box<dyn Kernel>,
    watch: Watch,
    syncs: Vec<Rc<Sync>>,
    status: DaemonStatus,
    status_writer: Option<StatusWriter>,
    term_requested: Arc<AtomicBool>,
    hup_requested: Arc<AtomicBool>,
    chld_requested: Arc<AtomicBool>,
}

impl MainLoop {
    pub fn new(kernel: Box<dyn Kernel>, status_writer: Option<StatusWriter>) -> Self {
        MainLoop {
            kernel,
            watch: Watch::new(),
            syncs: Vec::new(),
            status: DaemonStatus::Init,
            status_writer,
            term_requested: Arc::new(AtomicBool::new(false)),
            hup_requested: Arc::new(AtomicBool::new(false)),
            chld_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Installs handlers for `TERM`/`HUP` (transition `Run` into `Fade`) and
    /// `CHLD` (reap an exited child and call `collect` on each sync in turn).
    pub fn install_signal_handlers(&self) -> std::io::Result<()> {
        signal_hook::flag::register(signal_hook::consts::SIGTERM, self.term_requested.clone())?;
        signal_hook::flag::register(signal_hook::consts::SIGHUP, self.hup_requested.clone())?;
        signal_hook::flag::register(signal_hook::consts::SIGCHLD, self.chld_requested.clone())?;
        Ok(())
    }

    /// Drains every exited-but-unreaped child with a non-blocking
    /// `waitpid(-1, WNOHANG)` loop, feeding each to `reap`. Returns `true`
    /// if any `collect` callback demanded termination.
    pub fn reap_exited_children(&mut self) -> bool {
        if !self.chld_requested.swap(false, Ordering::Relaxed) {
            return false;
        }
        loop {
            let mut status: libc::c_int = 0;
            let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
            if pid <= 0 {
                break;
            }
            let exitcode = if libc::WIFEXITED(status) {
                libc::WEXITSTATUS(status)
            } else {
                -1
            };
            if self.reap(pid as u32, exitcode) {
                return true;
            }
        }
        false
    }

    /// Registers one configured sync, installing its initial recursive
    /// watch and startup blanket delay.
    pub fn add_sync(&mut self, sync: Rc<Sync>) {
        let root = sync.source().to_path_buf();
        sync.run_init();
        self.watch.add_sync(&mut *self.kernel, sync.clone(), root);
        self.syncs.push(sync);
    }

    pub fn finish_init(&mut self) {
        self.status = DaemonStatus::Run;
    }

    fn soonest_alarm(&self) -> Option<u64> {
        self.syncs
            .iter()
            .filter_map(|s| s.get_alarm())
            .map(|a| match a {
                crate::delay::Alarm::Immediate => self.kernel.now(),
                crate::delay::Alarm::At(t) => t,
            })
            .min()
    }

    fn running_processes(&self) -> usize {
        self.syncs.iter().map(|s| s.process_count()).sum()
    }

    /// Runs exactly one iteration of the loop: handles pending signals,
    /// drains ready kernel events, drives due actions, and (in `run`)
    /// refreshes the status file. Returns `false` once the daemon should
    /// exit (fade complete).
    pub fn tick(&mut self) -> bool {
        if self.term_requested.swap(false, Ordering::Relaxed) {
            info!("received TERM, entering fade");
            self.status = DaemonStatus::Fade;
        }
        if self.hup_requested.swap(false, Ordering::Relaxed) {
            info!("received HUP, entering fade");
            self.status = DaemonStatus::Fade;
        }
        if self.kernel.take_overflow() {
            error!("kernel event queue overflowed, coverage may have gaps; entering fade");
            self.status = DaemonStatus::Fade;
        }

        if self.reap_exited_children() {
            return false;
        }

        if self.status == DaemonStatus::Fade && self.running_processes() == 0 {
            info!("fade complete, all children drained");
            return false;
        }

        let deadline = self.soonest_alarm();
        if let Some(raw) = self.kernel.next_event(deadline) {
            dispatch(&mut self.watch, &mut *self.kernel, raw);
        }

        let now = self.kernel.now();

        if self.status == DaemonStatus::Run {
            for sync in &self.syncs {
                sync.invoke_actions(now);
            }
            if let Some(writer) = &mut self.status_writer {
                writer.maybe_write(now, &self.syncs, &self.watch);
            }
        }

        true
    }

    /// Looks up a completed child across every sync in turn until one claims
    /// the pid. Returns `true` if the daemon must now terminate (a `collect`
    /// callback returned `Die`).
    pub fn reap(&mut self, pid: u32, exitcode: i32) -> bool {
        let now = self.kernel.now();
        for sync in &self.syncs {
            match sync.collect(pid, exitcode, now) {
                crate::sync::CollectResult::NotMine => continue,
                crate::sync::CollectResult::Handled => return false,
                crate::sync::CollectResult::Die => {
                    error!("collect callback for pid={} requested termination", pid);
                    return true;
                }
            }
        }
        warn!("reaped unknown pid={}", pid);
        false
    }

    pub fn status(&self) -> DaemonStatus {
        self.status
    }
}
