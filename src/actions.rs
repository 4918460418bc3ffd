//! Built-in `action`/`collect` pairs for the `-rsync`/`-rsyncssh` CLI
//! shortcuts and for file-configured syncs that don't supply their own
//! scripted action.

use crate::inlet::Inlet;
use crate::sync::{Agent, ActionFn, CollectFn, CollectOutcome};
use log::{info, warn};
use std::process::Command;
use std::rc::Rc;

/// Spawns `rsync -a --delete <source>/ <target>/` whenever the primary
/// delay becomes ready. The invocation mirrors the whole source tree
/// regardless of which single change triggered it, so it also drains every
/// other delay still sitting in the FIFO for this sync.
pub fn rsync_action() -> ActionFn {
    Rc::new(|inlet: &Inlet| {
        let source = inlet.source_pathname();
        let target = inlet.target_pathname();

        let mut command = Command::new("rsync");
        command.arg("-a").arg("--delete").arg(format!("{}/", source.display())).arg(format!("{}/", target));

        match inlet.spawn(command) {
            Ok(pid) => info!("spawned rsync pid={} {} -> {}", pid, source.display(), target),
            Err(e) => warn!("failed to spawn rsync: {}", e),
        }
    })
}

/// As `rsync_action`, but shells out over ssh (`rsync -a --delete -e ssh`).
pub fn rsync_ssh_action() -> ActionFn {
    Rc::new(|inlet: &Inlet| {
        let source = inlet.source_pathname();
        let target = inlet.target_pathname();

        let mut command = Command::new("rsync");
        command.arg("-a").arg("--delete").arg("-e").arg("ssh").arg(format!("{}/", source.display())).arg(target);

        match inlet.spawn(command) {
            Ok(pid) => info!("spawned rsync+ssh pid={} {}", pid, source.display()),
            Err(e) => warn!("failed to spawn rsync+ssh: {}", e),
        }
    })
}

/// `collect` for both built-ins: exit code 0 is success, 5/10/23/24/30/35
/// are rsync's documented transient/partial-transfer codes and are
/// retried, anything else removes the delay(s) without retrying.
pub fn rsync_collect() -> CollectFn {
    Rc::new(|agent: &Agent, exitcode: i32| {
        if exitcode == 0 {
            return CollectOutcome::Done;
        }
        const TRANSIENT: &[i32] = &[5, 10, 23, 24, 30, 35];
        if TRANSIENT.contains(&exitcode) {
            warn!("rsync exited {} (transient), retrying {} delay(s)", exitcode, agent.delays().len());
            return CollectOutcome::Again;
        }
        warn!("rsync exited {}, giving up on {} delay(s)", exitcode, agent.delays().len());
        CollectOutcome::Done
    })
}
