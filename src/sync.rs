//! A `Sync` binds one source -> target mirror's configuration to its delay
//! FIFO, exclude set, and running-process table.

use crate::delay::{Alarm, Delay, DelayStatus, EventType};
use crate::excludes::Excludes;
use crate::fifo::DelayFifo;
use crate::inlet::Inlet;
use log::{info, warn};
use logging_timer::{finish, stimer, Level};
use std::cell::RefCell;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::rc::Rc;

/// The single delay, or the list of delays, a `collect` callback is told
/// about for one completed pid.
#[derive(Clone)]
pub enum Agent {
    Single(Delay),
    List(Vec<Delay>),
}

impl Agent {
    pub fn delays(&self) -> Vec<Delay> {
        match self {
            Agent::Single(d) => vec![d.clone()],
            Agent::List(v) => v.clone(),
        }
    }
}

/// What a `collect` callback decided about a completed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    Die,
    Again,
    Done,
}

/// What a `Sync::collect` call tells the main loop to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectResult {
    NotMine,
    Die,
    Handled,
}

pub type ActionFn = Rc<dyn Fn(&Inlet)>;
pub type CollectFn = Rc<dyn Fn(&Agent, i32) -> CollectOutcome>;
pub type InitFn = Rc<dyn Fn(&Inlet)>;

/// Immutable configuration of one sync, shared (via `Rc`) between the
/// `Sync` itself and every `Inlet` it hands to user callbacks.
pub struct SyncConfig {
    pub name: String,
    pub source: PathBuf,
    pub target: String,
    /// Ticks added to `now` when a fresh delay's alarm is computed.
    pub delay: u64,
    pub max_processes: usize,
    pub max_delays: usize,
    /// If false (the default), `Move` events are decomposed into
    /// `Delete`+`Create` before they ever reach the FIFO.
    pub on_move: bool,
    pub action: ActionFn,
    pub collect: CollectFn,
    pub init: Option<InitFn>,
}

/// The mutable parts of a sync, reachable both from `Sync` itself and from
/// every `Inlet` handed out during `invoke_actions`/`collect`. A
/// single-threaded, cooperatively-scheduled engine needs no more than
/// `Rc<RefCell<_>>` here; see the design notes on callback-as-data ownership.
pub struct SyncState {
    pub fifo: DelayFifo,
    pub excludes: Excludes,
    pub processes: std::collections::HashMap<u32, Agent>,
}

impl SyncState {
    pub fn register_process(&mut self, pid: u32, delays: Vec<Delay>) {
        let agent = if delays.len() == 1 {
            Agent::Single(delays.into_iter().next().unwrap())
        } else {
            Agent::List(delays)
        };
        self.processes.insert(pid, agent);
    }
}

pub struct Sync {
    pub config: Rc<SyncConfig>,
    state: Rc<RefCell<SyncState>>,
}

impl Sync {
    pub fn new(config: SyncConfig) -> Self {
        Sync {
            config: Rc::new(config),
            state: Rc::new(RefCell::new(SyncState {
                fifo: DelayFifo::new(),
                excludes: Excludes::new(),
                processes: Default::default(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn source(&self) -> &std::path::Path {
        &self.config.source
    }

    /// Queues one filesystem change: exclusion filter, move decomposition,
    /// alarm assignment, then hands off to the FIFO's collapse engine.
    pub fn delay(&self, etype: EventType, time: Option<u64>, now: u64, path: String, path2: Option<String>) {
        // 1. Exclusion filter.
        {
            let excludes = &self.state.borrow().excludes;
            if etype != EventType::Move {
                if excludes.test(&path) {
                    return;
                }
            } else {
                let path2_ref = path2.as_deref().expect("Move always carries path2");
                let src_excluded = excludes.test(&path);
                let dst_excluded = excludes.test(path2_ref);
                match (src_excluded, dst_excluded) {
                    (true, true) => return,
                    (false, true) => return self.delay(EventType::Delete, time, now, path, None),
                    (true, false) => return self.delay(EventType::Create, time, now, path2.unwrap(), None),
                    (false, false) => {}
                }
            }
        }

        // 2. Move decomposition, unless this sync's action opted into raw moves.
        if etype == EventType::Move && !self.config.on_move {
            let dest = path2.expect("Move always carries path2");
            self.delay(EventType::Delete, time, now, path, None);
            self.delay(EventType::Create, time, now, dest, None);
            return;
        }

        // 3. Alarm assignment. Blanket events use the `Immediate` sentinel
        // and never reach this path (see `add_blanket_delay`).
        let alarm = match etype {
            EventType::Blanket => Alarm::Immediate,
            _ => {
                let raised_at = time.unwrap_or(now);
                Alarm::At((raised_at + self.config.delay).max(now))
            }
        };

        let nd = Delay::new(etype, alarm, path, path2);
        let outcome = self.state.borrow_mut().fifo.enqueue(nd);
        log::debug!("{}: delay enqueued, outcome={:?}", self.config.name, outcome);
    }

    pub fn add_blanket_delay(&self) -> Delay {
        self.state.borrow_mut().fifo.add_blanket(Alarm::Immediate)
    }

    /// `None` if already at the process-slot limit, else the soonest alarm
    /// among `Wait` delays.
    pub fn get_alarm(&self) -> Option<Alarm> {
        let state = self.state.borrow();
        let at_limit = state.processes.len() >= self.config.max_processes;
        state.fifo.get_alarm(at_limit)
    }

    pub fn get_next_delay(&self) -> Option<Delay> {
        self.state.borrow().fifo.iter().find(|d| d.status() == DelayStatus::Wait).cloned()
    }

    pub fn get_delays(&self, predicate: Option<&dyn Fn(&Delay) -> bool>) -> Vec<Delay> {
        self.state.borrow().fifo.get_delays(predicate)
    }

    pub fn remove_delay(&self, delay: &Delay) -> bool {
        self.state.borrow_mut().fifo.remove_delay(delay)
    }

    pub fn add_exclude(&self, pattern: &str) {
        self.state.borrow_mut().excludes.add(pattern);
    }

    pub fn remove_exclude(&self, pattern: &str) {
        self.state.borrow_mut().excludes.remove(pattern);
    }

    pub fn process_count(&self) -> usize {
        self.state.borrow().processes.len()
    }

    pub fn fifo_len(&self) -> usize {
        self.state.borrow().fifo.len()
    }

    pub fn run_init(&self) {
        if let Some(init) = self.config.init.clone() {
            let blanket = self.add_blanket_delay();
            let inlet = Inlet::single(blanket, self.config.clone(), self.state.clone());
            init(&inlet);
        } else {
            self.add_blanket_delay();
        }
    }

    /// Drives child-process spawning until the process table is full or
    /// there is nothing ready to run.
    pub fn invoke_actions(&self, now: u64) {
        loop {
            let at_limit = self.state.borrow().processes.len() >= self.config.max_processes;
            if at_limit {
                break;
            }

            let max_delays = self.config.max_delays;
            let next = self.state.borrow().fifo.next_ready(now, max_delays);
            let delay = match next {
                Some(d) => d,
                None => break,
            };

            let tmr = stimer!(Level::Debug; "action", "{} {}", self.config.name, delay);
            let inlet = Inlet::single(delay.clone(), self.config.clone(), self.state.clone());
            (self.config.action)(&inlet);
            finish!(tmr);

            if delay.status() == DelayStatus::Wait {
                warn!(
                    "{}: action left {} idle without spawning or discarding; retrying next cycle",
                    self.config.name, delay
                );
                break;
            }
        }
    }

    /// Looks up `pid` in the process table and, if it is ours, runs the
    /// `collect` callback and applies its decision.
    pub fn collect(&self, pid: u32, exitcode: i32, now: u64) -> CollectResult {
        let agent = self.state.borrow_mut().processes.remove(&pid);
        let agent = match agent {
            Some(a) => a,
            None => return CollectResult::NotMine,
        };

        let tmr = stimer!(Level::Debug; "collect", "{} pid={} exitcode={}", self.config.name, pid, exitcode);
        let outcome = (self.config.collect)(&agent, exitcode);
        finish!(tmr, "outcome={:?}", outcome);

        match outcome {
            CollectOutcome::Die => CollectResult::Die,
            CollectOutcome::Again => {
                let retry_in = self.config.delay.max(1);
                for d in agent.delays() {
                    d.set_status(DelayStatus::Wait);
                    d.set_alarm(Alarm::At(now + retry_in));
                }
                CollectResult::Handled
            }
            CollectOutcome::Done => {
                for d in agent.delays() {
                    self.state.borrow_mut().fifo.remove_delay(&d);
                }
                CollectResult::Handled
            }
        }
    }

    pub fn status_report(&self, out: &mut String) {
        let state = self.state.borrow();
        let _ = writeln!(out, "{} source={}", self.config.name, self.config.source.display());
        let _ = writeln!(out, "{}", state.fifo.len());
        for d in state.fifo.iter() {
            let _ = writeln!(out, "{}", d);
        }
        for p in state.excludes.patterns() {
            let _ = writeln!(out, "exclude: {}", p);
        }
    }
}
