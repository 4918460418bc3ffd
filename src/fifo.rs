//! The per-sync delay FIFO and the collapse engine that folds redundant
//! delays into each other as they arrive.

use crate::collapse::{collapse, CollapseDecision};
use crate::delay::{Alarm, Delay, DelayStatus, EventType};
use std::collections::HashSet;

/// What happened to an incoming delay after running it through the collapse
/// scan. Callers (`Sync::delay`) use this only for logging; the FIFO itself
/// has already been mutated to reflect the outcome.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Appended,
    Nullified,
    Absorbed,
    Replaced,
    Stacked,
}

#[derive(Default)]
pub struct DelayFifo {
    items: Vec<Delay>,
}

impl DelayFifo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delay> {
        self.items.iter()
    }

    /// Appends a blanket delay to the tail, stacking it on the current tail
    /// if one exists.
    pub fn add_blanket(&mut self, alarm: Alarm) -> Delay {
        let blanket = Delay::blanket(alarm);
        if let Some(tail) = self.items.last() {
            blanket.set_status(DelayStatus::Block);
            tail.push_block(blanket.clone());
        }
        self.items.push(blanket.clone());
        blanket
    }

    /// Runs the collapse scan for an already-alarm-stamped, already
    /// move-decomposed-if-needed `nd`, mutating the FIFO in place.
    ///
    /// Scans tail to head. A `Blanket` anywhere in the FIFO always wins: any
    /// delay arriving after it simply stacks on it (step 5's special case).
    pub fn enqueue(&mut self, nd: Delay) -> EnqueueOutcome {
        for od in self.items.iter().rev() {
            if od.etype() == EventType::Blanket {
                nd.set_status(DelayStatus::Block);
                od.push_block(nd.clone());
                self.items.push(nd);
                return EnqueueOutcome::Stacked;
            }

            match collapse(od, &nd) {
                CollapseDecision::Continue => continue,
                CollapseDecision::Nullify => {
                    od.borrow_mut().etype = EventType::None;
                    self.remove_delay(od);
                    return EnqueueOutcome::Nullified;
                }
                CollapseDecision::Absorb => {
                    return EnqueueOutcome::Absorbed;
                }
                CollapseDecision::Replace => {
                    if od.etype() == EventType::Move {
                        let origin = od.path();
                        {
                            let mut inner = od.borrow_mut();
                            inner.etype = EventType::Delete;
                            inner.path = origin;
                            inner.path2 = None;
                        }
                        self.items.push(nd);
                    } else {
                        let mut inner = od.borrow_mut();
                        inner.etype = nd.etype();
                        inner.path = nd.path();
                        inner.path2 = nd.path2();
                    }
                    return EnqueueOutcome::Replaced;
                }
                CollapseDecision::Stack => {
                    nd.set_status(DelayStatus::Block);
                    od.push_block(nd.clone());
                    self.items.push(nd);
                    return EnqueueOutcome::Stacked;
                }
            }
        }

        self.items.push(nd);
        EnqueueOutcome::Appended
    }

    pub fn push_tail(&mut self, d: Delay) {
        self.items.push(d);
    }

    /// Removes `target` from the FIFO by identity and releases everything it
    /// was blocking back to `Wait`.
    pub fn remove_delay(&mut self, target: &Delay) -> bool {
        let pos = self.items.iter().position(|d| Delay::same(d, target));
        let pos = match pos {
            Some(p) => p,
            None => return false,
        };
        let removed = self.items.remove(pos);
        for blocked in removed.blocks() {
            blocked.set_status(DelayStatus::Wait);
        }
        true
    }

    /// First `Wait` delay's alarm, scanning front to back, or `None` if the
    /// caller is already at its process-slot limit.
    pub fn get_alarm(&self, at_process_limit: bool) -> Option<Alarm> {
        if at_process_limit {
            return None;
        }
        self.items
            .iter()
            .find(|d| d.status() == DelayStatus::Wait)
            .map(|d| d.alarm())
    }

    /// The first `Wait` delay, honoring the alarm gate unless the FIFO is
    /// saturated, in which case the oldest `Wait` delay runs immediately to
    /// relieve backpressure.
    pub fn next_ready(&self, now: u64, max_delays: usize) -> Option<Delay> {
        let saturated = self.items.len() >= max_delays;
        for d in &self.items {
            if d.status() != DelayStatus::Wait {
                continue;
            }
            if !saturated && !d.alarm().has_elapsed(now) {
                // FIFO is roughly time-ordered: later waits are no earlier.
                return None;
            }
            return Some(d.clone());
        }
        None
    }

    /// Delays that are not `Active`, optionally matching `predicate`, and not
    /// transitively blocked by anything `Active` or rejected by `predicate`.
    pub fn get_delays(&self, predicate: Option<&dyn Fn(&Delay) -> bool>) -> Vec<Delay> {
        let mut blocked_ptrs: HashSet<usize> = HashSet::new();
        for d in &self.items {
            let rejected = d.status() == DelayStatus::Active
                || predicate.map(|p| !p(d)).unwrap_or(false);
            if rejected {
                mark_transitively_blocked(d, &mut blocked_ptrs);
            }
        }

        self.items
            .iter()
            .filter(|d| {
                d.status() != DelayStatus::Active
                    && predicate.map(|p| p(d)).unwrap_or(true)
                    && !blocked_ptrs.contains(&d.id())
            })
            .cloned()
            .collect()
    }
}

fn mark_transitively_blocked(d: &Delay, seen: &mut HashSet<usize>) {
    for blocked in d.blocks() {
        if seen.insert(blocked.id()) {
            mark_transitively_blocked(&blocked, seen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn immediate(etype: EventType, path: &str) -> Delay {
        Delay::new(etype, Alarm::Immediate, path, None)
    }

    #[test]
    fn burst_collapse_absorbs_into_single_create() {
        let mut fifo = DelayFifo::new();
        assert_eq!(fifo.enqueue(immediate(EventType::Create, "f")), EnqueueOutcome::Appended);
        assert_eq!(fifo.enqueue(immediate(EventType::Modify, "f")), EnqueueOutcome::Absorbed);
        assert_eq!(fifo.enqueue(immediate(EventType::Modify, "f")), EnqueueOutcome::Absorbed);
        assert_eq!(fifo.len(), 1);
        assert_eq!(fifo.iter().next().unwrap().etype(), EventType::Create);
    }

    #[test]
    fn create_then_delete_nullifies_to_empty_fifo() {
        let mut fifo = DelayFifo::new();
        fifo.enqueue(immediate(EventType::Create, "f"));
        fifo.enqueue(immediate(EventType::Delete, "f"));
        assert!(fifo.is_empty());
    }

    #[test]
    fn parent_delete_stacks_on_child_modify() {
        let mut fifo = DelayFifo::new();
        fifo.enqueue(immediate(EventType::Modify, "d/f"));
        let outcome = fifo.enqueue(immediate(EventType::Delete, "d/"));
        assert_eq!(outcome, EnqueueOutcome::Stacked);
        assert_eq!(fifo.len(), 2);

        let modify = fifo.iter().next().unwrap().clone();
        assert_eq!(modify.status(), DelayStatus::Wait);
        let delete = fifo.iter().nth(1).unwrap().clone();
        assert_eq!(delete.status(), DelayStatus::Block);

        fifo.remove_delay(&modify);
        assert_eq!(delete.status(), DelayStatus::Wait);
    }

    #[test]
    fn blanket_blocks_everything_after_it() {
        let mut fifo = DelayFifo::new();
        let blanket = fifo.add_blanket(Alarm::Immediate);
        fifo.enqueue(immediate(EventType::Create, "f"));
        assert_eq!(fifo.len(), 2);
        assert_eq!(fifo.get_alarm(false), Some(Alarm::Immediate));
        assert_eq!(
            fifo.iter().nth(1).unwrap().status(),
            DelayStatus::Block
        );
        fifo.remove_delay(&blanket);
        assert_eq!(fifo.iter().next().unwrap().status(), DelayStatus::Wait);
    }

    #[test]
    fn fifo_saturation_bypasses_alarm_gate() {
        let mut fifo = DelayFifo::new();
        let future = Delay::new(EventType::Create, Alarm::At(1_000_000), "f", None);
        fifo.push_tail(future.clone());
        // Not saturated: future delay is not ready yet.
        assert!(fifo.next_ready(0, 10).is_none());
        // Saturated (max_delays == 1 == len): alarm gate bypassed.
        assert!(fifo.next_ready(0, 1).is_some());
    }

    #[test]
    fn get_delays_excludes_active_and_its_blocked_set() {
        let mut fifo = DelayFifo::new();
        let active = immediate(EventType::Modify, "a");
        active.set_status(DelayStatus::Active);
        let blocked = immediate(EventType::Modify, "a");
        blocked.set_status(DelayStatus::Block);
        active.push_block(blocked.clone());
        fifo.push_tail(active);
        fifo.push_tail(blocked);
        fifo.push_tail(immediate(EventType::Modify, "b"));

        let batch = fifo.get_delays(None);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].path(), "b");
    }
}
