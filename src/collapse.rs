//! The default collapse table and the machinery for applying it to a pair
//! of delays, including the Move-as-two-sub-events wrinkle.

use crate::delay::{Delay, EventType};

/// What the collapse scan should do with the pair `(od, nd)` it is looking at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CollapseDecision {
    /// No relation between `od` and `nd`; keep scanning further back.
    Continue,
    /// Nullify `od` and drop `nd`.
    Nullify,
    /// Drop `nd`, `od` stands.
    Absorb,
    /// Overwrite `od`'s type (and path/path2) with `nd`'s; drop `nd`. If
    /// `od` was itself a `Move`, the caller degrades it to `Delete(od.path)`
    /// and appends `nd` fresh instead (see `collapse::apply`).
    Replace,
    /// `nd` stacks on top of `od`: `nd.status = Block`, `nd` is appended to
    /// `od.blocks` and to the FIFO tail.
    Stack,
}

/// The six columns/rows of the default collapse table. A `Move` delay
/// contributes two sub-events for table-lookup purposes (its origin as
/// `MoveFr`, its destination as `MoveTo`); this enum is never the `EventType`
/// of a real `Delay`, it only labels a sub-event during the scan.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum CollapseKind {
    Attrib,
    Modify,
    Create,
    Delete,
    MoveFr,
    MoveTo,
}

/// One path-bearing sub-event of a delay, used while scanning for a collapse
/// match. Non-`Move` delays contribute exactly one; `Move` delays contribute
/// two (origin, destination).
struct SubEvent {
    kind: CollapseKind,
    path: String,
}

fn sub_events(d: &Delay) -> Vec<SubEvent> {
    match d.etype() {
        EventType::Attrib => vec![SubEvent { kind: CollapseKind::Attrib, path: d.path() }],
        EventType::Modify => vec![SubEvent { kind: CollapseKind::Modify, path: d.path() }],
        EventType::Create => vec![SubEvent { kind: CollapseKind::Create, path: d.path() }],
        EventType::Delete => vec![SubEvent { kind: CollapseKind::Delete, path: d.path() }],
        EventType::Move => vec![
            SubEvent { kind: CollapseKind::MoveFr, path: d.path() },
            SubEvent { kind: CollapseKind::MoveTo, path: d.path2().expect("Move has path2") },
        ],
        EventType::Blanket | EventType::None => Vec::new(),
    }
}

/// The static 6x6 lookup table, encoded as a match over (old, new) kind
/// pairs. The MoveFr/MoveFr cell has no well-defined "combine two moves"
/// semantics, so it conservatively falls back to Stack rather than
/// guessing.
fn table_lookup(old: CollapseKind, new: CollapseKind) -> CollapseDecision {
    use CollapseDecision::*;
    use CollapseKind::*;
    match (old, new) {
        (Attrib, Attrib) => Absorb,
        (Attrib, Modify) => Replace,
        (Attrib, Create) => Replace,
        (Attrib, Delete) => Replace,
        (Attrib, MoveFr) => Stack,
        (Attrib, MoveTo) => Replace,

        (Modify, Attrib) => Absorb,
        (Modify, Modify) => Absorb,
        (Modify, Create) => Replace,
        (Modify, Delete) => Replace,
        (Modify, MoveFr) => Stack,
        (Modify, MoveTo) => Replace,

        (Create, Attrib) => Absorb,
        (Create, Modify) => Absorb,
        (Create, Create) => Absorb,
        (Create, Delete) => Nullify,
        (Create, MoveFr) => Stack,
        (Create, MoveTo) => Replace,

        (Delete, Attrib) => Absorb,
        (Delete, Modify) => Absorb,
        (Delete, Create) => Stack,
        (Delete, Delete) => Absorb,
        (Delete, MoveFr) => Stack,
        (Delete, MoveTo) => Replace,

        // Conservative: stack rather than collapse two moves together.
        (MoveFr, _) => Stack,

        (MoveTo, Attrib) => Stack,
        (MoveTo, Modify) => Stack,
        (MoveTo, Create) => Replace,
        (MoveTo, Delete) => Replace,
        (MoveTo, MoveFr) => Stack,
        (MoveTo, MoveTo) => Replace,
    }
}

/// True iff `maybe_parent` is a directory path that is a strict prefix of
/// `path` (parent/child blocking rule).
fn is_dir_prefix(maybe_parent: &str, path: &str) -> bool {
    maybe_parent.ends_with('/') && maybe_parent != path && path.starts_with(maybe_parent)
}

struct MatchedPair {
    decision: CollapseDecision,
}

/// Evaluate the collapse relation between an existing FIFO delay `od` and an
/// incoming delay `nd`: scan all (origin, destination) sub-event pairs in
/// order `(od,nd), (od2,nd), (od,nd2), (od2,nd2)` and return the first
/// non-`Continue` decision.
pub fn collapse(od: &Delay, nd: &Delay) -> CollapseDecision {
    evaluate(od, nd).map(|m| m.decision).unwrap_or(CollapseDecision::Continue)
}

fn evaluate(od: &Delay, nd: &Delay) -> Option<MatchedPair> {
    let od_subs = sub_events(od);
    let nd_subs = sub_events(nd);
    let od_active = od.status() == crate::delay::DelayStatus::Active;

    // Order: (od,nd), (od2,nd), (od,nd2), (od2,nd2) -- nd varies slowest.
    for nd_sub in &nd_subs {
        for od_sub in &od_subs {
            if od_sub.path == nd_sub.path {
                let decision = if od_active {
                    CollapseDecision::Stack
                } else {
                    table_lookup(od_sub.kind, nd_sub.kind)
                };
                return Some(MatchedPair { decision });
            }
            if is_dir_prefix(&od_sub.path, &nd_sub.path) || is_dir_prefix(&nd_sub.path, &od_sub.path) {
                return Some(MatchedPair { decision: CollapseDecision::Stack });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::Alarm;

    #[test]
    fn create_then_delete_nullifies() {
        let od = Delay::new(EventType::Create, Alarm::Immediate, "f", None);
        let nd = Delay::new(EventType::Delete, Alarm::Immediate, "f", None);
        assert_eq!(collapse(&od, &nd), CollapseDecision::Nullify);
    }

    #[test]
    fn attrib_then_modify_replaces() {
        let od = Delay::new(EventType::Attrib, Alarm::Immediate, "f", None);
        let nd = Delay::new(EventType::Modify, Alarm::Immediate, "f", None);
        assert_eq!(collapse(&od, &nd), CollapseDecision::Replace);
    }

    #[test]
    fn modify_then_modify_absorbs() {
        let od = Delay::new(EventType::Modify, Alarm::Immediate, "f", None);
        let nd = Delay::new(EventType::Modify, Alarm::Immediate, "f", None);
        assert_eq!(collapse(&od, &nd), CollapseDecision::Absorb);
    }

    #[test]
    fn unrelated_paths_continue() {
        let od = Delay::new(EventType::Modify, Alarm::Immediate, "a", None);
        let nd = Delay::new(EventType::Modify, Alarm::Immediate, "b", None);
        assert_eq!(collapse(&od, &nd), CollapseDecision::Continue);
    }

    #[test]
    fn parent_directory_stacks_on_child() {
        let od = Delay::new(EventType::Modify, Alarm::Immediate, "d/f", None);
        let nd = Delay::new(EventType::Delete, Alarm::Immediate, "d/", None);
        assert_eq!(collapse(&od, &nd), CollapseDecision::Stack);
    }

    #[test]
    fn active_old_delay_always_stacks() {
        let od = Delay::new(EventType::Modify, Alarm::Immediate, "f", None);
        od.set_status(crate::delay::DelayStatus::Active);
        let nd = Delay::new(EventType::Modify, Alarm::Immediate, "f", None);
        assert_eq!(collapse(&od, &nd), CollapseDecision::Stack);
    }

    #[test]
    fn move_destination_replaces_matching_create() {
        let od = Delay::new(EventType::Create, Alarm::Immediate, "b", None);
        let nd = Delay::new(EventType::Move, Alarm::Immediate, "a", Some("b".into()));
        assert_eq!(collapse(&od, &nd), CollapseDecision::Replace);
    }

    #[test]
    fn move_origin_stacks_on_matching_modify() {
        let od = Delay::new(EventType::Modify, Alarm::Immediate, "a", None);
        let nd = Delay::new(EventType::Move, Alarm::Immediate, "a", Some("b".into()));
        assert_eq!(collapse(&od, &nd), CollapseDecision::Stack);
    }
}
