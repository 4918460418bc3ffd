//! End-to-end scenarios driven through `Sync`/`Watch`/`dispatch` against the
//! deterministic `FakeEventSource`. No real `rsync` is invoked; actions spawn
//! `true`/`false` to exercise the real process-table/collect plumbing
//! without a network dependency.

use dirmirrord::delay::{Alarm, DelayStatus, EventType};
use dirmirrord::dispatch::dispatch;
use dirmirrord::fake_source::FakeEventSource;
use dirmirrord::inlet::Inlet;
use dirmirrord::kernel::{Kernel, RawEvent};
use dirmirrord::sync::{Agent, CollectOutcome, Sync, SyncConfig};
use dirmirrord::watch::Watch;
use std::cell::Cell;
use std::path::PathBuf;
use std::process::Command;
use std::rc::Rc;

fn spawning_action(count: Rc<Cell<u32>>) -> dirmirrord::sync::ActionFn {
    Rc::new(move |inlet: &Inlet| {
        count.set(count.get() + 1);
        let _ = inlet.spawn(Command::new("true"));
    })
}

fn counting_config(name: &str, action: dirmirrord::sync::ActionFn) -> SyncConfig {
    SyncConfig {
        name: name.into(),
        source: PathBuf::from("/src"),
        target: "/dst".into(),
        delay: 15,
        max_processes: 1,
        max_delays: 1000,
        on_move: false,
        action,
        collect: Rc::new(|_agent: &Agent, _code: i32| CollectOutcome::Done),
        init: None,
    }
}

#[test]
fn startup_recursive_sync_drains_via_one_spawn() {
    let mut fake = FakeEventSource::new();
    fake.seed_dir_entry("/src", "a", false);
    fake.seed_dir_entry("/src", "b", true);
    let mut kernel: Box<dyn Kernel> = Box::new(fake);

    let spawn_count = Rc::new(Cell::new(0));
    let sync = Rc::new(Sync::new(counting_config("s1", spawning_action(spawn_count.clone()))));

    let mut watch = Watch::new();
    sync.run_init();
    watch.add_sync(&mut *kernel, sync.clone(), PathBuf::from("/src"));

    // The blanket startup delay is the only thing in the FIFO; it is
    // immediately eligible.
    assert_eq!(sync.get_alarm(), Some(Alarm::Immediate));

    sync.invoke_actions(kernel.now());
    assert_eq!(spawn_count.get(), 1);
    assert_eq!(sync.process_count(), 1);

    // The blanket delay is now `active`, so it drops out of any
    // `get_delays` batch, and a second `invoke_actions` call finds nothing
    // else ready (process-slot limit of 1 is also already saturated).
    assert!(sync.get_delays(None).is_empty());
    assert_eq!(sync.fifo_len(), 1);
}

#[test]
fn burst_collapse_produces_single_create() {
    let mut fake = FakeEventSource::new();
    let sync = Sync::new(counting_config("s2", Rc::new(|_: &Inlet| {})));

    sync.delay(EventType::Create, Some(0), fake.now(), "f".into(), None);
    sync.delay(EventType::Modify, Some(1), fake.now(), "f".into(), None);
    sync.delay(EventType::Modify, Some(2), fake.now(), "f".into(), None);

    let delays = sync.get_delays(None);
    assert_eq!(delays.len(), 1);
    assert_eq!(delays[0].etype(), EventType::Create);
    assert_eq!(delays[0].path(), "f");

    fake.advance_clock(100);
}

#[test]
fn move_decomposition_without_onmove_is_delete_then_create() {
    let sync = Sync::new(counting_config("s3", Rc::new(|_: &Inlet| {})));
    sync.delay(EventType::Move, Some(0), 0, "a".into(), Some("b".into()));

    let delays = sync.get_delays(None);
    assert_eq!(delays.len(), 2);
    assert_eq!(delays[0].etype(), EventType::Delete);
    assert_eq!(delays[0].path(), "a");
    assert_eq!(delays[1].etype(), EventType::Create);
    assert_eq!(delays[1].path(), "b");
}

#[test]
fn partial_exclusion_of_move_destination_drops_to_delete() {
    let sync = Sync::new(counting_config("s4", Rc::new(|_: &Inlet| {})));
    sync.add_exclude("b");
    sync.delay(EventType::Move, Some(0), 0, "a".into(), Some("b".into()));

    let delays = sync.get_delays(None);
    assert_eq!(delays.len(), 1);
    assert_eq!(delays[0].etype(), EventType::Delete);
    assert_eq!(delays[0].path(), "a");
}

#[test]
fn parent_delete_stacks_until_child_modify_is_removed() {
    let sync = Sync::new(counting_config("s5", Rc::new(|_: &Inlet| {})));
    sync.delay(EventType::Modify, Some(0), 0, "d/f".into(), None);
    sync.delay(EventType::Delete, Some(0), 0, "d/".into(), None);

    assert_eq!(sync.fifo_len(), 2);
    let modify = sync.get_next_delay().unwrap();
    assert_eq!(modify.path(), "d/f");
    assert_eq!(modify.status(), DelayStatus::Wait);

    // get_delays only excludes delays rooted on something Active (or
    // rejected by a predicate); the delete is merely stacked on the modify,
    // not Active, so it's still part of the batch even though it isn't the
    // FIFO head `get_next_delay` would dispatch next.
    let runnable = sync.get_delays(None);
    assert_eq!(runnable.len(), 2);

    sync.remove_delay(&modify);
    assert_eq!(sync.fifo_len(), 1);
    let delete = sync.get_next_delay().unwrap();
    assert_eq!(delete.path(), "d/");
    assert_eq!(delete.status(), DelayStatus::Wait);
}

#[test]
fn retry_on_transient_failure_reschedules_with_new_alarm() {
    let pid_cell = Rc::new(Cell::new(0u32));
    let pid_cell2 = pid_cell.clone();
    let action: dirmirrord::sync::ActionFn = Rc::new(move |inlet: &Inlet| {
        if let Ok(pid) = inlet.spawn(Command::new("true")) {
            pid_cell2.set(pid);
        }
    });
    let config = SyncConfig {
        collect: Rc::new(|_agent: &Agent, code: i32| if code == 5 { CollectOutcome::Again } else { CollectOutcome::Done }),
        ..counting_config("s6", action)
    };
    let sync = Sync::new(config);
    sync.delay(EventType::Modify, Some(0), 0, "f".into(), None);
    sync.invoke_actions(1000);
    assert_eq!(sync.process_count(), 1);
    assert_ne!(pid_cell.get(), 0);

    sync.collect(pid_cell.get(), 5, 2000);
    assert_eq!(sync.process_count(), 0);

    let delay = sync.get_next_delay().unwrap();
    assert_eq!(delay.status(), DelayStatus::Wait);
    assert_eq!(delay.alarm(), Alarm::At(2015));
}

#[test]
fn dispatch_translates_raw_move_event_into_sync_relative_paths() {
    let mut fake = FakeEventSource::new();
    let config = SyncConfig { on_move: true, ..counting_config("s7", Rc::new(|_: &Inlet| {})) };
    let sync = Rc::new(Sync::new(config));
    let mut watch = Watch::new();
    watch.add_sync(&mut fake, sync.clone(), PathBuf::from("/src"));
    let mut kernel: Box<dyn Kernel> = Box::new(fake);

    // `add_sync` is the only watch installed so far, so it got wd=1.
    let raw = RawEvent {
        etype: EventType::Move,
        wd: 1,
        isdir: false,
        time: 0,
        name: "old.txt".into(),
        wd2: Some(1),
        name2: Some("new.txt".into()),
    };
    dispatch(&mut watch, &mut *kernel, raw);

    let delays = sync.get_delays(None);
    assert_eq!(delays.len(), 1);
    assert_eq!(delays[0].etype(), EventType::Move);
    assert_eq!(delays[0].path(), "old.txt");
    assert_eq!(delays[0].path2().as_deref(), Some("new.txt"));
}
