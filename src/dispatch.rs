//! Translates one raw kernel event into per-sync relative events.

use crate::delay::EventType;
use crate::kernel::{Kernel, RawEvent};
use crate::watch::Watch;
use std::path::Path;

/// Composes the absolute path for `wd`/`name`, appending a trailing slash
/// for directories.
fn compose(watch: &Watch, wd: i32, name: &str, isdir: bool) -> Option<String> {
    let base = watch.path_of(wd)?;
    let mut path = base.join(name).to_string_lossy().into_owned();
    if isdir && !path.ends_with('/') {
        path.push('/');
    }
    Some(path)
}

/// Relativizes `abs` against `root`, returning `None` if `abs` is not
/// under `root`.
fn relativize(root: &Path, abs: &str) -> Option<String> {
    let abs_path = Path::new(abs);
    let rel = abs_path.strip_prefix(root).ok()?;
    let mut s = rel.to_string_lossy().into_owned();
    if abs.ends_with('/') && !s.ends_with('/') {
        s.push('/');
    }
    Some(s)
}

/// Dispatches one raw kernel event to every sync whose root it falls under,
/// retyping or dropping it as relativization requires, and maintains the
/// watch registry's recursive-subdirectory tracking.
pub fn dispatch(watch: &mut Watch, kernel: &mut dyn Kernel, raw: RawEvent) {
    let origin_abs = compose(watch, raw.wd, &raw.name, raw.isdir);
    let dest_abs = match (raw.wd2, &raw.name2) {
        (Some(wd2), Some(name2)) => compose(watch, wd2, name2, raw.isdir),
        _ => None,
    };

    let (etype, origin_abs, dest_abs) = match (raw.etype, origin_abs, dest_abs) {
        (EventType::Move, None, Some(dest)) => (EventType::Create, None, Some(dest)),
        (EventType::Move, None, None) => return,
        (_, None, _) => return,
        (etype, Some(origin), dest) => (etype, Some(origin), dest),
    };
    let origin_abs = origin_abs.expect("checked above");

    let roots: Vec<_> = watch
        .syncs()
        .iter()
        .map(|s| (s.clone(), s.source().to_path_buf()))
        .collect();

    for (sync, root) in roots {
        let rel_origin = relativize(&root, &origin_abs);
        let rel_dest = dest_abs.as_deref().and_then(|d| relativize(&root, d));

        let (retyped, rel, rel2) = match (etype, rel_origin, rel_dest) {
            (EventType::Move, Some(o), Some(d)) => (EventType::Move, o, Some(d)),
            (EventType::Move, Some(o), None) => (EventType::Delete, o, None),
            (EventType::Move, None, Some(d)) => (EventType::Create, d, None),
            (EventType::Move, None, None) => continue,
            (other, Some(o), _) => (other, o, None),
            (_, None, _) => continue,
        };

        sync.delay(retyped, Some(raw.time), raw.time, rel, rel2);

        if raw.isdir {
            match etype {
                EventType::Create => watch.add_watch(kernel, Path::new(&origin_abs), true, Some(&sync), raw.time),
                EventType::Delete => watch.remove_watch(kernel, Path::new(&origin_abs), true),
                EventType::Move => {
                    watch.remove_watch(kernel, Path::new(&origin_abs), false);
                    if let Some(dest) = &dest_abs {
                        watch.add_watch(kernel, Path::new(dest), true, Some(&sync), raw.time);
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relativize_rejects_paths_outside_root() {
        assert_eq!(relativize(Path::new("/src"), "/src/a/b"), Some("a/b".into()));
        assert_eq!(relativize(Path::new("/src"), "/other/a"), None);
    }

    #[test]
    fn relativize_preserves_directory_slash() {
        assert_eq!(relativize(Path::new("/src"), "/src/d/"), Some("d/".into()));
    }
}
