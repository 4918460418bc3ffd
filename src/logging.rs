//! Logging setup: an `env_logger` formatter matching the rest of the stack,
//! plus the `-log CATEGORY` gate (categories are enabled individually, or
//! all at once via `all`/`scarce`).

use chrono::Utc;
use env_logger::Builder;
use log::info;
use std::cell::RefCell;
use std::collections::HashSet;
use std::io::Write;

thread_local! {
    static CATEGORIES: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Enables a log category. `"all"` and `"scarce"` are recognized by
/// `category_enabled` as blanket switches, matching the original daemon's
/// `-log` flag.
pub fn enable_category(name: &str) {
    CATEGORIES.with(|c| c.borrow_mut().insert(name.to_string()));
}

pub fn category_enabled(name: &str) -> bool {
    CATEGORIES.with(|c| {
        let set = c.borrow();
        set.contains("all") || set.contains(name)
    })
}

/// Configures `env_logger` with a formatter that stamps UTC time and the
/// call site, either to a file (`-logfile`) or to the default env-logger
/// destination (stderr, or syslog on the real daemon).
pub fn configure(logfile: Option<&std::path::Path>) {
    let mut builder = Builder::from_default_env();

    if let Some(path) = logfile {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let target = Box::new(file);
            builder.target(env_logger::Target::Pipe(target));
        }
    }

    builder.format(|buf, record| {
        let utc = Utc::now();
        match (record.file(), record.line()) {
            (Some(file), Some(line)) => {
                writeln!(buf, "{:?} {} [{}:{}] {}", utc, record.level(), file, line, record.args())
            }
            _ => writeln!(buf, "{:?} {} {}", utc, record.level(), record.args()),
        }
    });

    builder.init();
    info!("logging configured");
}
