//! Command-line and configuration-file parsing, producing the immutable
//! `Configuration` the rest of the daemon reads from.

use crate::actions::{rsync_action, rsync_collect, rsync_ssh_action};
use crate::error::{EngineError, EngineResult};
use crate::sync::{Sync, SyncConfig};
use clap::{App, Arg, ErrorKind};
use log::info;
use serde::Deserialize;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

/// One `syncs[]` entry in the JSON configuration file.
#[derive(Debug, Deserialize)]
pub struct SyncFileEntry {
    pub name: String,
    pub source: PathBuf,
    pub target: String,
    #[serde(default = "default_delay")]
    pub delay: u64,
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    #[serde(default = "default_max_delays")]
    pub max_delays: usize,
    #[serde(default)]
    pub on_move: bool,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub ssh: bool,
    #[serde(default)]
    pub host: Option<String>,
}

fn default_delay() -> u64 {
    15
}
fn default_max_processes() -> usize {
    1
}
fn default_max_delays() -> usize {
    1000
}

#[derive(Debug, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub syncs: Vec<SyncFileEntry>,
    #[serde(default)]
    pub status_file: Option<PathBuf>,
    #[serde(default = "default_status_interval")]
    pub status_interval: u64,
}

fn default_status_interval() -> u64 {
    10
}

#[derive(Debug, Clone)]
pub struct Configuration {
    inner: Arc<InnerConfiguration>,
}

#[derive(Debug)]
pub struct InnerConfiguration {
    args: CommandLineArguments,
    pub status_file: Option<PathBuf>,
    pub status_interval: u64,
}

impl Deref for Configuration {
    type Target = InnerConfiguration;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl InnerConfiguration {
    pub fn nodaemon(&self) -> bool {
        self.args.nodaemon
    }

    pub fn pidfile(&self) -> Option<&Path> {
        self.args.pidfile.as_deref()
    }

    pub fn logfile(&self) -> Option<&Path> {
        self.args.logfile.as_deref()
    }

    pub fn log_categories(&self) -> &[String] {
        &self.args.log_categories
    }

    pub fn monitor(&self) -> Option<&str> {
        self.args.monitor.as_deref()
    }

    pub fn runner(&self) -> Option<&Path> {
        self.args.runner.as_deref()
    }
}

#[derive(Debug, Clone)]
struct CommandLineArguments {
    nodaemon: bool,
    pidfile: Option<PathBuf>,
    logfile: Option<PathBuf>,
    log_categories: Vec<String>,
    runner: Option<PathBuf>,
    monitor: Option<String>,
    monitor_bare: bool,
    rsync: Option<(String, String)>,
    rsyncssh: Option<(String, String, String)>,
    config_file: Option<PathBuf>,
}

fn build_app() -> App<'static> {
    App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(Arg::new("log").long("log").takes_value(true).multiple_occurrences(true).about("Enable a log category (also 'all', 'scarce')"))
        .arg(Arg::new("logfile").long("logfile").takes_value(true).about("Log to file instead of syslog"))
        .arg(Arg::new("monitor").long("monitor").takes_value(true).min_values(0).max_values(1).about("Select event facility; bare flag lists supported facilities"))
        .arg(Arg::new("nodaemon").long("nodaemon").about("Stay in foreground"))
        .arg(Arg::new("pidfile").long("pidfile").takes_value(true).about("Write PID to this file"))
        .arg(Arg::new("runner").long("runner").takes_value(true).about("Replace the engine-driver file"))
        .arg(
            Arg::new("rsync")
                .long("rsync")
                .takes_value(true)
                .number_of_values(2)
                .value_names(&["SRC", "DST"])
                .about("Synthesize one sync using the built-in rsync action"),
        )
        .arg(
            Arg::new("rsyncssh")
                .long("rsyncssh")
                .takes_value(true)
                .number_of_values(3)
                .value_names(&["SRC", "HOST", "DIR"])
                .about("Synthesize one sync using the built-in rsync+ssh action"),
        )
        .arg(Arg::new("config").about("The configuration file").index(1))
}

/// Parses `std::env::args_os()` into `Configuration`. A bare `-monitor` with
/// no value lists the supported event facilities and exits before anything
/// else runs.
pub fn parse() -> EngineResult<Configuration> {
    let matches = match build_app().try_get_matches() {
        Ok(m) => m,
        // clap exits 0 for both -help and -version by default. -version
        // keeping that is correct; -help must exit nonzero.
        Err(e) if e.kind == ErrorKind::DisplayVersion => e.exit(),
        Err(e) if e.kind == ErrorKind::DisplayHelp => {
            print!("{}", e);
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };

    if let Some(values) = matches.values_of("log") {
        for cat in values {
            crate::logging::enable_category(cat);
        }
    }

    let rsync = matches.values_of("rsync").map(|mut v| (v.next().unwrap().to_string(), v.next().unwrap().to_string()));
    let rsyncssh = matches
        .values_of("rsyncssh")
        .map(|mut v| (v.next().unwrap().to_string(), v.next().unwrap().to_string(), v.next().unwrap().to_string()));
    let config_file = matches.value_of("config").map(PathBuf::from);

    if (rsync.is_some() || rsyncssh.is_some()) && config_file.is_some() {
        return Err(EngineError::Config(
            "-rsync/-rsyncssh cannot be combined with a configuration file".into(),
        ));
    }

    let args = CommandLineArguments {
        nodaemon: matches.is_present("nodaemon"),
        pidfile: matches.value_of("pidfile").map(PathBuf::from),
        logfile: matches.value_of("logfile").map(PathBuf::from),
        log_categories: matches.values_of("log").map(|v| v.map(String::from).collect()).unwrap_or_default(),
        runner: matches.value_of("runner").map(PathBuf::from),
        monitor: matches.value_of("monitor").map(String::from),
        monitor_bare: matches.is_present("monitor") && matches.value_of("monitor").is_none(),
        rsync,
        rsyncssh,
        config_file,
    };

    info!("parsed CLI arguments: {:?}", args);

    if args.monitor_bare {
        println!("supported event facilities: inotify");
        std::process::exit(1);
    }

    let (syncs_raw, status_file, status_interval) = if let Some((src, dst)) = &args.rsync {
        (vec![synthesize_rsync_entry(src, dst)], None, default_status_interval())
    } else if let Some((src, host, dir)) = &args.rsyncssh {
        (vec![synthesize_rsyncssh_entry(src, host, dir)], None, default_status_interval())
    } else if let Some(path) = &args.config_file {
        let file = load_file_config(path)?;
        (file.syncs, file.status_file, file.status_interval)
    } else {
        return Err(EngineError::Config("no action defined: pass -rsync, -rsyncssh, or a configuration file".into()));
    };

    if syncs_raw.is_empty() {
        return Err(EngineError::Config("configuration defines no syncs".into()));
    }

    Ok(Configuration {
        inner: Arc::new(InnerConfiguration { args, status_file, status_interval }),
    })
}

fn synthesize_rsync_entry(src: &str, dst: &str) -> SyncFileEntry {
    SyncFileEntry {
        name: format!("rsync:{}", src),
        source: PathBuf::from(src),
        target: dst.to_string(),
        delay: default_delay(),
        max_processes: default_max_processes(),
        max_delays: default_max_delays(),
        on_move: false,
        excludes: Vec::new(),
        ssh: false,
        host: None,
    }
}

fn synthesize_rsyncssh_entry(src: &str, host: &str, dir: &str) -> SyncFileEntry {
    SyncFileEntry {
        name: format!("rsyncssh:{}", src),
        source: PathBuf::from(src),
        target: dir.to_string(),
        delay: default_delay(),
        max_processes: default_max_processes(),
        max_delays: default_max_delays(),
        on_move: false,
        excludes: Vec::new(),
        ssh: true,
        host: Some(host.to_string()),
    }
}

fn load_file_config(path: &Path) -> EngineResult<FileConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&contents).map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
}

/// Builds the runtime `Sync`s named by the parsed configuration, wiring
/// each to the built-in rsync/rsync+ssh action for entries synthesized by
/// `-rsync`/`-rsyncssh`, or to the same built-ins for file-configured
/// entries (custom scripted actions are out of scope, see SPEC_FULL.md).
pub fn build_syncs(config: &Configuration) -> EngineResult<Vec<Rc<Sync>>> {
    let entries = if let Some((src, dst)) = &config.args.rsync {
        vec![synthesize_rsync_entry(src, dst)]
    } else if let Some((src, host, dir)) = &config.args.rsyncssh {
        vec![synthesize_rsyncssh_entry(src, host, dir)]
    } else {
        let path = config.args.config_file.as_ref().expect("validated in parse()");
        load_file_config(path)?.syncs
    };

    entries
        .into_iter()
        .map(|entry| {
            let action = if entry.ssh { rsync_ssh_action() } else { rsync_action() };
            let sync = Sync::new(SyncConfig {
                name: entry.name,
                source: entry.source,
                target: entry.target,
                delay: entry.delay,
                max_processes: entry.max_processes,
                max_delays: entry.max_delays,
                on_move: entry.on_move,
                action,
                collect: rsync_collect(),
                init: None,
            });
            for pattern in &entry.excludes {
                sync.add_exclude(pattern);
            }
            Ok(Rc::new(sync))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_defaults_fill_in_missing_fields() {
        let json = r#"{"syncs":[{"name":"a","source":"/src","target":"/dst"}]}"#;
        let cfg: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.syncs[0].delay, 15);
        assert_eq!(cfg.syncs[0].max_processes, 1);
        assert_eq!(cfg.status_interval, 10);
    }
}
