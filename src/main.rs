use dirmirrord::config;
use dirmirrord::inotify_source::InotifyEventSource;
use dirmirrord::logging;
use dirmirrord::mainloop::MainLoop;
use dirmirrord::status::StatusWriter;
use log::{error, info};

pub const CARGO_PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let config = match config::parse() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", CARGO_PKG_NAME, e);
            std::process::exit(1);
        }
    };

    logging::configure(config.logfile());
    info!("starting {} {}", CARGO_PKG_NAME, CARGO_PKG_VERSION);

    if !config.nodaemon() {
        info!("running under a process supervisor is recommended; pass -nodaemon to run in the foreground explicitly");
    }

    if let Some(pidfile) = config.pidfile() {
        if let Err(e) = std::fs::write(pidfile, format!("{}\n", std::process::id())) {
            error!("failed to write pidfile {}: {}", pidfile.display(), e);
            std::process::exit(1);
        }
    }

    let syncs = match config::build_syncs(&config) {
        Ok(s) => s,
        Err(e) => {
            error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let kernel = match InotifyEventSource::new() {
        Ok(k) => Box::new(k),
        Err(e) => {
            error!("failed to initialize inotify: {}", e);
            std::process::exit(1);
        }
    };

    let status_writer = config.status_file.clone().map(|path| StatusWriter::new(path, config.status_interval));
    let mut engine = MainLoop::new(kernel, status_writer);

    if let Err(e) = engine.install_signal_handlers() {
        error!("failed to install signal handlers: {}", e);
        std::process::exit(1);
    }

    for sync in syncs {
        engine.add_sync(sync);
    }
    engine.finish_init();

    info!("entering main loop");
    while engine.tick() {}

    info!("stopping {}", CARGO_PKG_NAME);
}
