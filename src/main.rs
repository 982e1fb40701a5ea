use clap::Parser;
use midi_router_core::cli::Cli;
use midi_router_core::config::{apply_configuration, RouterConfiguration};
use midi_router_core::registry::DeviceRegistry;
use midi_router_core::routing::Router;
use midi_router_core::{log_error, log_fatal, log_info};
use std::path::PathBuf;
use std::sync::Arc;

const CLIENT_NAME: &str = "midi-router";

fn main() {
    let cli = Cli::parse();
    midi_router_core::logger::set_verbose(cli.verbose);

    if cli.configure {
        println!("The configuration wizard is a separate tool; nothing to do here.");
        std::process::exit(0);
    }

    let registry = DeviceRegistry::new(CLIENT_NAME);

    if cli.list {
        let result = registry.open_all_inputs();
        for input in &result.opened {
            let record = input.record();
            println!("{}, {}", record.name, record.port);
        }
        registry.on_exit();
        std::process::exit(0);
    }

    let config_path = PathBuf::from(&cli.config);
    let cfg = if config_path.exists() {
        match RouterConfiguration::load_from_path(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log_fatal!("failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        RouterConfiguration::default()
    };
    registry.set_hotplug(cli.hotplug && cfg.options.hotplug);

    let router = Arc::new(Router::new());
    let clock = match apply_configuration(&cfg, &registry, &router) {
        Ok(clock) => clock,
        Err(e) => {
            log_fatal!("failed to apply configuration: {}", e);
            std::process::exit(1);
        }
    };

    if cli.all {
        let result = registry.open_all_inputs();
        for e in &result.failed {
            log_error!("{}", e);
        }
    }

    let shutdown_router = router.clone();
    let shutdown_registry = registry.clone();
    let shutdown_clock = clock.clone();
    ctrlc_shutdown(move || {
        shutdown_router.stop();
        shutdown_router.on_exit();
        if let Some(clock) = &shutdown_clock {
            clock.stop();
            clock.destroy();
        }
        shutdown_registry.on_exit();
    });

    log_info!("midi-router ready, entering the event loop");
    router.run();
}

/// Installs a Ctrl-C/SIGINT handler running `on_shutdown` once, then lets
/// the process exit normally. Kept as a thin wrapper so `main` doesn't
/// need to know which signal-handling crate backs it.
fn ctrlc_shutdown(on_shutdown: impl FnOnce() + Send + 'static) {
    use std::sync::atomic::{AtomicBool, Ordering};
    static FIRED: AtomicBool = AtomicBool::new(false);
    let handler = Arc::new(std::sync::Mutex::new(Some(on_shutdown)));
    let result = ctrlc_crate_shim(move || {
        if !FIRED.swap(true, Ordering::SeqCst) {
            if let Some(f) = handler.lock().unwrap().take() {
                f();
            }
            std::process::exit(0);
        }
    });
    if let Err(e) = result {
        log_error!("failed to install shutdown handler: {}", e);
    }
}

/// Registers `handler` to run in a dedicated thread that waits for the
/// process's interrupt signal. There is no portable way to do this with
/// the standard library alone; this project relies on `ctrlc` the same
/// way it relies on `midir` for ports, rather than hand-rolling a signal
/// handler.
fn ctrlc_crate_shim(handler: impl Fn() + Send + 'static) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(handler)
}
