//! autoduck entrypoint: listen for sustained noise and duck other applications.
//!
//! The monitor runs the mic listener, VOIP poll and process rescan on their
//! own threads; the main thread only waits for a shutdown signal and then
//! restores any reduced volumes before exiting.

mod devices;
mod shutdown;

use anyhow::Result;
use autoduck::clock::MonotonicClock;
use autoduck::config::AppConfig;
use autoduck::session::{AudioSessionProvider, InMemorySessions};
use autoduck::telemetry::init_tracing;
use autoduck::whitelist::basename;
use autoduck::{init_logging, log_debug, log_file_path, log_panic, DuckingEngine, Monitor};
use clap::Parser;
use crossbeam_channel::{select, tick};
use std::panic;
use std::sync::Arc;
use std::time::Duration;

const SHUTDOWN_POLL_MS: u64 = 100;
const STATUS_INTERVAL_MS: u64 = 1_000;

fn main() -> Result<()> {
    let mut config = AppConfig::parse();
    if config.list_input_devices {
        devices::print_input_devices();
        return Ok(());
    }

    config.validate()?;
    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();
    log_debug("=== autoduck started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    let provider = select_provider(&config)?;
    log_debug(&format!("audio session provider: {}", provider.name()));
    let engine = DuckingEngine::new(
        provider,
        Arc::new(MonotonicClock::new()),
        config.engine_settings(),
    );
    for pattern in &config.whitelist_apps {
        engine.whitelist_app(pattern);
    }
    for pattern in &config.voip_apps {
        engine.add_voip_app(pattern);
    }

    shutdown::install_handlers()?;
    let mut monitor = Monitor::new(engine.clone(), config.monitor_options());
    if let Err(err) = monitor.start() {
        monitor.stop();
        return Err(err.context("failed to start monitoring"));
    }

    match monitor.mic_device_name() {
        Some(device) => eprintln!("autoduck: listening to '{device}' (Ctrl+C to stop)"),
        None => eprintln!("autoduck: monitoring VOIP apps only (Ctrl+C to stop)"),
    }

    let shutdown_poll = tick(Duration::from_millis(SHUTDOWN_POLL_MS));
    let status = tick(Duration::from_millis(STATUS_INTERVAL_MS));
    loop {
        select! {
            recv(shutdown_poll) -> _ => {
                if shutdown::requested() {
                    break;
                }
            }
            recv(status) -> _ => {
                if config.log_timings {
                    log_status(&monitor);
                }
            }
        }
    }

    log_debug("shutdown requested");
    monitor.stop();
    if engine.restore_now() {
        log_debug("restored volumes on shutdown");
    }
    Ok(())
}

fn log_status(monitor: &Monitor) {
    let engine = monitor.engine();
    log_debug(&format!(
        "status: mic={:.1}% noise={} reduction={:?} voip_pids={:?}",
        monitor.meter().percent(),
        engine.noise_state().label(),
        engine.reduction_state(),
        engine.tracked_voip_pids()
    ));
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        previous(info);
    }));
}

fn select_provider(config: &AppConfig) -> Result<Arc<dyn AudioSessionProvider>> {
    if config.simulate {
        return Ok(Arc::new(simulated_sessions(config)));
    }
    system_provider(config)
}

/// A small fake mixer so the whole pipeline can run without touching real volumes.
fn simulated_sessions(config: &AppConfig) -> InMemorySessions {
    let sessions = InMemorySessions::new();
    sessions.add_session(1_001, "music-player", "/usr/bin/music-player", 80.0);
    sessions.add_session(1_002, "browser", "/usr/bin/browser", 60.0);
    for (offset, pattern) in (0u32..).zip(&config.voip_apps) {
        let pid = 2_000 + offset;
        let path = if pattern.contains(['/', '\\']) {
            pattern.clone()
        } else {
            format!("/usr/bin/{pattern}")
        };
        sessions.add_session(pid, basename(&path), &path, 100.0);
    }
    sessions
}

#[cfg(target_os = "linux")]
fn system_provider(config: &AppConfig) -> Result<Arc<dyn AudioSessionProvider>> {
    use anyhow::Context;
    use autoduck::session::PactlSessions;

    let sessions = PactlSessions::new(config.pactl_cmd.clone());
    sessions
        .list_sessions()
        .with_context(|| format!("'{}' is not usable", config.pactl_cmd))?;
    Ok(Arc::new(sessions))
}

#[cfg(not(target_os = "linux"))]
fn system_provider(_config: &AppConfig) -> Result<Arc<dyn AudioSessionProvider>> {
    anyhow::bail!("no system mixer backend is available on this platform; run with --simulate")
}
