// # driftdnsd - driftdns Daemon
//
// Thin integration layer: reads the configuration, wires the core to the
// adapter crates and drives the scheduler. No reconciliation logic lives
// here; all of it is in driftdns-core.
//
// ## Configuration
//
// - `DRIFTDNS_CONFIG`: JSON config path (default `/etc/driftdns/config.json`)
// - `DRIFTDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `DRIFTDNS_MODE`: `dry-run` makes providers log writes instead of sending them
//
// ## Signals (run mode)
//
// - SIGHUP: re-read `settings` from the config file and apply the interval
// - SIGTERM / SIGINT: stop the scheduler (the running cycle finishes), flush
//   the registry, exit 0
//
// ## Example
//
// ```bash
// export DRIFTDNS_CONFIG=/etc/driftdns/config.json
// driftdnsd check-ip
// driftdnsd once
// driftdnsd
// ```

mod app;
mod cli;

use anyhow::Result;
use app::App;
use clap::Parser;
use cli::{Cli, Command};
use driftdns_core::Scheduler;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

const LOGGER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What a signal wait ended with
enum SignalEvent {
    Reload,
    Shutdown(&'static str),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = cli::validate_log_level(&cli.log_level) {
        eprintln!("Configuration error: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    // RUST_LOG wins when set; otherwise DRIFTDNS_LOG_LEVEL applies
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase()));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let config = match app::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let plugins = app::plugins();
        let app = match App::build(&config, &plugins).await {
            Ok(app) => app,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return DdnsExitCode::ConfigError;
            }
        };

        let result = match cli.command() {
            Command::Run => return run_daemon(app, &cli.config).await,
            Command::Once => run_once(app).await,
            Command::CheckIp => check_ip(&app).await,
            Command::ListZones { provider } => list_zones(&app, &provider).await,
            Command::TestNotifier { notifier } => test_notifier(&app, &notifier).await,
        };

        match result {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(e) => {
                error!("{:#}", e);
                DdnsExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Run the scheduler until a shutdown signal arrives
async fn run_daemon(app: App, config_path: &Path) -> DdnsExitCode {
    info!("Starting driftdnsd {}", env!("CARGO_PKG_VERSION"));

    let App {
        settings,
        registry,
        reconciler,
        events,
        ..
    } = app;
    let logger = app::spawn_event_logger(events);

    let mut signals = match Signals::new() {
        Ok(signals) => signals,
        Err(e) => {
            error!("{:#}", e);
            return DdnsExitCode::ConfigError;
        }
    };

    let scheduler = Scheduler::new(reconciler, settings.clone());
    if let Err(e) = scheduler.start().await {
        error!("Failed to start scheduler: {}", e);
        return DdnsExitCode::ConfigError;
    }

    let mut exit = DdnsExitCode::CleanShutdown;
    loop {
        match signals.next().await {
            SignalEvent::Reload => {
                info!("Received SIGHUP, reloading settings");
                if let Err(e) = reload_settings(&scheduler, &settings, config_path).await {
                    // Keep running on the previous settings
                    warn!("Settings reload failed: {:#}", e);
                }
            }
            SignalEvent::Shutdown(name) => {
                info!("Received shutdown signal: {}", name);
                break;
            }
        }
    }

    info!("Shutting down daemon");
    scheduler.stop().await;
    // The scheduler held the last reconciler clone; the logger ends with it
    drop(scheduler);

    if let Err(e) = registry.flush().await {
        error!("Failed to flush domain registry: {}", e);
        exit = DdnsExitCode::RuntimeError;
    }
    drain_logger(logger).await;

    exit
}

/// Give the event logger a moment to print what is still queued
async fn drain_logger(logger: tokio::task::JoinHandle<()>) {
    if tokio::time::timeout(LOGGER_DRAIN_TIMEOUT, logger).await.is_err() {
        warn!("Event logger still running at exit");
    }
}

/// Re-read `settings` from the config file and apply the refresh interval
async fn reload_settings(
    scheduler: &Scheduler,
    settings: &Arc<driftdns_core::MemorySettingsStore>,
    config_path: &Path,
) -> Result<()> {
    let config = app::load_config(config_path)?;
    settings.replace_all(config.settings).await?;
    let interval = scheduler.reload_interval().await?;
    info!("Refresh interval is now {:?}", interval);
    Ok(())
}

/// Run a single cycle and print the report as JSON
async fn run_once(app: App) -> Result<()> {
    let App {
        registry,
        reconciler,
        events,
        ..
    } = app;
    let logger = app::spawn_event_logger(events);

    let report = reconciler.run_cycle().await?;
    drop(reconciler);
    registry.flush().await?;
    drain_logger(logger).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failed > 0 {
        anyhow::bail!("{} domain(s) failed to reconcile", report.failed);
    }
    Ok(())
}

async fn check_ip(app: &App) -> Result<()> {
    let resolved = app.reconciler.resolver().resolve_all().await;

    println!(
        "IPv4: {}",
        resolved.v4.map_or_else(|| "not detected".to_string(), |ip| ip.to_string())
    );
    println!(
        "IPv6: {}",
        resolved.v6.map_or_else(|| "not detected".to_string(), |ip| ip.to_string())
    );

    if resolved.is_empty() {
        anyhow::bail!("No public address could be detected");
    }
    Ok(())
}

async fn list_zones(app: &App, provider: &str) -> Result<()> {
    let zones = app.provider(provider)?.list_zones().await?;
    for zone in &zones {
        match zone.record_count {
            Some(count) => println!("{}\t{}\t{} records", zone.id, zone.name, count),
            None => println!("{}\t{}", zone.id, zone.name),
        }
    }
    info!("{} zone(s) visible to provider '{}'", zones.len(), provider);
    Ok(())
}

async fn test_notifier(app: &App, notifier: &str) -> Result<()> {
    app.notifier(notifier)?.test_connection().await?;
    println!("Test message sent through '{}'", notifier);
    Ok(())
}

/// Signal streams, registered once for the daemon's lifetime
#[cfg(unix)]
struct Signals {
    hangup: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?,
            terminate: signal(SignalKind::terminate())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?,
            interrupt: signal(SignalKind::interrupt())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?,
        })
    }

    /// Wait for SIGHUP, SIGTERM or SIGINT
    async fn next(&mut self) -> SignalEvent {
        tokio::select! {
            _ = self.hangup.recv() => SignalEvent::Reload,
            _ = self.terminate.recv() => SignalEvent::Shutdown("SIGTERM"),
            _ = self.interrupt.recv() => SignalEvent::Shutdown("SIGINT"),
        }
    }
}

/// Fallback for non-Unix platforms: CTRL-C only, no reload
#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> SignalEvent {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
        }
        SignalEvent::Shutdown("SIGINT")
    }
}
