//! Periodic cycle scheduler
//!
//! Triggers one reconciliation cycle per period.
//!
//! ## States
//!
//! ```text
//!            start()                 set_interval(n)
//! Stopped ─────────────► Running ◄──────────────────┐
//!    ▲                     │ │                       │
//!    └──── stop() ─────────┘ └───────────────────────┘
//! ```
//!
//! ## Cadence
//!
//! - The first tick fires one period after `start()`.
//! - `set_interval(n)` cancels the pending tick and fires the next one `n`
//!   seconds after the call, then every `n` seconds.
//! - Cycles never overlap. A cycle runs to completion before the next
//!   deadline is looked at; ticks that fell inside an overrunning cycle are
//!   skipped, not queued.
//! - A cycle error or panic is logged as a scheduler fault and the loop
//!   keeps going.

use crate::engine::CycleReport;
use crate::error::{Error, Result};
use crate::settings::{SettingsStore, refresh_interval};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Something that can run one reconciliation cycle
#[async_trait]
pub trait CycleRunner: Send + Sync {
    /// Run a cycle to completion
    async fn run_cycle(&self) -> Result<CycleReport>;
}

#[derive(Debug, Clone, Copy)]
enum Control {
    /// Next tick at `from + period`, then every `period`
    Schedule { period: Duration, from: Instant },
    Stop,
}

struct Running {
    control_tx: watch::Sender<Control>,
    handle: JoinHandle<()>,
}

/// Owns the periodic cycle loop
///
/// One instance per process, owned by the composition root.
pub struct Scheduler {
    runner: Arc<dyn CycleRunner>,
    settings: Arc<dyn SettingsStore>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    /// Create a stopped scheduler
    pub fn new(runner: Arc<dyn CycleRunner>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            runner,
            settings,
            running: Mutex::new(None),
        }
    }

    /// Start ticking at the configured `scheduler.refresh_interval`
    ///
    /// Starting a running scheduler does nothing.
    ///
    /// # Errors
    ///
    /// Returns the settings store error if the interval cannot be read.
    pub async fn start(&self) -> Result<()> {
        let period = refresh_interval(self.settings.as_ref()).await?;

        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = running.as_ref()
            && !current.handle.is_finished()
        {
            warn!("Scheduler already running, ignoring start");
            return Ok(());
        }

        let (control_tx, control_rx) = watch::channel(Control::Schedule {
            period,
            from: Instant::now(),
        });
        let handle = tokio::spawn(run_loop(self.runner.clone(), control_rx));

        info!(interval_secs = period.as_secs(), "Scheduler started");
        *running = Some(Running { control_tx, handle });
        Ok(())
    }

    /// Change the period of a running scheduler
    ///
    /// The next tick fires `secs` seconds from now; the tick pending under
    /// the old period is cancelled.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidInput`: `secs` is zero
    /// - `Error::SchedulerFault`: the scheduler is not running
    pub fn set_interval(&self, secs: u64) -> Result<()> {
        if secs == 0 {
            return Err(Error::invalid_input("interval must be at least 1 second"));
        }

        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let current = running
            .as_ref()
            .filter(|r| !r.handle.is_finished())
            .ok_or_else(|| Error::scheduler_fault("scheduler is not running"))?;

        current
            .control_tx
            .send(Control::Schedule {
                period: Duration::from_secs(secs),
                from: Instant::now(),
            })
            .map_err(|_| Error::scheduler_fault("scheduler loop has exited"))?;

        info!(interval_secs = secs, "Scheduler interval changed");
        Ok(())
    }

    /// Re-read `scheduler.refresh_interval` and apply it
    ///
    /// On a stopped scheduler the value is only read; it takes effect on
    /// the next `start()`.
    pub async fn reload_interval(&self) -> Result<Duration> {
        let period = refresh_interval(self.settings.as_ref()).await?;
        if self.is_running() {
            self.set_interval(period.as_secs())?;
        } else {
            debug!("Scheduler stopped, interval {:?} applies on next start", period);
        }
        Ok(period)
    }

    /// Stop ticking and wait for an in-flight cycle to finish
    ///
    /// Stopping a stopped scheduler does nothing.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(Running { control_tx, handle }) = running else {
            debug!("Scheduler already stopped");
            return;
        };

        // The loop may already be gone; either way the handle is awaited
        let _ = control_tx.send(Control::Stop);
        if let Err(e) = handle.await {
            error!("Scheduler loop ended abnormally: {}", e);
        }
        info!("Scheduler stopped");
    }

    /// Whether the cycle loop is active
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

async fn run_loop(runner: Arc<dyn CycleRunner>, mut control_rx: watch::Receiver<Control>) {
    let (mut period, mut next) = match *control_rx.borrow_and_update() {
        Control::Schedule { period, from } => (period, from + period),
        Control::Stop => return,
    };

    loop {
        tokio::select! {
            biased;

            changed = control_rx.changed() => {
                if changed.is_err() {
                    debug!("Scheduler handle dropped, exiting loop");
                    return;
                }
                match *control_rx.borrow_and_update() {
                    Control::Schedule { period: new_period, from } => {
                        period = new_period;
                        next = from + new_period;
                        debug!("Next cycle in {:?}", next.saturating_duration_since(Instant::now()));
                    }
                    Control::Stop => return,
                }
            }

            _ = tokio::time::sleep_until(next) => {
                run_one_cycle(&runner).await;
                next = next_deadline(next, period, Instant::now());
            }
        }
    }
}

/// Run a cycle in its own task so a panic is contained
async fn run_one_cycle(runner: &Arc<dyn CycleRunner>) {
    let runner = runner.clone();
    let cycle = tokio::spawn(async move { runner.run_cycle().await });

    match cycle.await {
        Ok(Ok(report)) => {
            debug!(
                updated = report.updated,
                unchanged = report.unchanged,
                failed = report.failed,
                "Cycle complete"
            );
        }
        Ok(Err(e)) => {
            error!("{}", Error::scheduler_fault(format!("cycle failed: {}", e)));
        }
        Err(e) => {
            error!("{}", Error::scheduler_fault(format!("cycle aborted: {}", e)));
        }
    }
}

/// The first deadline after `now` on the grid `previous + k * period`
fn next_deadline(previous: Instant, period: Duration, now: Instant) -> Instant {
    let (deadline, missed) = advance(previous, period, now);
    if missed > 0 {
        warn!(missed, "Cycle overran its period, skipping missed ticks");
    }
    deadline
}

/// Next grid deadline and the number of grid ticks strictly before `now`
///
/// A cycle ending exactly on a tick has missed nothing.
fn advance(previous: Instant, period: Duration, now: Instant) -> (Instant, u128) {
    let next = previous + period;
    if next > now {
        return (next, 0);
    }

    let behind = now.duration_since(next).as_nanos();
    let period_nanos = period.as_nanos();
    let missed = behind.div_ceil(period_nanos);

    let skip = u32::try_from(behind / period_nanos + 1).unwrap_or(u32::MAX);
    (next + period.saturating_mul(skip), missed)
}
