//! Background task that runs enforcement passes on a fixed cadence.
//!
//! A pass also runs as soon as a new configuration snapshot is published.
//! Shutdown is observed between passes only, so a pass in flight always
//! completes before the loop exits.

use crate::services::enforcement_engine::EnforcementEngine;
use crate::{Result, WinPlacerError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Tick,
    ConfigChanged,
}

/// Spawns the enforcement loop
pub struct EnforcementLoop;

impl EnforcementLoop {
    /// Start the loop on the current runtime.
    ///
    /// With `interval` set the cadence is fixed; otherwise it follows
    /// `engine.poll_interval_ms` from the live configuration.
    pub fn spawn(engine: Arc<EnforcementEngine>, interval: Option<Duration>) -> LoopHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(engine, interval, shutdown_rx));
        LoopHandle {
            shutdown_tx,
            handle,
        }
    }
}

/// Owner handle for a running enforcement loop
#[derive(Debug)]
pub struct LoopHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LoopHandle {
    /// Ask the loop to exit after the current pass
    pub fn request_stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Request a stop and wait for the loop to finish
    pub async fn stop(self) -> Result<()> {
        self.request_stop();
        self.handle
            .await
            .map_err(|e| WinPlacerError::PlatformError(format!("Enforcement loop panicked: {}", e)))?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run_loop(
    engine: Arc<EnforcementEngine>,
    fixed_interval: Option<Duration>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut config_rx = engine.config().subscribe();
    let mut watching_config = true;
    let mut period =
        fixed_interval.unwrap_or_else(|| config_rx.borrow_and_update().engine.poll_interval());
    let mut ticks = ticker(period);

    info!(interval_ms = period.as_millis() as u64, "Enforcement loop started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let trigger = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            changed = config_rx.changed(), if watching_config => match changed {
                Ok(()) => Trigger::ConfigChanged,
                Err(_) => {
                    watching_config = false;
                    continue;
                }
            },
            _ = ticks.tick() => Trigger::Tick,
        };

        if trigger == Trigger::ConfigChanged {
            let latest = config_rx.borrow_and_update().engine.poll_interval();
            if fixed_interval.is_none() && latest != period {
                info!(
                    from_ms = period.as_millis() as u64,
                    to_ms = latest.as_millis() as u64,
                    "Poll interval changed"
                );
                period = latest;
                ticks = ticker(period);
                // The fresh ticker fires immediately; the pass below covers it
                ticks.tick().await;
            }
            debug!("Configuration changed, running early pass");
        }

        match engine.run_pass().await {
            Ok(report) if !report.applied.is_empty() => {
                info!(
                    applied = report.applied.len(),
                    tracked = report.tracked,
                    "Placed windows"
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Enforcement pass failed: {}", e),
        }
    }

    info!("Enforcement loop stopped");
}
