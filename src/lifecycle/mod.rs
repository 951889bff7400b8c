//! Daemon lifecycle for WinPlacer
//!
//! Loads the settings, starts the enforcement loop, keeps the live
//! configuration in sync with hand edits of the settings file and shuts
//! everything down on Ctrl+C or SIGTERM.

use crate::{
    config::{ConfigHandle, ConfigStore, FileConfigStore},
    platform::{WindowSystem, WindowSystemError},
    services::{EnforcementEngine, EnforcementLoop},
    Result, WinPlacerError,
};
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::{
    signal,
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, instrument, warn};

/// Long-running placement service
pub struct Daemon {
    store: Arc<FileConfigStore>,
    window_system: Arc<dyn WindowSystem>,
    interval: Option<Duration>,
}

impl Daemon {
    pub fn new(store: Arc<FileConfigStore>, window_system: Arc<dyn WindowSystem>) -> Self {
        Self {
            store,
            window_system,
            interval: None,
        }
    }

    /// Use a fixed pass interval instead of the configured one
    pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval;
        self
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves.
    ///
    /// A settings file that cannot be loaded is fatal and no pass is ever run,
    /// as is a window system that reports itself unavailable at startup.
    #[instrument(skip_all, fields(settings = %self.store.path().display()))]
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("WinPlacer v{} starting up", env!("CARGO_PKG_VERSION"));

        let config = self.store.load_or_init().map_err(|e| {
            WinPlacerError::ConfigurationError(format!("Failed to load settings: {}", e))
        })?;
        info!(
            rules = config.rules().len(),
            cells = config.grid.len(),
            grid_enabled = config.grid.enabled,
            "Settings loaded"
        );

        self.check_window_system().await?;

        let config = ConfigHandle::new(config)?;
        let engine = Arc::new(EnforcementEngine::new(
            self.window_system.clone(),
            config.clone(),
        ));
        let enforcement = EnforcementLoop::spawn(engine.clone(), self.interval);

        let (reload_stop_tx, reload_stop_rx) = watch::channel(false);
        let reloader = spawn_settings_watcher(self.store.clone(), config, reload_stop_rx);

        shutdown.await;
        info!("Initiating graceful shutdown...");

        reload_stop_tx.send_replace(true);
        if let Err(e) = reloader.await {
            warn!("Settings watcher ended abnormally: {}", e);
        }
        enforcement.stop().await?;

        let metrics = engine.metrics().await;
        info!(
            passes = metrics.passes,
            failed_passes = metrics.failed_passes,
            geometry_applied = metrics.geometry_applied,
            window_failures = metrics.window_failures,
            "WinPlacer stopped"
        );
        Ok(())
    }

    /// Enumerate once before starting the loop; an unavailable backend would
    /// only fail every pass.
    async fn check_window_system(&self) -> Result<()> {
        let system = self.window_system.clone();
        let enumerated = tokio::task::spawn_blocking(move || system.enumerate_windows())
            .await
            .map_err(|e| WinPlacerError::PlatformError(format!("startup check failed: {}", e)))?;

        match enumerated {
            Ok(windows) => {
                debug!(windows = windows.len(), "Window system ready");
                Ok(())
            }
            Err(WindowSystemError::Unavailable(reason)) => Err(WinPlacerError::PlatformError(
                format!("backend unavailable: {}", reason),
            )
            .into()),
            Err(e) => {
                warn!("Initial window enumeration failed, starting anyway: {}", e);
                Ok(())
            }
        }
    }
}

/// Poll the settings file and publish every valid edit.
///
/// Invalid edits are logged and the previous snapshot stays live.
fn spawn_settings_watcher(
    store: Arc<FileConfigStore>,
    config: ConfigHandle,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_modified: Option<SystemTime> = store.modified();
        let mut period = config.snapshot().engine.reload_interval();
        let mut ticks = time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticks.tick().await;

        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = ticks.tick() => {}
            }

            let modified = store.modified();
            if modified == last_modified {
                continue;
            }
            last_modified = modified;

            match store.load() {
                Ok(next) if *config.snapshot() == next => {
                    debug!("Settings file touched without changes");
                }
                Ok(next) => match config.publish(next) {
                    Ok(()) => info!("Reloaded settings from {}", store.path().display()),
                    Err(e) => warn!("Rejected edited settings: {}", e),
                },
                Err(e) => warn!("Ignoring settings edit, keeping previous configuration: {}", e),
            }

            let latest = config.snapshot().engine.reload_interval();
            if latest != period {
                period = latest;
                ticks = time::interval(period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticks.tick().await;
            }
        }

        debug!("Settings watcher stopped");
    })
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm_stream = match signal::unix::signal(signal::unix::SignalKind::terminate())
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to initialise SIGTERM handler: {}", e);
                match signal::ctrl_c().await {
                    Ok(_) => info!("Received SIGINT (Ctrl+C)"),
                    Err(err) => warn!("Failed to listen for Ctrl+C: {}", err),
                }
                return;
            }
        };

        tokio::select! {
            res = signal::ctrl_c() => {
                match res {
                    Ok(_) => info!("Received SIGINT (Ctrl+C)"),
                    Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                }
            }
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        match signal::ctrl_c().await {
            Ok(_) => info!("Received Ctrl+C"),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
    }
}
