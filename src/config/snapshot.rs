//! Shared configuration published as immutable snapshots.
//!
//! Readers take an `Arc<AppConfig>` and keep it for the duration of their
//! work; writers build a complete new configuration and swap it in as a
//! unit. An enforcement pass therefore never observes a half-applied edit.

use crate::models::{AppConfig, ConfigError};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<AppConfig>>>,
}

impl ConfigHandle {
    /// Wrap a configuration after validating it
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (tx, _rx) = watch::channel(Arc::new(config));
        Ok(Self { tx: Arc::new(tx) })
    }

    /// Current configuration. Cheap; clones an `Arc`.
    pub fn snapshot(&self) -> Arc<AppConfig> {
        self.tx.borrow().clone()
    }

    /// Replace the whole configuration
    pub fn publish(&self, config: AppConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.tx.send_replace(Arc::new(config));
        debug!("Published new configuration snapshot");
        Ok(())
    }

    /// Apply an edit to a copy of the current snapshot and publish it if the
    /// edit succeeds and the result validates. On error nothing is published.
    pub fn update<F>(&self, edit: F) -> Result<Arc<AppConfig>, ConfigError>
    where
        F: FnOnce(&mut AppConfig) -> Result<(), ConfigError>,
    {
        let mut outcome = None;
        self.tx.send_if_modified(|current| {
            let mut next = (**current).clone();
            match edit(&mut next).and_then(|_| next.validate()) {
                Ok(()) => {
                    let next = Arc::new(next);
                    *current = next.clone();
                    outcome = Some(Ok(next));
                    true
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    false
                }
            }
        });

        match outcome {
            Some(result) => {
                if result.is_ok() {
                    debug!("Published edited configuration snapshot");
                }
                result
            }
            None => Ok(self.snapshot()),
        }
    }

    /// Receiver notified whenever a new snapshot is published
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppConfig>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Point, ProcessRule, Size};

    fn rule(name: &str) -> ProcessRule {
        ProcessRule::new(name, Size::new(400, 300)).unwrap()
    }

    #[test]
    fn snapshots_are_immutable_once_taken() {
        let handle = ConfigHandle::new(AppConfig::default()).unwrap();
        let before = handle.snapshot();

        handle
            .update(|config| config.add_rule(rule("notepad.exe")))
            .unwrap();

        assert!(before.rules().is_empty());
        assert_eq!(handle.snapshot().rules().len(), 1);
    }

    #[test]
    fn failed_update_publishes_nothing() {
        let handle = ConfigHandle::new(AppConfig::default()).unwrap();
        handle
            .update(|config| config.add_rule(rule("notepad.exe")))
            .unwrap();

        let result = handle.update(|config| {
            config.add_cell(Point::new(0, 0));
            config.add_rule(rule("NOTEPAD.exe"))
        });

        assert!(matches!(result, Err(ConfigError::DuplicateRule(_))));
        let current = handle.snapshot();
        assert_eq!(current.rules().len(), 1);
        assert!(current.grid.is_empty());
    }

    #[test]
    fn publish_rejects_invalid_configuration() {
        let handle = ConfigHandle::new(AppConfig::default()).unwrap();
        let mut invalid = AppConfig::default();
        invalid.engine.poll_interval_ms = 0;

        assert!(handle.publish(invalid).is_err());
        assert_eq!(handle.snapshot().engine.poll_interval_ms, 250);
    }

    #[tokio::test]
    async fn subscribers_see_published_changes() {
        let handle = ConfigHandle::new(AppConfig::default()).unwrap();
        let mut rx = handle.subscribe();

        handle
            .update(|config| {
                config.set_grid_enabled(true);
                Ok(())
            })
            .unwrap();

        rx.changed().await.unwrap();
        assert!(rx.borrow().grid.enabled);
    }
}
