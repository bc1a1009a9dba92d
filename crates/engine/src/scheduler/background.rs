use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::error::LifecycleError;
use crate::sweeper::{SweepOptions, Sweeper};

/// Configuration for the periodic sweep.
#[derive(Debug, Clone)]
pub struct BackgroundConfig {
    /// Time between sweeps (default: 300 seconds).
    pub interval: Duration,
    /// Whether periodic sweeping runs at all.
    pub enabled: bool,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            enabled: true,
        }
    }
}

/// Runs an uncapped sweep on a fixed interval until told to stop.
pub struct BackgroundProcessor {
    config: BackgroundConfig,
    sweeper: Arc<Sweeper>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl BackgroundProcessor {
    /// Run until a shutdown signal arrives or every sender is dropped.
    ///
    /// The first sweep happens one full interval after start.
    pub async fn run(&mut self) {
        if !self.config.enabled {
            info!("periodic cleanup disabled");
            return;
        }
        info!(interval_secs = self.config.interval.as_secs(), "periodic cleanup starting");

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("periodic cleanup received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweeper.run(SweepOptions::periodic()).await {
                        error!(error = %e, "periodic cleanup failed");
                    }
                }
            }
        }

        info!("periodic cleanup stopped");
    }
}

/// Builder for [`BackgroundProcessor`].
#[derive(Default)]
pub struct BackgroundProcessorBuilder {
    config: BackgroundConfig,
    sweeper: Option<Arc<Sweeper>>,
}

impl BackgroundProcessorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: BackgroundConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn sweeper(mut self, sweeper: Arc<Sweeper>) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    /// Build the processor and the sender that stops it.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Configuration`] if no sweeper was provided
    /// or the interval is zero.
    pub fn build(self) -> Result<(BackgroundProcessor, mpsc::Sender<()>), LifecycleError> {
        let sweeper = self
            .sweeper
            .ok_or_else(|| LifecycleError::Configuration("sweeper is required".into()))?;
        if self.config.interval.is_zero() {
            return Err(LifecycleError::Configuration(
                "cleanup interval must be greater than zero".into(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let processor = BackgroundProcessor {
            config: self.config,
            sweeper,
            shutdown_rx,
        };
        Ok((processor, shutdown_tx))
    }
}
