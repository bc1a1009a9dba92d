//! File lifecycle for Ferry.
//!
//! [`LifecycleEngine`] owns the upload, token and download transitions.
//! [`Sweeper`] reclaims what the engine leaves behind, and the
//! [`scheduler`] module decides when it runs.

pub mod builder;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod scheduler;
pub mod sweeper;

#[cfg(test)]
mod test_support;

pub use builder::LifecycleEngineBuilder;
pub use error::{LifecycleError, SweepError};
pub use lifecycle::{Download, FileInfo, LifecycleConfig, LifecycleEngine, NewUpload};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use scheduler::{
    BackgroundConfig, BackgroundProcessor, BackgroundProcessorBuilder, CooldownGate,
    InlineCleanupTrigger, InlineConfig,
};
pub use sweeper::{
    ErrorLog, ExpiryReport, MAX_REPORTED_ERRORS, OrphanReport, SweepOptions, SweepReport, Sweeper,
    SweeperConfig,
};
