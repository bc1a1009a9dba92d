use std::time::Duration;

use serde::Deserialize;

use ferry_engine::{BackgroundConfig, InlineConfig, SweeperConfig};

/// Configuration for the cleanup triggers.
#[derive(Debug, Deserialize)]
pub struct CleanupConfig {
    /// Whether the periodic sweep runs.
    #[serde(default = "default_true")]
    pub periodic_enabled: bool,
    /// Seconds between periodic sweeps.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// Whether requests and downloads may start a sweep.
    #[serde(default = "default_true")]
    pub inline_enabled: bool,
    /// Minimum seconds between request-triggered sweeps.
    #[serde(default = "default_interval")]
    pub inline_cooldown_seconds: u64,
    /// Orphan deletions allowed per request-triggered sweep.
    #[serde(default = "default_orphan_cap")]
    pub inline_orphan_cap: usize,
    /// Unreferenced blobs younger than this are never removed.
    #[serde(default = "default_orphan_grace")]
    pub orphan_grace_seconds: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            periodic_enabled: true,
            interval_seconds: default_interval(),
            inline_enabled: true,
            inline_cooldown_seconds: default_interval(),
            inline_orphan_cap: default_orphan_cap(),
            orphan_grace_seconds: default_orphan_grace(),
        }
    }
}

impl CleanupConfig {
    pub fn background(&self) -> BackgroundConfig {
        BackgroundConfig {
            interval: Duration::from_secs(self.interval_seconds),
            enabled: self.periodic_enabled,
        }
    }

    pub fn inline(&self) -> InlineConfig {
        InlineConfig {
            enabled: self.inline_enabled,
            cooldown: Duration::from_secs(self.inline_cooldown_seconds),
            orphan_cap: self.inline_orphan_cap,
        }
    }

    pub fn sweeper(&self) -> SweeperConfig {
        SweeperConfig {
            orphan_grace: Duration::from_secs(self.orphan_grace_seconds),
            ..SweeperConfig::default()
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

fn default_orphan_cap() -> usize {
    10
}

fn default_orphan_grace() -> u64 {
    60
}
