//! Presence decay configuration.

use serde::{Deserialize, Serialize};

/// Presence registry decay thresholds.
///
/// A connected user with no activity decays `Online → RecentlyActive →
/// Away` but never to `Offline`; only a user with zero connections is
/// `Offline`, and their record is expired entirely after the grace window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Seconds of inactivity before `Online` decays to `RecentlyActive`.
    #[serde(default = "default_idle_after")]
    pub idle_after_seconds: u64,
    /// Seconds of inactivity before `RecentlyActive` decays to `Away`.
    #[serde(default = "default_away_after")]
    pub away_after_seconds: u64,
    /// Seconds a zero-connection record is retained (for last-seen display)
    /// before being dropped from the registry.
    #[serde(default = "default_expire_after")]
    pub expire_after_seconds: u64,
    /// Interval between decay sweeps in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            idle_after_seconds: default_idle_after(),
            away_after_seconds: default_away_after(),
            expire_after_seconds: default_expire_after(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_idle_after() -> u64 {
    120
}

fn default_away_after() -> u64 {
    600
}

fn default_expire_after() -> u64 {
    1800
}

fn default_sweep_interval() -> u64 {
    30
}
