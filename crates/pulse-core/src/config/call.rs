//! Call-signaling and client reconnect tunables.

use serde::{Deserialize, Serialize};

/// Call state machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Seconds a call may sit in `Dialing`/`Ringing` before the machine
    /// auto-terminates with `NoAnswer`.
    #[serde(default = "default_ring_timeout")]
    pub ring_timeout_seconds: u64,
    /// Milliseconds between ring cue repeats.
    #[serde(default = "default_cue_interval")]
    pub cue_interval_ms: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout_seconds: default_ring_timeout(),
            cue_interval_ms: default_cue_interval(),
        }
    }
}

/// Reconnect/backoff policy for the client event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt, in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Upper bound on the backoff delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl ReconnectConfig {
    /// Backoff delay for the given consecutive failure count, capped and
    /// without jitter (the supervisor adds jitter on top).
    pub fn delay_for_attempt(&self, failures: u32) -> std::time::Duration {
        let exp = failures.min(16);
        let ms = self
            .initial_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        std::time::Duration::from_millis(ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_ring_timeout() -> u64 {
    45
}

fn default_cue_interval() -> u64 {
    2000
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000
}
