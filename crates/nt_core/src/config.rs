//! Runtime-tunable knobs for the engine, read from the environment once at
//! construction time and then treated as immutable.

use std::time::Duration;

/// Every tunable has a sensible default and can be overridden by an
/// environment variable for testing or operational tuning, read once at
/// startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long to coalesce rapid membership changes before minting a
    /// fresh group key.
    pub rekey_debounce: Duration,
    /// Minimum spacing between externally-triggered (`gk_req`) rekeys,
    /// to bound how often a misbehaving or confused peer can force a
    /// full re-key.
    pub rekey_throttle: Duration,
    /// Initial backoff before a responder retries a stalled group-key
    /// handshake.
    pub gk_retry_initial: Duration,
    /// Upper bound on group-key retry attempts before giving up.
    pub gk_retry_max_attempts: u32,
    /// Capsule validity window.
    pub capsule_ttl_secs: i64,
    /// Maximum decoded capsule size accepted by [`nt_proto::capsule::parse`].
    pub capsule_max_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rekey_debounce: Duration::from_millis(50),
            rekey_throttle: Duration::from_millis(800),
            gk_retry_initial: Duration::from_millis(300),
            gk_retry_max_attempts: 6,
            capsule_ttl_secs: nt_proto::capsule::TTL_SECS,
            capsule_max_bytes: nt_proto::capsule::MAX_DECODED_LEN,
        }
    }
}

impl EngineConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rekey_debounce: env_millis("NT_REKEY_DEBOUNCE_MS", defaults.rekey_debounce),
            rekey_throttle: env_millis("NT_REKEY_THROTTLE_MS", defaults.rekey_throttle),
            gk_retry_initial: env_millis("NT_GK_RETRY_INITIAL_MS", defaults.gk_retry_initial),
            gk_retry_max_attempts: std::env::var("NT_GK_RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.gk_retry_max_attempts),
            capsule_ttl_secs: std::env::var("NT_CAPSULE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capsule_ttl_secs),
            capsule_max_bytes: std::env::var("NT_CAPSULE_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capsule_max_bytes),
        }
    }
}

fn env_millis(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
