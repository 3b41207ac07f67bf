use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine-wide tunables, all of which have a documented default. Loaded
/// from an optional JSON file plus `OUTREACH_*` environment variable
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database_url: String,

    /// Queue poll interval in milliseconds.
    pub tick_ms: u64,
    /// Max rows claimed per tick.
    pub batch_size: i64,
    pub max_retries: i32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,

    pub spam_window_minutes: i64,
    pub spam_threshold: i64,
    pub spam_first_pause_minutes: i64,

    pub phone_country_prefix: String,
    pub phone_total_digits: usize,

    pub webhook_verify_token: String,

    /// HTTP port `outreach-cli serve` binds to.
    pub server_port: u16,
    /// Bearer token required on mutating HTTP endpoints; empty disables auth.
    #[serde(default)]
    pub server_auth_token: Option<String>,

    /// Reclaim `processing` rows idle longer than this back to `ready`.
    pub processing_grace_minutes: i64,

    /// Scheduler sweep interval in seconds.
    pub scheduler_tick_seconds: u64,

    /// Per-call outbound HTTP timeout in seconds.
    pub provider_timeout_seconds: u64,

    /// Sample size for the rate controller's adaptive window (§9 Open Question).
    pub rate_adjust_sample_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/outreach".to_string(),
            tick_ms: 100,
            batch_size: 100,
            max_retries: 3,
            backoff_base_seconds: 30,
            backoff_max_seconds: 600,
            spam_window_minutes: 10,
            spam_threshold: 5,
            spam_first_pause_minutes: 30,
            phone_country_prefix: "91".to_string(),
            phone_total_digits: 12,
            webhook_verify_token: String::new(),
            server_port: 8080,
            server_auth_token: None,
            processing_grace_minutes: 10,
            scheduler_tick_seconds: 30,
            provider_timeout_seconds: 15,
            rate_adjust_sample_size: 20,
        }
    }
}

impl EngineConfig {
    /// Load config from an optional JSON file, then apply `OUTREACH_*`
    /// environment variable overrides (e.g. `OUTREACH_TICK_MS=50`).
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?);

        if let Some(path) = custom_path {
            builder = builder.add_source(File::from(path).required(true));
        } else {
            let default_path = PathBuf::from("/etc/outreach/config.json");
            builder = builder.add_source(File::from(default_path).required(false));
        }

        let s = builder
            .add_source(Environment::with_prefix("OUTREACH"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.tick_ms, 100);
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.phone_country_prefix, "91");
        assert_eq!(cfg.phone_total_digits, 12);
    }
}
