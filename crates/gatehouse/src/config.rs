//! Configuration management for Gatehouse.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use smudge_common::constants::{DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL};
use smudge_engine::EngineConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Session settings
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Abuse-report intake
    #[serde(default)]
    pub reports: ReportConfig,

    /// Challenge engine (difficulty, lockout, scoring weights)
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Session lifetime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session is evicted
    #[serde(default = "default_session_ttl")]
    pub idle_ttl_secs: u64,

    /// How often the sweeper runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Largest telemetry batch accepted in one request
    #[serde(default = "default_max_event_batch")]
    pub max_event_batch: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            max_event_batch: default_max_event_batch(),
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Abuse-report configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Reports kept in the Redis list (oldest trimmed)
    #[serde(default = "default_report_list_cap")]
    pub list_cap: usize,

    /// Pending reports buffered before new ones are dropped
    #[serde(default = "default_report_queue")]
    pub queue_capacity: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            list_cap: default_report_list_cap(),
            queue_capacity: default_report_queue(),
        }
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_session_ttl() -> u64 { 900 } // 15 minutes
fn default_sweep_interval() -> u64 { 30 }
fn default_max_event_batch() -> usize { 256 }
fn default_report_list_cap() -> usize { 10_000 }
fn default_report_queue() -> usize { 1024 }

impl AppConfig {
    /// Load configuration from file, with CLI overrides.
    ///
    /// The engine section is validated here; an invalid engine config is fatal.
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .add_source(config::Environment::with_prefix("GATEHOUSE").separator("__"))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if args.server_validation {
            config.engine.server_validation = true;
        }

        config.engine.validate().context("Invalid engine configuration")?;

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            sessions: SessionConfig::default(),
            reports: ReportConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(source: &str) -> Result<AppConfig, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.sessions.idle_ttl_secs, 900);
        assert_eq!(config.reports.list_cap, 10_000);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_engine_section_overrides() {
        let config = from_toml(
            r#"
            listen_addr = "0.0.0.0:9000"

            [engine]
            digits = 5
            trust_threshold = 55
            server_validation = true

            [engine.scoring]
            paste_penalty = 40
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.engine.digits, 5);
        assert_eq!(config.engine.trust_threshold, 55);
        assert!(config.engine.server_validation);
        assert_eq!(config.engine.scoring.paste_penalty, 40);
        assert_eq!(config.engine.scoring.entry_bonus, 10);
        assert!(config.engine.validate().is_ok());
    }

    #[test]
    fn test_sweep_interval_never_zero() {
        let sessions = SessionConfig { sweep_interval_secs: 0, ..Default::default() };
        assert_eq!(sessions.sweep_interval(), Duration::from_secs(1));
    }
}
