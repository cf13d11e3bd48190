use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Intervals for the three periodic jobs. Runtime-tunable values (health
/// monitor knobs, overrides of these intervals) live in `sync_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub account_interval_hours: i64,
    pub epg_interval_hours: i64,
    pub fcc_interval_hours: i64,
    /// Delay before the scheduler's first pass, letting the process settle.
    pub initial_delay_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Seconds without a heartbeat before a session is reaped.
    pub stream_timeout_seconds: i64,
    /// Base URL clients see in generated playlists.
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://iptv-hub.db".to_string(),
            },
            sync: SyncConfig {
                account_interval_hours: 6,
                epg_interval_hours: 12,
                fcc_interval_hours: 168,
                initial_delay_seconds: 60,
            },
            streaming: StreamingConfig {
                stream_timeout_seconds: 30,
                base_url: "http://localhost:8080".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file (path from `CONFIG_FILE`, default
    /// `config.toml`) layered with `IPTV_HUB_*` environment variables.
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        let defaults = Config::default();

        let settings = config::Config::builder()
            .set_default("database.url", defaults.database.url.clone())?
            .set_default(
                "sync.account_interval_hours",
                defaults.sync.account_interval_hours,
            )?
            .set_default("sync.epg_interval_hours", defaults.sync.epg_interval_hours)?
            .set_default("sync.fcc_interval_hours", defaults.sync.fcc_interval_hours)?
            .set_default(
                "sync.initial_delay_seconds",
                defaults.sync.initial_delay_seconds as i64,
            )?
            .set_default(
                "streaming.stream_timeout_seconds",
                defaults.streaming.stream_timeout_seconds,
            )?
            .set_default("streaming.base_url", defaults.streaming.base_url.clone())?
            .add_source(config::File::with_name(&config_file).required(false))
            .add_source(config::Environment::with_prefix("IPTV_HUB").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }
}
