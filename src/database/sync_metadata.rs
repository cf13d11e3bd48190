use crate::models::HealthSettings;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;

impl super::Database {
    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("value")).transpose()?.flatten())
    }

    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_metadata (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_metadata_i64(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self
            .get_metadata(key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    }

    pub async fn get_metadata_f64(&self, key: &str, default: f64) -> Result<f64> {
        Ok(self
            .get_metadata(key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    }

    pub async fn get_metadata_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self
            .get_metadata(key)
            .await?
            .map(|v| matches!(v.as_str(), "1" | "true" | "True" | "yes" | "on"))
            .unwrap_or(default))
    }

    /// Persisted last-run marker for a periodic job.
    pub async fn get_last_run(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get_metadata(key)
            .await?
            .and_then(|v| v.parse::<DateTime<Utc>>().ok()))
    }

    pub async fn set_last_run(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.set_metadata(key, &at.to_rfc3339()).await
    }

    /// Health monitor knobs, with built-in defaults for unset keys.
    pub async fn health_settings(&self) -> Result<HealthSettings> {
        let defaults = HealthSettings::default();
        Ok(HealthSettings {
            scanning_enabled: self
                .get_metadata_bool("health.scanning_enabled", defaults.scanning_enabled)
                .await?,
            reserved_connections: self
                .get_metadata_i64("health.reserved_connections", defaults.reserved_connections)
                .await?,
            scan_interval_minutes: self
                .get_metadata_i64("health.scan_interval_minutes", defaults.scan_interval_minutes)
                .await?,
            analysis_duration_seconds: self
                .get_metadata_i64(
                    "health.analysis_duration_seconds",
                    defaults.analysis_duration_seconds,
                )
                .await?,
            failure_threshold: self
                .get_metadata_i64("health.failure_threshold", defaults.failure_threshold)
                .await?,
            min_hours_apart: self
                .get_metadata_i64("health.min_hours_apart", defaults.min_hours_apart)
                .await?,
            auto_disable_down_channels: self
                .get_metadata_bool(
                    "health.auto_disable_down_channels",
                    defaults.auto_disable_down_channels,
                )
                .await?,
            black_screen_threshold: self
                .get_metadata_f64(
                    "health.black_screen_threshold",
                    defaults.black_screen_threshold,
                )
                .await?,
        })
    }
}
