use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Down,
    Ignored,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckResult {
    Success,
    ConnectionFailed,
    Timeout,
    HttpError,
    BlackScreen,
    AudioOnly,
    InvalidStream,
    Skipped,
}

impl HealthCheckResult {
    /// Stable snake_case name, persisted as the status row's last result.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ConnectionFailed => "connection_failed",
            Self::Timeout => "timeout",
            Self::HttpError => "http_error",
            Self::BlackScreen => "black_screen",
            Self::AudioOnly => "audio_only",
            Self::InvalidStream => "invalid_stream",
            Self::Skipped => "skipped",
        }
    }

    /// Whether this result counts as a failure for status aggregation.
    /// `Skipped` (analyzer unavailable) affects nothing.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed
                | Self::Timeout
                | Self::HttpError
                | Self::BlackScreen
                | Self::AudioOnly
                | Self::InvalidStream
        )
    }
}

/// Aggregate health for one channel.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelHealthStatus {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub status: HealthStatus,
    pub total_checks: i64,
    pub successful_checks: i64,
    pub failed_checks: i64,
    pub consecutive_failures: i64,
    /// Failure clusters separated by at least `min_hours_apart` of wall time
    pub distinct_failure_periods: i64,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_result: Option<String>,
    pub auto_disabled_at: Option<DateTime<Utc>>,
    pub manually_reenabled_at: Option<DateTime<Utc>>,
    pub ignored_at: Option<DateTime<Utc>>,
    pub ignored_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A single probe outcome.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelHealthCheck {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub result: HealthCheckResult,
    pub http_status_code: Option<i32>,
    pub error_message: Option<String>,
    pub analysis_details: Option<String>,
    pub check_duration_ms: i64,
    pub credential_id: Option<Uuid>,
    pub checked_at: DateTime<Utc>,
}

/// The analyzer's classification of one probe, before persistence.
#[derive(Debug, Clone)]
pub struct StreamAnalysis {
    pub result: HealthCheckResult,
    pub http_status_code: Option<i32>,
    pub error_message: Option<String>,
    pub analysis_details: Option<serde_json::Value>,
    pub check_duration_ms: i64,
}

impl StreamAnalysis {
    pub fn failure(result: HealthCheckResult, message: impl Into<String>) -> Self {
        Self {
            result,
            http_status_code: None,
            error_message: Some(message.into()),
            analysis_details: None,
            check_duration_ms: 0,
        }
    }
}

/// Health monitor knobs, read from `sync_metadata` with built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    pub scanning_enabled: bool,
    pub reserved_connections: i64,
    pub scan_interval_minutes: i64,
    pub analysis_duration_seconds: i64,
    pub failure_threshold: i64,
    pub min_hours_apart: i64,
    pub auto_disable_down_channels: bool,
    pub black_screen_threshold: f64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            scanning_enabled: false,
            reserved_connections: 1,
            scan_interval_minutes: 30,
            analysis_duration_seconds: 10,
            failure_threshold: 3,
            min_hours_apart: 6,
            auto_disable_down_channels: true,
            black_screen_threshold: 0.95,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub success: bool,
    pub message: Option<String>,
    pub scanned: u64,
    pub healthy: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}
