//! Channel health monitoring.
//!
//! Scans channels with spare credential capacity, classifies probe results,
//! and aggregates them into a per-channel status. Failures cluster into
//! distinct failure periods; enough distinct periods marks the channel down
//! and (optionally) hides it from playlists, with a connection floor always
//! reserved for real clients.

use crate::database::Database;
use crate::models::*;
use crate::services::analyzer::StreamAnalyzer;
use crate::services::connection_manager::ConnectionManager;
use crate::utils::normalize_server_url;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub struct HealthMonitor {
    db: Database,
    connections: ConnectionManager,
    analyzer: Arc<dyn StreamAnalyzer>,
}

impl HealthMonitor {
    pub fn new(db: Database, analyzer: Arc<dyn StreamAnalyzer>) -> Self {
        let connections = ConnectionManager::new(db.clone());
        Self {
            db,
            connections,
            analyzer,
        }
    }

    /// Connections usable for scanning right now: total capacity minus live
    /// client sessions minus the reserved floor.
    pub async fn available_scan_connections(&self, account_id: Uuid) -> Result<i64> {
        let Some(account) = self.db.get_account(account_id).await? else {
            return Ok(0);
        };
        if !account.enabled {
            return Ok(0);
        }

        let settings = self.db.health_settings().await?;
        let credentials = self.db.list_enabled_credentials(account_id).await?;
        let total: i64 = if credentials.is_empty() {
            1
        } else {
            credentials.iter().map(|c| c.max_connections.max(1) as i64).sum()
        };
        let active = self.db.count_account_active_streams(account_id).await?;

        Ok((total - active - settings.reserved_connections).max(0))
    }

    /// Scan up to `max_channels` of an account's channels. Capacity is
    /// re-checked before every probe so client traffic always wins.
    pub async fn scan(&self, account_id: Uuid, max_channels: i64) -> Result<ScanStats> {
        let settings = self.db.health_settings().await?;
        if !settings.scanning_enabled {
            return Ok(ScanStats {
                success: false,
                message: Some("Scanning is disabled".to_string()),
                ..Default::default()
            });
        }

        let available = self.available_scan_connections(account_id).await?;
        if available <= 0 {
            return Ok(ScanStats {
                success: false,
                message: Some("No connections available for scanning".to_string()),
                ..Default::default()
            });
        }

        let scan_cutoff = Utc::now() - Duration::minutes(settings.scan_interval_minutes);
        let channels = self
            .db
            .channels_to_scan(account_id, scan_cutoff, max_channels.min(available * 5))
            .await?;

        if channels.is_empty() {
            return Ok(ScanStats {
                success: true,
                message: Some("No channels need scanning".to_string()),
                ..Default::default()
            });
        }

        let Some(account) = self.db.get_account(account_id).await? else {
            return Ok(ScanStats {
                success: false,
                message: Some("Account not found".to_string()),
                ..Default::default()
            });
        };

        let mut stats = ScanStats {
            success: true,
            ..Default::default()
        };

        for channel in channels {
            if self.available_scan_connections(account_id).await? <= 0 {
                stats.message = Some("Scanning paused - connections needed for clients".to_string());
                break;
            }

            let Some(credential) = self.connections.get_available_credential(account_id).await?
            else {
                stats.message = Some("No credentials available".to_string());
                break;
            };

            let session_token = match self
                .connections
                .acquire_connection(
                    credential.id(),
                    &format!("health_check_{}", channel.stream_id),
                    Some("health_scanner"),
                )
                .await
            {
                Ok(token) => token,
                Err(e) => {
                    stats.errors.push(format!("Could not acquire connection: {e}"));
                    continue;
                }
            };

            let stream_url = format!(
                "{}/live/{}/{}/{}.ts",
                normalize_server_url(&account.server),
                credential.username(),
                credential.password(),
                channel.stream_id
            );

            let analysis = self
                .analyzer
                .analyze(
                    &stream_url,
                    settings.analysis_duration_seconds.max(1) as u32,
                    &account.user_agent,
                    settings.black_screen_threshold,
                )
                .await;

            let record_result = self
                .record_check(channel.id, &analysis, credential.id())
                .await;

            // The probe's slot is freed on every exit path
            if let Err(e) = self.connections.release_connection(&session_token).await {
                error!("Failed to release scan connection: {}", e);
            }

            match record_result {
                Ok(_) => {
                    stats.scanned += 1;
                    if analysis.result == HealthCheckResult::Success {
                        stats.healthy += 1;
                    } else if analysis.result.is_failure() {
                        stats.failed += 1;
                    }
                }
                Err(e) => {
                    error!("Error recording check for channel {}: {}", channel.id, e);
                    stats.errors.push(format!("Channel {}: {e}", channel.id));
                }
            }
        }

        Ok(stats)
    }

    /// Record a probe outcome and fold it into the channel's aggregate
    /// status.
    pub async fn record_check(
        &self,
        channel_id: Uuid,
        analysis: &StreamAnalysis,
        credential_id: Option<Uuid>,
    ) -> Result<ChannelHealthCheck> {
        self.record_check_at(channel_id, analysis, credential_id, Utc::now())
            .await
    }

    /// Like `record_check` with an explicit check time.
    pub async fn record_check_at(
        &self,
        channel_id: Uuid,
        analysis: &StreamAnalysis,
        credential_id: Option<Uuid>,
        checked_at: DateTime<Utc>,
    ) -> Result<ChannelHealthCheck> {
        let settings = self.db.health_settings().await?;
        let check = self
            .db
            .insert_health_check(channel_id, analysis, credential_id, checked_at)
            .await?;

        let mut status = self.db.get_or_create_health_status(channel_id).await?;

        status.total_checks += 1;
        status.last_check_at = Some(checked_at);
        status.last_result = Some(analysis.result.as_str().to_string());

        if analysis.result.is_failure() {
            status.failed_checks += 1;
            status.consecutive_failures += 1;
            status.last_failure_at = Some(checked_at);

            status.distinct_failure_periods = self
                .count_distinct_failure_periods(
                    channel_id,
                    status.last_success_at,
                    settings.min_hours_apart,
                )
                .await?;

            if status.distinct_failure_periods >= settings.failure_threshold {
                if status.status != HealthStatus::Down {
                    status.status = HealthStatus::Down;
                    info!(
                        "Channel {} marked as DOWN after {} distinct failure periods",
                        channel_id, status.distinct_failure_periods
                    );

                    if settings.auto_disable_down_channels {
                        self.db.set_channel_visibility(channel_id, false).await?;
                        status.auto_disabled_at = Some(checked_at);
                    }
                }
            } else if status.consecutive_failures > 0 {
                status.status = HealthStatus::Degraded;
            }
        } else if analysis.result == HealthCheckResult::Success {
            status.successful_checks += 1;
            status.consecutive_failures = 0;
            status.last_success_at = Some(checked_at);

            match status.status {
                HealthStatus::Down | HealthStatus::Degraded => {
                    status.status = HealthStatus::Healthy;
                    status.distinct_failure_periods = 0;
                    info!("Channel {} health restored to HEALTHY", channel_id);
                }
                HealthStatus::Unknown => {
                    status.status = HealthStatus::Healthy;
                }
                _ => {}
            }
        }

        status.updated_at = checked_at;
        self.db.save_health_status(&status).await?;
        Ok(check)
    }

    /// Count maximal failure clusters separated by at least
    /// `min_hours_apart` of wall time, over the failures since the last
    /// success (or all failures if the channel never succeeded).
    async fn count_distinct_failure_periods(
        &self,
        channel_id: Uuid,
        since: Option<DateTime<Utc>>,
        min_hours_apart: i64,
    ) -> Result<i64> {
        let checks = self.db.list_failure_checks(channel_id, since).await?;
        let Some(first) = checks.first() else {
            return Ok(0);
        };

        let mut periods = 1i64;
        let mut period_start = first.checked_at;

        for check in &checks[1..] {
            let hours = (check.checked_at - period_start).num_seconds() as f64 / 3600.0;
            if hours >= min_hours_apart as f64 {
                periods += 1;
                period_start = check.checked_at;
            }
        }

        Ok(periods)
    }

    /// Operator override: clear status and failure counters, restore
    /// visibility, and let scanning retest the channel.
    pub async fn reenable_channel(&self, channel_id: Uuid) -> Result<()> {
        let Some(_channel) = self.db.get_channel(channel_id).await? else {
            anyhow::bail!("Channel {} not found", channel_id);
        };

        self.db.set_channel_visibility(channel_id, true).await?;

        let mut status = self.db.get_or_create_health_status(channel_id).await?;
        let now = Utc::now();
        status.status = HealthStatus::Unknown;
        status.consecutive_failures = 0;
        status.distinct_failure_periods = 0;
        status.auto_disabled_at = None;
        status.manually_reenabled_at = Some(now);
        status.updated_at = now;
        self.db.save_health_status(&status).await?;

        info!("Channel {} re-enabled for testing", channel_id);
        Ok(())
    }

    /// Operator override: stop scanning this channel until un-ignored.
    pub async fn ignore_channel(&self, channel_id: Uuid, reason: Option<&str>) -> Result<()> {
        let Some(_channel) = self.db.get_channel(channel_id).await? else {
            anyhow::bail!("Channel {} not found", channel_id);
        };

        let mut status = self.db.get_or_create_health_status(channel_id).await?;
        let now = Utc::now();
        status.status = HealthStatus::Ignored;
        status.ignored_at = Some(now);
        status.ignored_reason = reason.map(str::to_string);
        status.updated_at = now;
        self.db.save_health_status(&status).await?;

        info!("Channel {} marked as ignored: {:?}", channel_id, reason);
        Ok(())
    }
}
