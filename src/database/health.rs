use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::catalog::{channel_from_row, CHANNEL_COLUMNS};

fn status_from_row(row: &SqliteRow) -> Result<ChannelHealthStatus> {
    Ok(ChannelHealthStatus {
        id: row.try_get::<String, _>("id")?.parse()?,
        channel_id: row.try_get::<String, _>("channel_id")?.parse()?,
        status: row.try_get("status")?,
        total_checks: row.try_get("total_checks")?,
        successful_checks: row.try_get("successful_checks")?,
        failed_checks: row.try_get("failed_checks")?,
        consecutive_failures: row.try_get("consecutive_failures")?,
        distinct_failure_periods: row.try_get("distinct_failure_periods")?,
        last_check_at: row.try_get("last_check_at")?,
        last_success_at: row.try_get("last_success_at")?,
        last_failure_at: row.try_get("last_failure_at")?,
        last_result: row.try_get("last_result")?,
        auto_disabled_at: row.try_get("auto_disabled_at")?,
        manually_reenabled_at: row.try_get("manually_reenabled_at")?,
        ignored_at: row.try_get("ignored_at")?,
        ignored_reason: row.try_get("ignored_reason")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn check_from_row(row: &SqliteRow) -> Result<ChannelHealthCheck> {
    let credential_id: Option<String> = row.try_get("credential_id")?;
    Ok(ChannelHealthCheck {
        id: row.try_get::<String, _>("id")?.parse()?,
        channel_id: row.try_get::<String, _>("channel_id")?.parse()?,
        result: row.try_get("result")?,
        http_status_code: row.try_get("http_status_code")?,
        error_message: row.try_get("error_message")?,
        analysis_details: row.try_get("analysis_details")?,
        check_duration_ms: row.try_get("check_duration_ms")?,
        credential_id: credential_id.as_deref().map(str::parse).transpose()?,
        checked_at: row.try_get("checked_at")?,
    })
}

impl super::Database {
    pub async fn get_health_status(&self, channel_id: Uuid) -> Result<Option<ChannelHealthStatus>> {
        let row = sqlx::query("SELECT * FROM channel_health_status WHERE channel_id = ?")
            .bind(channel_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(status_from_row).transpose()
    }

    /// Fetch the health status row for a channel, creating a fresh `unknown`
    /// row if none exists.
    pub async fn get_or_create_health_status(&self, channel_id: Uuid) -> Result<ChannelHealthStatus> {
        if let Some(status) = self.get_health_status(channel_id).await? {
            return Ok(status);
        }

        sqlx::query(
            "INSERT OR IGNORE INTO channel_health_status (id, channel_id, status, updated_at)
             VALUES (?, ?, 'unknown', ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(channel_id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_health_status(channel_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create health status for {}", channel_id))
    }

    pub async fn save_health_status(&self, status: &ChannelHealthStatus) -> Result<()> {
        sqlx::query(
            "UPDATE channel_health_status
             SET status = ?, total_checks = ?, successful_checks = ?, failed_checks = ?,
                 consecutive_failures = ?, distinct_failure_periods = ?, last_check_at = ?,
                 last_success_at = ?, last_failure_at = ?, last_result = ?, auto_disabled_at = ?,
                 manually_reenabled_at = ?, ignored_at = ?, ignored_reason = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status.status)
        .bind(status.total_checks)
        .bind(status.successful_checks)
        .bind(status.failed_checks)
        .bind(status.consecutive_failures)
        .bind(status.distinct_failure_periods)
        .bind(status.last_check_at)
        .bind(status.last_success_at)
        .bind(status.last_failure_at)
        .bind(&status.last_result)
        .bind(status.auto_disabled_at)
        .bind(status.manually_reenabled_at)
        .bind(status.ignored_at)
        .bind(&status.ignored_reason)
        .bind(status.updated_at)
        .bind(status.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_health_check(
        &self,
        channel_id: Uuid,
        analysis: &StreamAnalysis,
        credential_id: Option<Uuid>,
        checked_at: DateTime<Utc>,
    ) -> Result<ChannelHealthCheck> {
        let id = Uuid::new_v4();
        let analysis_details = analysis
            .analysis_details
            .as_ref()
            .map(|d| d.to_string());

        sqlx::query(
            "INSERT INTO channel_health_checks
                (id, channel_id, result, http_status_code, error_message, analysis_details,
                 check_duration_ms, credential_id, checked_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(channel_id.to_string())
        .bind(analysis.result)
        .bind(analysis.http_status_code)
        .bind(&analysis.error_message)
        .bind(analysis_details)
        .bind(analysis.check_duration_ms)
        .bind(credential_id.map(|c| c.to_string()))
        .bind(checked_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM channel_health_checks WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        check_from_row(&row)
    }

    /// Failure checks for a channel since the given time (or all of them),
    /// oldest first. Used to cluster distinct failure periods.
    pub async fn list_failure_checks(
        &self,
        channel_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChannelHealthCheck>> {
        let base = "SELECT * FROM channel_health_checks
             WHERE channel_id = ?
               AND result IN ('connection_failed', 'timeout', 'http_error', 'black_screen',
                              'audio_only', 'invalid_stream')";

        let rows = match since {
            Some(since) => {
                sqlx::query(&format!("{base} AND checked_at > ? ORDER BY checked_at ASC"))
                    .bind(channel_id.to_string())
                    .bind(since)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(&format!("{base} ORDER BY checked_at ASC"))
                    .bind(channel_id.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(check_from_row).collect()
    }

    pub async fn list_health_checks(
        &self,
        channel_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChannelHealthCheck>> {
        let rows = sqlx::query(
            "SELECT * FROM channel_health_checks
             WHERE channel_id = ? ORDER BY checked_at DESC LIMIT ?",
        )
        .bind(channel_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(check_from_row).collect()
    }

    /// Channels due for a health scan. Never-checked channels first, then
    /// degraded ones, then the longest-unchecked; down and ignored channels
    /// are excluded.
    pub async fn channels_to_scan(
        &self,
        account_id: Uuid,
        scan_cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Channel>> {
        let rows = sqlx::query(&format!(
            "SELECT {columns} FROM channels c
             LEFT JOIN channel_health_status hs ON hs.channel_id = c.id
             WHERE c.account_id = ? AND c.is_active = 1
               AND (hs.id IS NULL OR hs.status NOT IN ('down', 'ignored'))
               AND (hs.last_check_at IS NULL OR hs.last_check_at < ?)
             ORDER BY
               CASE WHEN hs.id IS NULL THEN 0
                    WHEN hs.status = 'degraded' THEN 1
                    ELSE 2 END,
               hs.last_check_at ASC
             LIMIT ?",
            columns = CHANNEL_COLUMNS
                .split(", ")
                .map(|c| format!("c.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        ))
        .bind(account_id.to_string())
        .bind(scan_cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(channel_from_row).collect()
    }
}
