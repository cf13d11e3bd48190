use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

fn stream_from_row(row: &SqliteRow) -> Result<ActiveStream> {
    Ok(ActiveStream {
        id: row.try_get::<String, _>("id")?.parse()?,
        credential_id: row.try_get::<String, _>("credential_id")?.parse()?,
        stream_id: row.try_get("stream_id")?,
        client_ip: row.try_get("client_ip")?,
        session_token: row.try_get("session_token")?,
        started_at: row.try_get("started_at")?,
        last_activity: row.try_get("last_activity")?,
    })
}

impl super::Database {
    /// Authoritative live-session count for one credential.
    pub async fn count_active_streams(&self, credential_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM active_streams WHERE credential_id = ?",
        )
        .bind(credential_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn insert_active_stream(
        &self,
        credential_id: Uuid,
        stream_id: &str,
        client_ip: Option<&str>,
        session_token: &str,
    ) -> Result<ActiveStream> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO active_streams (id, credential_id, stream_id, client_ip, session_token, started_at, last_activity)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(credential_id.to_string())
        .bind(stream_id)
        .bind(client_ip)
        .bind(session_token)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM active_streams WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        stream_from_row(&row)
    }

    pub async fn get_active_stream_by_token(&self, session_token: &str) -> Result<Option<ActiveStream>> {
        let row = sqlx::query("SELECT * FROM active_streams WHERE session_token = ?")
            .bind(session_token)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(stream_from_row).transpose()
    }

    pub async fn delete_active_stream(&self, session_token: &str) -> Result<Option<Uuid>> {
        let stream = self.get_active_stream_by_token(session_token).await?;
        if let Some(stream) = &stream {
            sqlx::query("DELETE FROM active_streams WHERE session_token = ?")
                .bind(session_token)
                .execute(&self.pool)
                .await?;
        }
        Ok(stream.map(|s| s.credential_id))
    }

    pub async fn touch_active_stream(&self, session_token: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE active_streams SET last_activity = ? WHERE session_token = ?",
        )
        .bind(Utc::now())
        .bind(session_token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sessions idle since before the cutoff, optionally restricted to one
    /// account's credentials.
    pub async fn list_stale_streams(
        &self,
        account_id: Option<Uuid>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ActiveStream>> {
        let rows = match account_id {
            Some(account_id) => {
                sqlx::query(
                    "SELECT s.* FROM active_streams s
                     JOIN credentials c ON c.id = s.credential_id
                     WHERE s.last_activity < ? AND c.account_id = ?",
                )
                .bind(cutoff)
                .bind(account_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM active_streams WHERE last_activity < ?")
                    .bind(cutoff)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(stream_from_row).collect()
    }

    pub async fn list_active_streams(&self, account_id: Option<Uuid>) -> Result<Vec<ActiveStream>> {
        let rows = match account_id {
            Some(account_id) => {
                sqlx::query(
                    "SELECT s.* FROM active_streams s
                     JOIN credentials c ON c.id = s.credential_id
                     WHERE c.account_id = ?
                     ORDER BY s.started_at",
                )
                .bind(account_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM active_streams ORDER BY started_at")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(stream_from_row).collect()
    }

    /// Rewrite the advisory counter from the authoritative row count.
    pub async fn refresh_credential_connection_count(&self, credential_id: Uuid) -> Result<i64> {
        let count = self.count_active_streams(credential_id).await?;
        sqlx::query(
            "UPDATE credentials SET active_connections = ?, updated_at = ? WHERE id = ?",
        )
        .bind(count as i32)
        .bind(Utc::now())
        .bind(credential_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(count)
    }

    /// Total active client sessions across all of an account's credentials.
    pub async fn count_account_active_streams(&self, account_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM active_streams s
             JOIN credentials c ON c.id = s.credential_id
             WHERE c.account_id = ?",
        )
        .bind(account_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
