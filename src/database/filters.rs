use crate::models::*;
use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

fn filter_from_row(row: &SqliteRow) -> Result<Filter> {
    Ok(Filter {
        id: row.try_get::<String, _>("id")?.parse()?,
        account_id: row.try_get::<String, _>("account_id")?.parse()?,
        name: row.try_get("name")?,
        filter_kind: row.try_get("filter_kind")?,
        filter_action: row.try_get("filter_action")?,
        filter_value: row.try_get("filter_value")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl super::Database {
    pub async fn create_filter(&self, request: &FilterCreateRequest) -> Result<Filter> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO filters (id, account_id, name, filter_kind, filter_action, filter_value, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(request.account_id.to_string())
        .bind(&request.name)
        .bind(request.filter_kind)
        .bind(request.filter_action)
        .bind(&request.filter_value)
        .bind(request.enabled)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_filter(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created filter"))
    }

    pub async fn get_filter(&self, id: Uuid) -> Result<Option<Filter>> {
        let row = sqlx::query("SELECT * FROM filters WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(filter_from_row).transpose()
    }

    pub async fn list_filters(&self, account_id: Uuid) -> Result<Vec<Filter>> {
        let rows = sqlx::query("SELECT * FROM filters WHERE account_id = ? ORDER BY name")
            .bind(account_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(filter_from_row).collect()
    }

    pub async fn list_enabled_filters(&self, account_id: Uuid) -> Result<Vec<Filter>> {
        let rows = sqlx::query(
            "SELECT * FROM filters WHERE account_id = ? AND enabled = 1 ORDER BY name",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(filter_from_row).collect()
    }

    pub async fn update_filter(&self, id: Uuid, request: &FilterCreateRequest) -> Result<Option<Filter>> {
        let result = sqlx::query(
            "UPDATE filters
             SET name = ?, filter_kind = ?, filter_action = ?, filter_value = ?, enabled = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&request.name)
        .bind(request.filter_kind)
        .bind(request.filter_action)
        .bind(&request.filter_value)
        .bind(request.enabled)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_filter(id).await
    }

    pub async fn delete_filter(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM filters WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
