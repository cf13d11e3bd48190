use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

/// SQLite caps bind parameters; keep IN-lists well under the limit.
pub const SQL_BATCH_SIZE: usize = 500;

fn category_from_row(row: &SqliteRow) -> Result<Category> {
    Ok(Category {
        id: row.try_get::<String, _>("id")?.parse()?,
        account_id: row.try_get::<String, _>("account_id")?.parse()?,
        category_id: row.try_get("category_id")?,
        category_name: row.try_get("category_name")?,
        is_ppv: row.try_get("is_ppv")?,
        last_seen: row.try_get("last_seen")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn channel_from_row(row: &SqliteRow) -> Result<Channel> {
    let category_id: Option<String> = row.try_get("category_id")?;
    Ok(Channel {
        id: row.try_get::<String, _>("id")?.parse()?,
        account_id: row.try_get::<String, _>("account_id")?.parse()?,
        stream_id: row.try_get("stream_id")?,
        name: row.try_get("name")?,
        cleaned_name: row.try_get("cleaned_name")?,
        category_id: category_id.as_deref().map(str::parse).transpose()?,
        stream_type: row.try_get("stream_type")?,
        stream_icon: row.try_get("stream_icon")?,
        epg_channel_id: row.try_get("epg_channel_id")?,
        added: row.try_get("added")?,
        custom_sid: row.try_get("custom_sid")?,
        tv_archive: row.try_get("tv_archive")?,
        direct_source: row.try_get("direct_source")?,
        tv_archive_duration: row.try_get("tv_archive_duration")?,
        last_seen: row.try_get("last_seen")?,
        is_active: row.try_get("is_active")?,
        is_visible: row.try_get("is_visible")?,
        is_ppv: row.try_get("is_ppv")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) const CHANNEL_COLUMNS: &str = "id, account_id, stream_id, name, cleaned_name, category_id, stream_type, \
     stream_icon, epg_channel_id, added, custom_sid, tv_archive, direct_source, \
     tv_archive_duration, last_seen, is_active, is_visible, is_ppv, created_at, updated_at";

/// One category as reported by the provider, ready to upsert.
#[derive(Debug, Clone)]
pub struct CategorySyncRecord {
    pub category_id: String,
    pub category_name: String,
    pub is_ppv: bool,
}

/// One stream as reported by the provider, with derived fields resolved.
#[derive(Debug, Clone, Default)]
pub struct ChannelSyncRecord {
    pub stream_id: String,
    pub name: String,
    pub cleaned_name: String,
    pub category_id: Option<Uuid>,
    pub is_ppv: bool,
    pub stream_type: Option<String>,
    pub stream_icon: Option<String>,
    pub epg_channel_id: Option<String>,
    pub added: Option<String>,
    pub custom_sid: Option<String>,
    pub tv_archive: Option<i32>,
    pub direct_source: Option<String>,
    pub tv_archive_duration: Option<i32>,
    /// Normalized tag names extracted by the rule pipeline
    pub tags: Vec<String>,
}

impl super::Database {
    pub async fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT * FROM categories WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(category_from_row).transpose()
    }

    pub async fn list_categories(&self, account_id: Uuid) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT * FROM categories WHERE account_id = ? ORDER BY category_name",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(category_from_row).collect()
    }

    /// Map of external category id -> (row id, category name).
    pub async fn category_lookup(&self, account_id: Uuid) -> Result<HashMap<String, (Uuid, String)>> {
        let categories = self.list_categories(account_id).await?;
        Ok(categories
            .into_iter()
            .map(|c| (c.category_id.clone(), (c.id, c.category_name)))
            .collect())
    }

    /// Upsert the provider's category list in one transaction.
    /// Returns (added, updated).
    pub async fn apply_category_sync(
        &self,
        account_id: Uuid,
        records: &[CategorySyncRecord],
        now: DateTime<Utc>,
    ) -> Result<(u64, u64)> {
        let existing = self.category_lookup(account_id).await?;

        let mut added = 0u64;
        let mut updated = 0u64;
        let mut tx = self.pool.begin().await?;

        for record in records {
            if record.category_id.is_empty() {
                continue;
            }

            if let Some((id, current_name)) = existing.get(&record.category_id) {
                if current_name != &record.category_name {
                    updated += 1;
                }
                sqlx::query(
                    "UPDATE categories
                     SET category_name = ?, is_ppv = ?, last_seen = ?, is_active = 1,
                         updated_at = CASE WHEN category_name != ? THEN ? ELSE updated_at END
                     WHERE id = ?",
                )
                .bind(&record.category_name)
                .bind(record.is_ppv)
                .bind(now)
                .bind(&record.category_name)
                .bind(now)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(
                    "INSERT INTO categories (id, account_id, category_id, category_name, is_ppv, last_seen, is_active, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(account_id.to_string())
                .bind(&record.category_id)
                .bind(&record.category_name)
                .bind(record.is_ppv)
                .bind(now)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                added += 1;
            }
        }

        tx.commit().await?;
        Ok((added, updated))
    }

    /// Upsert the provider's stream list, including derived fields and
    /// extraction-sourced tags, in one transaction. Returns (added, updated).
    pub async fn apply_channel_sync(
        &self,
        account_id: Uuid,
        records: &[ChannelSyncRecord],
        now: DateTime<Utc>,
    ) -> Result<(u64, u64)> {
        let existing: HashMap<String, Channel> = self
            .list_channels(account_id)
            .await?
            .into_iter()
            .map(|c| (c.stream_id.clone(), c))
            .collect();

        let mut added = 0u64;
        let mut updated = 0u64;
        let mut tx = self.pool.begin().await?;

        for record in records {
            if record.stream_id.is_empty() {
                continue;
            }

            if let Some(current) = existing.get(&record.stream_id) {
                let changed = current.name != record.name
                    || current.cleaned_name.as_deref() != Some(record.cleaned_name.as_str())
                    || current.category_id != record.category_id
                    || current.is_ppv != record.is_ppv
                    || current.stream_type != record.stream_type
                    || current.stream_icon != record.stream_icon
                    || current.epg_channel_id != record.epg_channel_id
                    || current.added != record.added
                    || current.custom_sid != record.custom_sid
                    || current.tv_archive != record.tv_archive
                    || current.direct_source != record.direct_source
                    || current.tv_archive_duration != record.tv_archive_duration;

                sqlx::query(
                    "UPDATE channels
                     SET name = ?, cleaned_name = ?, category_id = ?, is_ppv = ?,
                         stream_type = ?, stream_icon = ?, epg_channel_id = ?, added = ?,
                         custom_sid = ?, tv_archive = ?, direct_source = ?, tv_archive_duration = ?,
                         last_seen = ?, is_active = 1,
                         updated_at = CASE WHEN ? THEN ? ELSE updated_at END
                     WHERE id = ?",
                )
                .bind(&record.name)
                .bind(&record.cleaned_name)
                .bind(record.category_id.map(|c| c.to_string()))
                .bind(record.is_ppv)
                .bind(&record.stream_type)
                .bind(&record.stream_icon)
                .bind(&record.epg_channel_id)
                .bind(&record.added)
                .bind(&record.custom_sid)
                .bind(record.tv_archive)
                .bind(&record.direct_source)
                .bind(record.tv_archive_duration)
                .bind(now)
                .bind(changed)
                .bind(now)
                .bind(current.id.to_string())
                .execute(&mut *tx)
                .await?;

                if changed {
                    updated += 1;
                }
            } else {
                sqlx::query(
                    "INSERT INTO channels (id, account_id, stream_id, name, cleaned_name, category_id, is_ppv,
                        stream_type, stream_icon, epg_channel_id, added, custom_sid, tv_archive,
                        direct_source, tv_archive_duration, last_seen, is_active, is_visible, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, 1, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(account_id.to_string())
                .bind(&record.stream_id)
                .bind(&record.name)
                .bind(&record.cleaned_name)
                .bind(record.category_id.map(|c| c.to_string()))
                .bind(record.is_ppv)
                .bind(&record.stream_type)
                .bind(&record.stream_icon)
                .bind(&record.epg_channel_id)
                .bind(&record.added)
                .bind(&record.custom_sid)
                .bind(record.tv_archive)
                .bind(&record.direct_source)
                .bind(record.tv_archive_duration)
                .bind(now)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                added += 1;
            }

            self.sync_extraction_tags_tx(&mut tx, account_id, &record.stream_id, &record.tags, now)
                .await?;
        }

        tx.commit().await?;
        Ok((added, updated))
    }

    /// Mark channels unseen since the cutoff as inactive. Returns the count.
    pub async fn deactivate_unseen_channels(
        &self,
        account_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE channels SET is_active = 0
             WHERE account_id = ? AND is_active = 1 AND last_seen < ?",
        )
        .bind(account_id.to_string())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        let row = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(channel_from_row).transpose()
    }

    pub async fn list_channels(&self, account_id: Uuid) -> Result<Vec<Channel>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE account_id = ?"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(channel_from_row).collect()
    }

    pub async fn list_active_channels(&self, account_id: Uuid) -> Result<Vec<Channel>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE account_id = ? AND is_active = 1"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(channel_from_row).collect()
    }

    /// Active channels joined with their category name, for filter
    /// evaluation and EPG matching.
    pub async fn list_active_channels_with_category(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<(Channel, String)>> {
        let rows = sqlx::query(
            "SELECT c.id, c.account_id, c.stream_id, c.name, c.cleaned_name, c.category_id,
                    c.stream_type, c.stream_icon, c.epg_channel_id, c.added, c.custom_sid,
                    c.tv_archive, c.direct_source, c.tv_archive_duration, c.last_seen,
                    c.is_active, c.is_visible, c.is_ppv, c.created_at, c.updated_at,
                    COALESCE(cat.category_name, '') AS joined_category_name
             FROM channels c
             LEFT JOIN categories cat ON cat.id = c.category_id
             WHERE c.account_id = ? AND c.is_active = 1",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let channel = channel_from_row(row)?;
                let category_name: String = row.try_get("joined_category_name")?;
                Ok((channel, category_name))
            })
            .collect()
    }

    /// Visible, active channels with category names, ordered for playlist
    /// generation.
    pub async fn list_playlist_channels(&self, account_id: Uuid) -> Result<Vec<(Channel, String)>> {
        let rows = sqlx::query(
            "SELECT c.id, c.account_id, c.stream_id, c.name, c.cleaned_name, c.category_id,
                    c.stream_type, c.stream_icon, c.epg_channel_id, c.added, c.custom_sid,
                    c.tv_archive, c.direct_source, c.tv_archive_duration, c.last_seen,
                    c.is_active, c.is_visible, c.is_ppv, c.created_at, c.updated_at,
                    COALESCE(cat.category_name, '') AS joined_category_name
             FROM channels c
             LEFT JOIN categories cat ON cat.id = c.category_id
             WHERE c.account_id = ? AND c.is_active = 1 AND c.is_visible = 1
             ORDER BY joined_category_name, c.name",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let channel = channel_from_row(row)?;
                let category_name: String = row.try_get("joined_category_name")?;
                Ok((channel, category_name))
            })
            .collect()
    }

    pub async fn set_channel_visibility(&self, channel_id: Uuid, visible: bool) -> Result<()> {
        sqlx::query("UPDATE channels SET is_visible = ?, updated_at = ? WHERE id = ?")
            .bind(visible)
            .bind(Utc::now())
            .bind(channel_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bulk visibility write, used when an account has no filters.
    pub async fn set_all_active_channels_visible(&self, account_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE channels SET is_visible = 1 WHERE account_id = ? AND is_active = 1",
        )
        .bind(account_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Apply visibility results in one transaction; only rows whose value
    /// changed are touched.
    pub async fn apply_visibility(&self, changes: &[(Uuid, bool)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (channel_id, visible) in changes {
            sqlx::query("UPDATE channels SET is_visible = ? WHERE id = ?")
                .bind(visible)
                .bind(channel_id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
