use super::catalog::SQL_BATCH_SIZE;
use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

impl super::Database {
    /// Find or lazily create a tag by its normalized name.
    pub async fn ensure_tag(&self, name: &str) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        let id = self.ensure_tag_tx(&mut tx, name).await?;
        tx.commit().await?;
        Ok(id)
    }

    pub(crate) async fn ensure_tag_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        name: &str,
    ) -> Result<Uuid> {
        if let Some(row) = sqlx::query("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?
        {
            return Ok(row.try_get::<String, _>("id")?.parse()?);
        }

        let id = Uuid::new_v4();
        // A concurrent writer may have inserted the same name; the unique
        // constraint resolves the race and the re-select picks up the winner.
        sqlx::query("INSERT OR IGNORE INTO tags (id, name, created_at) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(name)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await?;

        let row = sqlx::query("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;
        Ok(row.try_get::<String, _>("id")?.parse()?)
    }

    pub async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, created_at FROM tags WHERE UPPER(name) = UPPER(?)")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(Tag {
                id: row.try_get::<String, _>("id")?.parse()?,
                name: row.try_get("name")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    /// Attach a tag to a channel, creating the tag if needed. Duplicate
    /// associations are ignored. Returns whether a new association was made.
    pub async fn add_channel_tag(
        &self,
        account_id: Uuid,
        stream_id: &str,
        tag_name: &str,
        source: TagSource,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let tag_id = self.ensure_tag_tx(&mut tx, tag_name).await?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO channel_tags (id, account_id, stream_id, tag_id, source, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id.to_string())
        .bind(stream_id)
        .bind(tag_id.to_string())
        .bind(source)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace a channel's extraction-sourced tags with the given set,
    /// leaving enrichment/manual/sync tags untouched.
    pub(crate) async fn sync_extraction_tags_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        account_id: Uuid,
        stream_id: &str,
        tags: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tag_ids = Vec::with_capacity(tags.len());
        for name in tags {
            if name.is_empty() {
                continue;
            }
            tag_ids.push(self.ensure_tag_tx(tx, name).await?);
        }

        for tag_id in &tag_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO channel_tags (id, account_id, stream_id, tag_id, source, created_at)
                 VALUES (?, ?, ?, ?, 'extraction', ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(account_id.to_string())
            .bind(stream_id)
            .bind(tag_id.to_string())
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }

        if tag_ids.is_empty() {
            sqlx::query(
                "DELETE FROM channel_tags
                 WHERE account_id = ? AND stream_id = ? AND source = 'extraction'",
            )
            .bind(account_id.to_string())
            .bind(stream_id)
            .execute(&mut **tx)
            .await?;
        } else {
            let placeholders = vec!["?"; tag_ids.len()].join(", ");
            let sql = format!(
                "DELETE FROM channel_tags
                 WHERE account_id = ? AND stream_id = ? AND source = 'extraction'
                   AND tag_id NOT IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql)
                .bind(account_id.to_string())
                .bind(stream_id);
            for tag_id in &tag_ids {
                query = query.bind(tag_id.to_string());
            }
            query.execute(&mut **tx).await?;
        }

        Ok(())
    }

    /// Tag names for one channel.
    pub async fn channel_tag_names(&self, account_id: Uuid, stream_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT t.name FROM channel_tags ct
             JOIN tags t ON t.id = ct.tag_id
             WHERE ct.account_id = ? AND ct.stream_id = ?",
        )
        .bind(account_id.to_string())
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("name")?))
            .collect()
    }

    /// Tag names for many channels, loaded in bounded batches to respect the
    /// store's bind-parameter limit. Keys are stream ids.
    pub async fn channel_tag_map(
        &self,
        account_id: Uuid,
        stream_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();

        for batch in stream_ids.chunks(SQL_BATCH_SIZE) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT ct.stream_id, t.name FROM channel_tags ct
                 JOIN tags t ON t.id = ct.tag_id
                 WHERE ct.account_id = ? AND ct.stream_id IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql).bind(account_id.to_string());
            for stream_id in batch {
                query = query.bind(stream_id);
            }

            for row in query.fetch_all(&self.pool).await? {
                let stream_id: String = row.try_get("stream_id")?;
                let name: String = row.try_get("name")?;
                map.entry(stream_id).or_default().push(name);
            }
        }

        Ok(map)
    }

    /// Stream ids under an account carrying the given tag (case-insensitive).
    pub async fn stream_ids_with_tag(&self, account_id: Uuid, tag_name: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT ct.stream_id FROM channel_tags ct
             JOIN tags t ON t.id = ct.tag_id
             WHERE ct.account_id = ? AND UPPER(t.name) = UPPER(?)",
        )
        .bind(account_id.to_string())
        .bind(tag_name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("stream_id")?))
            .collect()
    }
}
