use super::catalog::SQL_BATCH_SIZE;
use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

fn epg_source_from_row(row: &SqliteRow) -> Result<EpgSource> {
    let account_id: Option<String> = row.try_get("account_id")?;
    Ok(EpgSource {
        id: row.try_get::<String, _>("id")?.parse()?,
        name: row.try_get("name")?,
        source_type: row.try_get("source_type")?,
        account_id: account_id.as_deref().map(str::parse).transpose()?,
        url: row.try_get("url")?,
        priority: row.try_get("priority")?,
        enabled: row.try_get("enabled")?,
        last_sync: row.try_get("last_sync")?,
        last_sync_status: row.try_get("last_sync_status")?,
        last_sync_message: row.try_get("last_sync_message")?,
        channel_count: row.try_get("channel_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn epg_channel_from_row(row: &SqliteRow) -> Result<EpgChannel> {
    Ok(EpgChannel {
        id: row.try_get::<String, _>("id")?.parse()?,
        source_id: row.try_get::<String, _>("source_id")?.parse()?,
        channel_id: row.try_get("channel_id")?,
        display_name: row.try_get("display_name")?,
        display_names_json: row.try_get("display_names_json")?,
        icon_url: row.try_get("icon_url")?,
        url: row.try_get("url")?,
        program_count: row.try_get("program_count")?,
        first_program: row.try_get("first_program")?,
        last_program: row.try_get("last_program")?,
        last_seen: row.try_get("last_seen")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn mapping_from_row(row: &SqliteRow) -> Result<ChannelEpgMapping> {
    Ok(ChannelEpgMapping {
        id: row.try_get::<String, _>("id")?.parse()?,
        channel_id: row.try_get::<String, _>("channel_id")?.parse()?,
        epg_channel_id: row.try_get::<String, _>("epg_channel_id")?.parse()?,
        mapping_type: row.try_get("mapping_type")?,
        confidence: row.try_get("confidence")?,
        is_override: row.try_get("is_override")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn match_rule_from_row(row: &SqliteRow) -> Result<EpgMatchRule> {
    Ok(EpgMatchRule {
        id: row.try_get::<String, _>("id")?.parse()?,
        ruleset_id: row.try_get::<String, _>("ruleset_id")?.parse()?,
        name: row.try_get("name")?,
        match_type: row.try_get("match_type")?,
        source: row.try_get("source")?,
        pattern: row.try_get("pattern")?,
        category_pattern: row.try_get("category_pattern")?,
        category_exclude_pattern: row.try_get("category_exclude_pattern")?,
        country_codes: row.try_get("country_codes")?,
        required_tags: row.try_get("required_tags")?,
        excluded_tags: row.try_get("excluded_tags")?,
        min_confidence: row.try_get("min_confidence")?,
        stop_on_match: row.try_get("stop_on_match")?,
        priority: row.try_get("priority")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn exclusion_from_row(row: &SqliteRow) -> Result<EpgExclusionPattern> {
    Ok(EpgExclusionPattern {
        id: row.try_get::<String, _>("id")?.parse()?,
        name: row.try_get("name")?,
        pattern_type: row.try_get("pattern_type")?,
        pattern: row.try_get("pattern")?,
        is_regex: row.try_get("is_regex")?,
        hide_channel: row.try_get("hide_channel")?,
        priority: row.try_get("priority")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn name_mapping_from_row(row: &SqliteRow) -> Result<EpgChannelNameMapping> {
    Ok(EpgChannelNameMapping {
        id: row.try_get::<String, _>("id")?.parse()?,
        name: row.try_get("name")?,
        old_name: row.try_get("old_name")?,
        new_name: row.try_get("new_name")?,
        match_type: row.try_get("match_type")?,
        case_sensitive: row.try_get("case_sensitive")?,
        priority: row.try_get("priority")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn link_from_row(row: &SqliteRow) -> Result<ChannelLink> {
    Ok(ChannelLink {
        id: row.try_get::<String, _>("id")?.parse()?,
        channel_id: row.try_get::<String, _>("channel_id")?.parse()?,
        source_channel_id: row.try_get::<String, _>("source_channel_id")?.parse()?,
        time_offset_hours: row.try_get("time_offset_hours")?,
        link_type: row.try_get("link_type")?,
        auto_detected: row.try_get("auto_detected")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// One mapping decision from the matcher, queued for a batched commit.
#[derive(Debug, Clone)]
pub struct MappingWrite {
    pub channel_id: Uuid,
    pub epg_channel_id: Uuid,
    pub mapping_type: String,
    pub confidence: f64,
}

impl super::Database {
    pub async fn create_epg_source(
        &self,
        name: &str,
        source_type: EpgSourceType,
        account_id: Option<Uuid>,
        url: Option<&str>,
        priority: i32,
    ) -> Result<EpgSource> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO epg_sources (id, name, source_type, account_id, url, priority, enabled, channel_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 1, 0, ?, ?)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(source_type)
        .bind(account_id.map(|a| a.to_string()))
        .bind(url)
        .bind(priority)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_epg_source(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created EPG source"))
    }

    pub async fn get_epg_source(&self, id: Uuid) -> Result<Option<EpgSource>> {
        let row = sqlx::query("SELECT * FROM epg_sources WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(epg_source_from_row).transpose()
    }

    pub async fn list_epg_sources(&self) -> Result<Vec<EpgSource>> {
        let rows = sqlx::query("SELECT * FROM epg_sources ORDER BY priority, name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(epg_source_from_row).collect()
    }

    pub async fn list_enabled_epg_sources(&self) -> Result<Vec<EpgSource>> {
        let rows = sqlx::query(
            "SELECT * FROM epg_sources WHERE enabled = 1 ORDER BY priority, name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(epg_source_from_row).collect()
    }

    pub async fn set_epg_source_sync_outcome(
        &self,
        id: Uuid,
        status: &str,
        message: &str,
        channel_count: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE epg_sources
             SET last_sync = ?, last_sync_status = ?, last_sync_message = ?,
                 channel_count = COALESCE(?, channel_count), updated_at = ?
             WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(status)
        .bind(message)
        .bind(channel_count)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert one sync's worth of parsed EPG channels in a transaction.
    /// Channels missing from the feed are counted but kept; feeds drop and
    /// regain channels routinely.
    pub async fn apply_epg_channel_sync(
        &self,
        source_id: Uuid,
        parsed: &[EpgChannelUpsert],
        now: DateTime<Utc>,
    ) -> Result<EpgSyncStats> {
        let mut stats = EpgSyncStats::default();

        let existing: HashMap<String, Uuid> = sqlx::query(
            "SELECT id, channel_id FROM epg_channels WHERE source_id = ?",
        )
        .bind(source_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok((
                row.try_get::<String, _>("channel_id")?,
                row.try_get::<String, _>("id")?.parse()?,
            ))
        })
        .collect::<Result<_>>()?;

        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let mut tx = self.pool.begin().await?;

        for channel in parsed {
            stats.total_programs += channel.program_count as u64;
            let display_names_json = serde_json::to_string(&channel.display_names)?;

            if let Some(id) = existing.get(&channel.channel_id) {
                sqlx::query(
                    "UPDATE epg_channels
                     SET display_name = ?, display_names_json = ?, icon_url = ?, url = ?,
                         program_count = ?, first_program = ?, last_program = ?,
                         last_seen = ?, updated_at = ?
                     WHERE id = ?",
                )
                .bind(&channel.display_name)
                .bind(&display_names_json)
                .bind(&channel.icon_url)
                .bind(&channel.url)
                .bind(channel.program_count)
                .bind(channel.first_program)
                .bind(channel.last_program)
                .bind(now)
                .bind(now)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
                stats.channels_updated += 1;
            } else if seen.contains(channel.channel_id.as_str()) {
                // Duplicate channel id within one feed; the first entry wins
                // and later display names are merged into it.
                sqlx::query(
                    "UPDATE epg_channels
                     SET display_names_json = ?, icon_url = COALESCE(icon_url, ?),
                         url = COALESCE(url, ?), updated_at = ?
                     WHERE source_id = ? AND channel_id = ?",
                )
                .bind(&display_names_json)
                .bind(&channel.icon_url)
                .bind(&channel.url)
                .bind(now)
                .bind(source_id.to_string())
                .bind(&channel.channel_id)
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(
                    "INSERT INTO epg_channels (id, source_id, channel_id, display_name, display_names_json,
                        icon_url, url, program_count, first_program, last_program, last_seen, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(source_id.to_string())
                .bind(&channel.channel_id)
                .bind(&channel.display_name)
                .bind(&display_names_json)
                .bind(&channel.icon_url)
                .bind(&channel.url)
                .bind(channel.program_count)
                .bind(channel.first_program)
                .bind(channel.last_program)
                .bind(now)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                stats.channels_added += 1;
            }

            seen.insert(channel.channel_id.as_str());
        }

        for channel_id in existing.keys() {
            if !seen.contains(channel_id.as_str()) {
                stats.channels_removed += 1;
            }
        }

        tx.commit().await?;
        Ok(stats)
    }

    pub async fn get_epg_channel(&self, id: Uuid) -> Result<Option<EpgChannel>> {
        let row = sqlx::query("SELECT * FROM epg_channels WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(epg_channel_from_row).transpose()
    }

    /// All EPG channels, optionally restricted to one source.
    pub async fn list_epg_channels(&self, source_id: Option<Uuid>) -> Result<Vec<EpgChannel>> {
        let rows = match source_id {
            Some(source_id) => {
                sqlx::query("SELECT * FROM epg_channels WHERE source_id = ?")
                    .bind(source_id.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM epg_channels")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(epg_channel_from_row).collect()
    }

    pub async fn get_mapping_for_channel(&self, channel_id: Uuid) -> Result<Option<ChannelEpgMapping>> {
        let row = sqlx::query("SELECT * FROM channel_epg_mappings WHERE channel_id = ?")
            .bind(channel_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(mapping_from_row).transpose()
    }

    /// Existing mappings for many channels, loaded in bounded batches.
    pub async fn mappings_for_channels(
        &self,
        channel_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ChannelEpgMapping>> {
        let mut map = HashMap::new();
        let ids: Vec<String> = channel_ids.iter().map(|id| id.to_string()).collect();

        for batch in ids.chunks(SQL_BATCH_SIZE) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT * FROM channel_epg_mappings WHERE channel_id IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(id);
            }
            for row in query.fetch_all(&self.pool).await? {
                let mapping = mapping_from_row(&row)?;
                map.insert(mapping.channel_id, mapping);
            }
        }

        Ok(map)
    }

    /// Write a batch of mapping decisions in one transaction. Override
    /// mappings are never replaced.
    pub async fn apply_mapping_batch(&self, writes: &[MappingWrite]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for write in writes {
            let updated = sqlx::query(
                "UPDATE channel_epg_mappings
                 SET epg_channel_id = ?, mapping_type = ?, confidence = ?, updated_at = ?
                 WHERE channel_id = ? AND is_override = 0",
            )
            .bind(write.epg_channel_id.to_string())
            .bind(&write.mapping_type)
            .bind(write.confidence)
            .bind(now)
            .bind(write.channel_id.to_string())
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                sqlx::query(
                    "INSERT OR IGNORE INTO channel_epg_mappings
                        (id, channel_id, epg_channel_id, mapping_type, confidence, is_override, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(write.channel_id.to_string())
                .bind(write.epg_channel_id.to_string())
                .bind(&write.mapping_type)
                .bind(write.confidence)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Manually bind a channel to an EPG channel, preventing rematching.
    pub async fn set_mapping_override(
        &self,
        channel_id: Uuid,
        epg_channel_id: Uuid,
    ) -> Result<()> {
        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE channel_epg_mappings
             SET epg_channel_id = ?, mapping_type = 'manual', confidence = 1.0,
                 is_override = 1, updated_at = ?
             WHERE channel_id = ?",
        )
        .bind(epg_channel_id.to_string())
        .bind(now)
        .bind(channel_id.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO channel_epg_mappings
                    (id, channel_id, epg_channel_id, mapping_type, confidence, is_override, created_at, updated_at)
                 VALUES (?, ?, ?, 'manual', 1.0, 1, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(channel_id.to_string())
            .bind(epg_channel_id.to_string())
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn delete_mapping(&self, channel_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM channel_epg_mappings WHERE channel_id = ?")
            .bind(channel_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// EPG match rules applying to an account, flattened across its rulesets
    /// (assigned else default) and sorted by rule priority.
    pub async fn epg_match_rules_for_account(&self, account_id: Uuid) -> Result<Vec<EpgMatchRule>> {
        let assigned = sqlx::query(
            "SELECT rs.id FROM epg_match_rulesets rs
             JOIN account_epg_match_rulesets ars ON ars.ruleset_id = rs.id
             WHERE ars.account_id = ? AND rs.enabled = 1
             ORDER BY ars.priority, rs.priority",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let ruleset_ids: Vec<String> = if assigned.is_empty() {
            sqlx::query(
                "SELECT id FROM epg_match_rulesets WHERE is_default = 1 AND enabled = 1 ORDER BY priority",
            )
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| Ok(row.try_get::<String, _>("id")?))
            .collect::<Result<Vec<_>>>()?
        } else {
            assigned
                .iter()
                .map(|row| Ok(row.try_get::<String, _>("id")?))
                .collect::<Result<Vec<_>>>()?
        };

        let mut rules = Vec::new();
        for ruleset_id in ruleset_ids {
            let rows = sqlx::query(
                "SELECT * FROM epg_match_rules WHERE ruleset_id = ? AND enabled = 1 ORDER BY priority",
            )
            .bind(&ruleset_id)
            .fetch_all(&self.pool)
            .await?;
            for row in &rows {
                rules.push(match_rule_from_row(row)?);
            }
        }

        rules.sort_by_key(|r| r.priority);
        Ok(rules)
    }

    pub async fn list_enabled_exclusion_patterns(&self) -> Result<Vec<EpgExclusionPattern>> {
        let rows = sqlx::query(
            "SELECT * FROM epg_exclusion_patterns WHERE enabled = 1 ORDER BY priority",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(exclusion_from_row).collect()
    }

    pub async fn list_enabled_name_mappings(&self) -> Result<Vec<EpgChannelNameMapping>> {
        let rows = sqlx::query(
            "SELECT * FROM epg_channel_name_mappings WHERE enabled = 1 ORDER BY priority",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(name_mapping_from_row).collect()
    }

    /// Create a channel link unless one already exists for the pair.
    /// Returns whether a link was created.
    pub async fn create_channel_link(
        &self,
        channel_id: Uuid,
        source_channel_id: Uuid,
        time_offset_hours: i32,
        link_type: ChannelLinkType,
        auto_detected: bool,
    ) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO channel_links
                (id, channel_id, source_channel_id, time_offset_hours, link_type, auto_detected, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(channel_id.to_string())
        .bind(source_channel_id.to_string())
        .bind(time_offset_hours)
        .bind(link_type)
        .bind(auto_detected)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The link giving this channel its EPG, if any.
    pub async fn get_link_for_channel(&self, channel_id: Uuid) -> Result<Option<ChannelLink>> {
        let row = sqlx::query("SELECT * FROM channel_links WHERE channel_id = ?")
            .bind(channel_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(link_from_row).transpose()
    }

    pub async fn list_channel_links(&self, account_id: Uuid) -> Result<Vec<ChannelLink>> {
        let rows = sqlx::query(
            "SELECT cl.* FROM channel_links cl
             JOIN channels c ON c.id = cl.channel_id
             WHERE c.account_id = ?",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(link_from_row).collect()
    }

    pub async fn delete_channel_link(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM channel_links WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
