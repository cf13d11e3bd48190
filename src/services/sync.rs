//! Catalog synchronization.
//!
//! Per account: fetch categories and live streams from the provider, upsert
//! them with derived fields (cleaned name, tags, PPV flags), deactivate
//! channels missing for five minutes, then recompute filter visibility.
//! Also hosts east/west channel-link auto-detection over the synced catalog.

use crate::database::catalog::{CategorySyncRecord, ChannelSyncRecord};
use crate::database::Database;
use crate::epg::ppv::is_ppv_category_name;
use crate::ingestor::XtreamClient;
use crate::models::*;
use crate::services::filtering::FilterService;
use crate::tagging::TagEngine;
use anyhow::Result;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Channels absent from the provider response for this long flip inactive.
const STALE_CUTOFF_MINUTES: i64 = 5;

/// Tag spellings marking east-coast feeds.
const EAST_TAGS: &[&str] = &["EAST", "E", "ET", "EST", "EASTERN"];

/// Tag spellings marking west-coast feeds.
const WEST_TAGS: &[&str] = &["WEST", "W", "PT", "PST", "PACIFIC", "WESTERN"];

/// West feeds trail east feeds by three hours.
const WEST_OFFSET_HOURS: i32 = -3;

#[derive(Clone)]
pub struct SyncService {
    db: Database,
    filters: FilterService,
}

impl SyncService {
    pub fn new(db: Database) -> Self {
        let filters = FilterService::new(db.clone());
        Self { db, filters }
    }

    /// Sync one account's catalog. A categories failure is recorded but does
    /// not stop channel sync; a channels failure aborts the account.
    pub async fn sync_account(&self, account_id: Uuid) -> Result<SyncStats> {
        let mut stats = SyncStats {
            account_id: Some(account_id),
            success: true,
            ..Default::default()
        };

        let Some(account) = self.db.get_account(account_id).await? else {
            stats.success = false;
            stats.errors.push("Account not found".to_string());
            return Ok(stats);
        };
        stats.account_name = account.name.clone();

        if !account.enabled {
            stats.success = false;
            stats.errors.push("Account is disabled".to_string());
            return Ok(stats);
        }

        info!("Starting sync for account {} ({})", account.name, account_id);
        let _guard = self.db.acquire_catalog_update_lock().await;

        let Some(credential) = self.db.primary_credential(&account).await? else {
            stats.success = false;
            stats.errors.push("Account has no usable credential".to_string());
            self.db.set_account_sync_outcome(account_id, "error").await?;
            return Ok(stats);
        };

        let client = XtreamClient::new(
            &account.server,
            credential.username(),
            credential.password(),
            &account.user_agent,
        )?;

        // Refresh provider-reported limits while we hold a live session
        if let LeasedCredential::Tracked(tracked) = &credential {
            match client.authenticate().await {
                Ok(auth) => {
                    if let Some(user_info) = auth.user_info {
                        self.db
                            .update_credential_auth_info(
                                tracked.id,
                                user_info.max_connections,
                                user_info.status.as_deref(),
                                user_info.exp_date.as_deref(),
                            )
                            .await?;
                    }
                }
                Err(e) => {
                    warn!("Auth refresh failed for account {}: {}", account.name, e);
                }
            }
        }

        let now = Utc::now();

        // Categories first; their ids resolve channel categories below
        match client.get_live_categories().await {
            Ok(categories) => {
                let records: Vec<CategorySyncRecord> = categories
                    .into_iter()
                    .filter_map(|c| {
                        let category_id = c.category_id?;
                        let category_name = c.category_name.unwrap_or_else(|| "Unknown".to_string());
                        Some(CategorySyncRecord {
                            is_ppv: is_ppv_category_name(&category_name),
                            category_id,
                            category_name,
                        })
                    })
                    .collect();

                let (added, updated) = self.db.apply_category_sync(account_id, &records, now).await?;
                stats.categories_added = added;
                stats.categories_updated = updated;
            }
            Err(e) => {
                error!("Error syncing categories for account {}: {}", account_id, e);
                stats.errors.push(format!("Categories sync error: {e}"));
            }
        }

        match client.get_live_streams().await {
            Ok(streams) => {
                let records = self.build_channel_records(account_id, streams).await?;
                let (added, updated) = self.db.apply_channel_sync(account_id, &records, now).await?;
                stats.channels_added = added;
                stats.channels_updated = updated;
            }
            Err(e) => {
                error!("Error syncing channels for account {}: {}", account_id, e);
                stats.errors.push(format!("Channels sync error: {e}"));
                stats.success = false;
            }
        }

        if stats.success {
            let cutoff = now - Duration::minutes(STALE_CUTOFF_MINUTES);
            stats.channels_deactivated =
                self.db.deactivate_unseen_channels(account_id, cutoff).await?;

            match self.filters.compute_visibility(account_id).await {
                Ok(visibility) => {
                    stats.channels_visible = visibility.channels_visible;
                    stats.channels_hidden = visibility.channels_hidden;
                }
                Err(e) => {
                    error!("Error computing filter visibility after sync: {}", e);
                    stats.errors.push(format!("Filter visibility error: {e}"));
                }
            }
        }

        self.db
            .set_account_sync_outcome(account_id, if stats.success { "success" } else { "error" })
            .await?;

        info!(
            "Sync completed for account {}: {} added, {} updated, {} deactivated",
            stats.account_name, stats.channels_added, stats.channels_updated, stats.channels_deactivated
        );
        Ok(stats)
    }

    /// Resolve provider streams into upsert records with derived fields.
    async fn build_channel_records(
        &self,
        account_id: Uuid,
        streams: Vec<crate::ingestor::xtream::XtreamStream>,
    ) -> Result<Vec<ChannelSyncRecord>> {
        let rules = self.db.rules_for_account(account_id).await?;
        let categories = self.db.category_lookup(account_id).await?;
        let mut engine = TagEngine::new();

        let mut records = Vec::with_capacity(streams.len());
        for stream in streams {
            let Some(stream_id) = stream.stream_id else {
                continue;
            };
            let name = stream.name.unwrap_or_else(|| "Unknown".to_string());

            let (category_id, category_name) = stream
                .category_id
                .as_deref()
                .and_then(|external| categories.get(external))
                .map(|(id, name)| (Some(*id), name.clone()))
                .unwrap_or((None, String::new()));

            let extraction = engine.extract(&name, &category_name, &rules);

            records.push(ChannelSyncRecord {
                stream_id,
                name,
                cleaned_name: extraction.cleaned_name,
                category_id,
                is_ppv: is_ppv_category_name(&category_name),
                stream_type: stream.stream_type,
                stream_icon: stream.stream_icon,
                epg_channel_id: stream.epg_channel_id,
                added: stream.added,
                custom_sid: stream.custom_sid,
                tv_archive: stream.tv_archive,
                direct_source: stream.direct_source,
                tv_archive_duration: stream.tv_archive_duration,
                tags: extraction.tags.into_iter().collect(),
            });
        }

        Ok(records)
    }

    /// Sync every enabled account, continuing past per-account failures.
    pub async fn sync_all_accounts(&self) -> Result<Vec<SyncStats>> {
        let accounts = self.db.list_enabled_accounts().await?;
        let mut results = Vec::with_capacity(accounts.len());

        for account in accounts {
            match self.sync_account(account.id).await {
                Ok(stats) => results.push(stats),
                Err(e) => {
                    error!("Fatal error syncing account {}: {}", account.name, e);
                    results.push(SyncStats {
                        success: false,
                        account_id: Some(account.id),
                        account_name: account.name,
                        errors: vec![format!("Fatal error: {e}")],
                        ..Default::default()
                    });
                }
            }
        }

        Ok(results)
    }

    /// Auto-detect east/west channel pairs by grouping on cleaned name.
    /// A lone untagged channel stands in for east when only west variants
    /// carry tags. Existing links are never duplicated.
    pub async fn detect_channel_links(&self, account_id: Option<Uuid>) -> Result<LinkDetectionStats> {
        let mut stats = LinkDetectionStats::default();

        let accounts = match account_id {
            Some(id) => match self.db.get_account(id).await? {
                Some(account) => vec![account],
                None => return Ok(stats),
            },
            None => self.db.list_accounts().await?,
        };

        for account in accounts {
            let channels = self.db.list_active_channels(account.id).await?;
            if channels.is_empty() {
                continue;
            }
            stats.channels_processed += channels.len() as u64;

            let stream_ids: Vec<String> = channels.iter().map(|c| c.stream_id.clone()).collect();
            let tag_map = self.db.channel_tag_map(account.id, &stream_ids).await?;

            // Group by lowercase cleaned name
            let mut grouped: HashMap<String, Vec<&Channel>> = HashMap::new();
            for channel in &channels {
                let base_name = channel
                    .cleaned_name
                    .as_deref()
                    .unwrap_or(&channel.name)
                    .trim()
                    .to_lowercase();
                if base_name.is_empty() {
                    continue;
                }
                grouped.entry(base_name).or_default().push(channel);
            }

            for group in grouped.values() {
                let mut east: Vec<&Channel> = Vec::new();
                let mut west: Vec<&Channel> = Vec::new();
                let mut untagged: Vec<&Channel> = Vec::new();

                for channel in group {
                    let tags: HashSet<String> = tag_map
                        .get(&channel.stream_id)
                        .map(|tags| tags.iter().map(|t| t.to_uppercase()).collect())
                        .unwrap_or_default();

                    if EAST_TAGS.iter().any(|t| tags.contains(*t)) {
                        east.push(channel);
                    } else if WEST_TAGS.iter().any(|t| tags.contains(*t)) {
                        west.push(channel);
                    } else {
                        untagged.push(channel);
                    }
                }

                // A lone untagged sibling acts as the east feed
                if east.is_empty() && !west.is_empty() && !untagged.is_empty() {
                    east = untagged;
                }

                if west.is_empty() || east.is_empty() {
                    continue;
                }

                let east_channel = east[0];
                for west_channel in &west {
                    let created = self
                        .db
                        .create_channel_link(
                            west_channel.id,
                            east_channel.id,
                            WEST_OFFSET_HOURS,
                            ChannelLinkType::TimeShifted,
                            true,
                        )
                        .await?;
                    if created {
                        stats.links_created += 1;
                        info!(
                            "Auto-detected link: {} -> {} ({}h)",
                            west_channel.name, east_channel.name, WEST_OFFSET_HOURS
                        );
                    } else {
                        stats.links_skipped += 1;
                    }
                }
            }
        }

        info!(
            "Channel link detection complete: {} created, {} skipped (existing)",
            stats.links_created, stats.links_skipped
        );
        Ok(stats)
    }
}
