//! Filter evaluation.
//!
//! Computes `is_visible` for every active channel of an account from its
//! whitelist/blacklist filters. Whitelists of the same kind OR together,
//! whitelist kinds AND together, and any blacklist hit hides the channel.

use crate::database::Database;
use crate::models::*;
use anyhow::Result;
use regex::RegexBuilder;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct FilterService {
    db: Database,
}

impl FilterService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Recompute and store visibility for all active channels of an account.
    /// Called after sync, filter CRUD, ruleset reassignment and tag
    /// enrichment.
    pub async fn compute_visibility(&self, account_id: Uuid) -> Result<VisibilityStats> {
        let mut stats = VisibilityStats::default();

        let channels = self.db.list_active_channels_with_category(account_id).await?;
        let filters = self.db.list_enabled_filters(account_id).await?;

        if filters.is_empty() {
            let count = self.db.set_all_active_channels_visible(account_id).await?;
            stats.channels_processed = channels.len() as u64;
            stats.channels_visible = channels.len() as u64;
            info!(
                "No filters for account {}, all {} channels visible",
                account_id, count
            );
            return Ok(stats);
        }

        // Tags are only needed when a tag filter exists
        let has_tag_filters = filters.iter().any(|f| f.filter_kind == FilterKind::Tag);
        let tag_map = if has_tag_filters {
            let stream_ids: Vec<String> =
                channels.iter().map(|(c, _)| c.stream_id.clone()).collect();
            self.db.channel_tag_map(account_id, &stream_ids).await?
        } else {
            HashMap::new()
        };

        let mut changes = Vec::new();
        for (channel, category_name) in &channels {
            let tags = tag_map
                .get(&channel.stream_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let visible = channel_passes_filters(channel, category_name, tags, &filters);

            stats.channels_processed += 1;
            if visible {
                stats.channels_visible += 1;
            } else {
                stats.channels_hidden += 1;
            }

            if channel.is_visible != visible {
                changes.push((channel.id, visible));
            }
        }

        self.db.apply_visibility(&changes).await?;

        info!(
            "Filter visibility computed for account {}: {} visible, {} hidden",
            account_id, stats.channels_visible, stats.channels_hidden
        );
        Ok(stats)
    }
}

/// Whether a channel passes the composition of the account's filters.
pub fn channel_passes_filters(
    channel: &Channel,
    category_name: &str,
    tags: &[String],
    filters: &[Filter],
) -> bool {
    let mut whitelists: HashMap<FilterKind, Vec<&Filter>> = HashMap::new();
    let mut blacklists: Vec<&Filter> = Vec::new();

    for filter in filters {
        match filter.filter_action {
            FilterAction::Whitelist => {
                whitelists.entry(filter.filter_kind).or_default().push(filter)
            }
            FilterAction::Blacklist => blacklists.push(filter),
        }
    }

    // Any blacklist hit hides the channel
    for filter in &blacklists {
        if filter_matches(filter, channel, category_name, tags) {
            return false;
        }
    }

    // For each kind with whitelists, at least one must match
    for kind_filters in whitelists.values() {
        let matches_any = kind_filters
            .iter()
            .any(|filter| filter_matches(filter, channel, category_name, tags));
        if !matches_any {
            return false;
        }
    }

    true
}

fn filter_matches(filter: &Filter, channel: &Channel, category_name: &str, tags: &[String]) -> bool {
    match filter.filter_kind {
        FilterKind::Category => category_name
            .to_lowercase()
            .contains(&filter.filter_value.to_lowercase()),
        FilterKind::ChannelName => channel
            .name
            .to_lowercase()
            .contains(&filter.filter_value.to_lowercase()),
        FilterKind::Regex => {
            match RegexBuilder::new(&filter.filter_value)
                .case_insensitive(true)
                .build()
            {
                Ok(re) => re.is_match(&channel.name),
                Err(e) => {
                    warn!("Invalid regex pattern in filter {}: {}", filter.id, e);
                    false
                }
            }
        }
        FilterKind::Tag => tags
            .iter()
            .any(|tag| tag.eq_ignore_ascii_case(&filter.filter_value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn channel(name: &str) -> Channel {
        let now = Utc::now();
        Channel {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            stream_id: "1".to_string(),
            name: name.to_string(),
            cleaned_name: None,
            category_id: None,
            stream_type: None,
            stream_icon: None,
            epg_channel_id: None,
            added: None,
            custom_sid: None,
            tv_archive: None,
            direct_source: None,
            tv_archive_duration: None,
            last_seen: now,
            is_active: true,
            is_visible: true,
            is_ppv: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn filter(kind: FilterKind, action: FilterAction, value: &str) -> Filter {
        let now = Utc::now();
        Filter {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            name: value.to_string(),
            filter_kind: kind,
            filter_action: action,
            filter_value: value.to_string(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn whitelists_of_same_kind_or_together() {
        let filters = vec![
            filter(FilterKind::Category, FilterAction::Whitelist, "Sports"),
            filter(FilterKind::Category, FilterAction::Whitelist, "News"),
            filter(FilterKind::ChannelName, FilterAction::Blacklist, "Test"),
        ];

        assert!(channel_passes_filters(&channel("ESPN"), "Sports", &[], &filters));
        assert!(channel_passes_filters(&channel("CNN"), "News", &[], &filters));
        assert!(!channel_passes_filters(&channel("HBO"), "Movies", &[], &filters));
        assert!(!channel_passes_filters(&channel("Test Channel"), "Sports", &[], &filters));
    }

    #[test]
    fn whitelist_kinds_and_together() {
        let filters = vec![
            filter(FilterKind::Category, FilterAction::Whitelist, "Sports"),
            filter(FilterKind::Tag, FilterAction::Whitelist, "US"),
        ];

        let us = vec!["US".to_string()];
        assert!(channel_passes_filters(&channel("ESPN"), "Sports", &us, &filters));
        assert!(!channel_passes_filters(&channel("ESPN"), "Sports", &[], &filters));
        assert!(!channel_passes_filters(&channel("ESPN"), "Movies", &us, &filters));
    }

    #[test]
    fn no_filters_means_visible() {
        assert!(channel_passes_filters(&channel("Anything"), "Whatever", &[], &[]));
    }

    #[test]
    fn invalid_regex_matches_nothing() {
        let whitelist = vec![filter(FilterKind::Regex, FilterAction::Whitelist, "[broken")];
        assert!(!channel_passes_filters(&channel("ESPN"), "Sports", &[], &whitelist));

        // As a blacklist it hides nothing
        let blacklist = vec![filter(FilterKind::Regex, FilterAction::Blacklist, "[broken")];
        assert!(channel_passes_filters(&channel("ESPN"), "Sports", &[], &blacklist));
    }

    #[test]
    fn tag_filter_is_case_insensitive_equality() {
        let filters = vec![filter(FilterKind::Tag, FilterAction::Whitelist, "us")];
        let tags = vec!["US".to_string()];
        assert!(channel_passes_filters(&channel("ESPN"), "", &tags, &filters));

        let partial = vec!["USA".to_string()];
        assert!(!channel_passes_filters(&channel("ESPN"), "", &partial, &filters));
    }
}
