//! Rule-driven EPG matching.
//!
//! For each visible, non-PPV channel the matcher walks the account's match
//! rules in priority order. Each rule carries prefilters (category regex,
//! country codes, required and excluded tags) and one match strategy, from
//! exact provider-id hits down to network fallbacks. Mapping writes commit
//! in bounded batches so partial progress survives interruption.

use crate::database::epg::MappingWrite;
use crate::database::Database;
use crate::epg::callsign::{base_callsign, extract_callsign};
use crate::epg::fcc::FccResolver;
use crate::epg::name_mapping::apply_name_mappings;
use crate::epg::ppv::is_ppv_category_name;
use crate::models::*;
use anyhow::Result;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Country tags recognized as country prefilters on match rules.
const COUNTRY_CODE_TAGS: &[&str] = &["US", "UK", "CA", "AU", "DE", "FR", "ES", "IT"];

/// Networks tried by the `network_fallback` strategy.
const FALLBACK_NETWORKS: &[&str] = &["ABC", "NBC", "CBS", "FOX", "PBS", "CW", "ION"];

/// Existing mappings at or above this confidence are left alone.
const REMATCH_CONFIDENCE_FLOOR: f64 = 0.85;

const DEFAULT_FUZZY_CONFIDENCE: f64 = 0.75;

/// Normalize a display name for index lookups: lowercase alphanumerics and
/// single spaces only.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = Regex::new(r"[^a-z0-9\s]").unwrap().replace_all(&lowered, "");
    let collapsed = Regex::new(r"\s+").unwrap().replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

/// Lookup indexes over one run's EPG channels.
struct EpgIndexes {
    channels: Vec<EpgChannel>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    by_callsign: HashMap<String, usize>,
}

impl EpgIndexes {
    fn build(channels: Vec<EpgChannel>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        let mut by_callsign = HashMap::new();

        for (index, channel) in channels.iter().enumerate() {
            by_id.entry(channel.channel_id.to_lowercase()).or_insert(index);

            for name in channel.display_names() {
                let normalized = normalize_name(&name);
                if !normalized.is_empty() {
                    by_name.entry(normalized).or_insert(index);
                }
            }

            if let Some(callsign) = extract_callsign(&channel.channel_id) {
                let upper = callsign.to_uppercase();
                by_callsign.entry(upper.clone()).or_insert(index);
                // Index the base form too, so FCC's KECI-TV can reach the
                // feed's KECI-DT
                let base = base_callsign(&upper);
                if base != upper {
                    by_callsign.entry(base).or_insert(index);
                }
            }
        }

        Self {
            channels,
            by_id,
            by_name,
            by_callsign,
        }
    }

    fn get(&self, index: usize) -> &EpgChannel {
        &self.channels[index]
    }
}

/// One channel's inputs to the rule pipeline.
struct MatchCandidate<'a> {
    channel: &'a Channel,
    category_name: &'a str,
    tags: &'a HashSet<String>,
    country_tags: HashSet<String>,
}

pub struct EpgMatcher {
    db: Database,
    fcc: Arc<FccResolver>,
}

impl EpgMatcher {
    pub fn new(db: Database, fcc: Arc<FccResolver>) -> Self {
        Self { db, fcc }
    }

    /// Match an account's channels against the EPG catalog, optionally
    /// restricted to one source. `batch_size` bounds mapping-write
    /// transactions.
    pub async fn match_account(
        &self,
        account_id: Uuid,
        source_id: Option<Uuid>,
        batch_size: usize,
        include_hidden: bool,
    ) -> Result<MatchStats> {
        let mut stats = MatchStats::default();

        let rules = self.db.epg_match_rules_for_account(account_id).await?;
        let exclusions = self.db.list_enabled_exclusion_patterns().await?;
        let name_mappings = self.db.list_enabled_name_mappings().await?;
        info!(
            "EPG matching: {} rules, {} exclusion patterns for account {}",
            rules.len(),
            exclusions.len(),
            account_id
        );

        let channels: Vec<(Channel, String)> = self
            .db
            .list_active_channels_with_category(account_id)
            .await?
            .into_iter()
            .filter(|(c, _)| include_hidden || c.is_visible)
            .collect();
        stats.total_channels = channels.len() as u64;

        let indexes = EpgIndexes::build(self.db.list_epg_channels(source_id).await?);
        info!(
            "EPG matching: {} channels against {} EPG channels",
            channels.len(),
            indexes.channels.len()
        );

        let channel_ids: Vec<Uuid> = channels.iter().map(|(c, _)| c.id).collect();
        let existing = self.db.mappings_for_channels(&channel_ids).await?;

        let stream_ids: Vec<String> = channels.iter().map(|(c, _)| c.stream_id.clone()).collect();
        let tag_map = self.db.channel_tag_map(account_id, &stream_ids).await?;

        let mut pending: Vec<MappingWrite> = Vec::new();
        let mut hide: Vec<(Uuid, bool)> = Vec::new();

        for (channel, category_name) in &channels {
            // PPV channels are event-scoped; their guide data would be
            // wrong more often than right
            if channel.is_ppv || is_ppv_category_name(category_name) {
                stats.excluded += 1;
                continue;
            }

            let tags: HashSet<String> = tag_map
                .get(&channel.stream_id)
                .map(|tags| tags.iter().map(|t| t.to_uppercase()).collect())
                .unwrap_or_default();

            if let Some(pattern) = self.excluded_by(channel, category_name, &tags, &exclusions) {
                stats.excluded += 1;
                if pattern.hide_channel {
                    hide.push((channel.id, false));
                    stats.hidden += 1;
                }
                continue;
            }

            if let Some(mapping) = existing.get(&channel.id) {
                if mapping.is_override || mapping.confidence >= REMATCH_CONFIDENCE_FLOOR {
                    stats.skipped_existing += 1;
                    continue;
                }
            }

            let country_tags = tags
                .iter()
                .filter(|t| COUNTRY_CODE_TAGS.contains(&t.as_str()))
                .cloned()
                .collect();
            let candidate = MatchCandidate {
                channel,
                category_name,
                tags: &tags,
                country_tags,
            };

            match self
                .match_channel(&candidate, &rules, &indexes, &name_mappings)
                .await?
            {
                Some((epg_index, confidence, match_type)) => {
                    stats.matched += 1;
                    *stats
                        .matches_by_type
                        .entry(match_type.as_str().to_string())
                        .or_insert(0) += 1;
                    pending.push(MappingWrite {
                        channel_id: channel.id,
                        epg_channel_id: indexes.get(epg_index).id,
                        mapping_type: match_type.as_str().to_string(),
                        confidence,
                    });
                }
                None => {
                    stats.unmatched += 1;
                }
            }

            if pending.len() >= batch_size {
                self.db.apply_mapping_batch(&pending).await?;
                pending.clear();
                debug!(
                    "EPG matching progress: {} matched, {} unmatched",
                    stats.matched, stats.unmatched
                );
            }
        }

        if !pending.is_empty() {
            self.db.apply_mapping_batch(&pending).await?;
        }
        if !hide.is_empty() {
            self.db.apply_visibility(&hide).await?;
        }

        info!(
            "EPG matching complete for account {}: matched={}, unmatched={}, excluded={}, skipped={}",
            account_id, stats.matched, stats.unmatched, stats.excluded, stats.skipped_existing
        );
        Ok(stats)
    }

    /// First exclusion pattern matching this channel, if any.
    fn excluded_by<'a>(
        &self,
        channel: &Channel,
        category_name: &str,
        tags: &HashSet<String>,
        patterns: &'a [EpgExclusionPattern],
    ) -> Option<&'a EpgExclusionPattern> {
        for pattern in patterns {
            let matched = match pattern.pattern_type {
                ExclusionPatternType::CategoryName => {
                    !category_name.is_empty() && text_matches(&pattern.pattern, pattern.is_regex, category_name)
                }
                ExclusionPatternType::ChannelName => {
                    text_matches(&pattern.pattern, pattern.is_regex, &channel.name)
                }
                ExclusionPatternType::Tag => tags.contains(&pattern.pattern.to_uppercase()),
            };
            if matched {
                debug!(
                    "Channel '{}' excluded by pattern '{}' (hide={})",
                    channel.name, pattern.name, pattern.hide_channel
                );
                return Some(pattern);
            }
        }
        None
    }

    /// Walk the rules in priority order; the first rule that produces a
    /// binding wins.
    async fn match_channel(
        &self,
        candidate: &MatchCandidate<'_>,
        rules: &[EpgMatchRule],
        indexes: &EpgIndexes,
        name_mappings: &[EpgChannelNameMapping],
    ) -> Result<Option<(usize, f64, EpgMatchType)>> {
        for rule in rules {
            if !self.rule_prefilters_pass(rule, candidate) {
                continue;
            }

            if let Some((index, confidence)) = self
                .apply_match_rule(rule, candidate, indexes, name_mappings)
                .await?
            {
                return Ok(Some((index, confidence, rule.match_type)));
            }
        }
        Ok(None)
    }

    fn rule_prefilters_pass(&self, rule: &EpgMatchRule, candidate: &MatchCandidate<'_>) -> bool {
        if let Some(pattern) = &rule.category_pattern {
            if !candidate.category_name.is_empty() {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(re) => {
                        if !re.is_match(candidate.category_name) {
                            return false;
                        }
                    }
                    Err(e) => {
                        warn!("Invalid category pattern in rule '{}': {}", rule.name, e);
                        return false;
                    }
                }
            }
        }

        if let Some(pattern) = &rule.category_exclude_pattern {
            if !candidate.category_name.is_empty() {
                if let Ok(re) = RegexBuilder::new(pattern).case_insensitive(true).build() {
                    if re.is_match(candidate.category_name) {
                        return false;
                    }
                }
            }
        }

        if let Some(countries) = rule.country_code_set() {
            let allowed: HashSet<String> = countries.iter().map(|c| c.to_uppercase()).collect();
            if candidate.country_tags.is_disjoint(&allowed) {
                return false;
            }
        }

        if let Some(required) = rule.required_tag_set() {
            if !required
                .iter()
                .all(|tag| candidate.tags.contains(&tag.to_uppercase()))
            {
                return false;
            }
        }

        if let Some(excluded) = rule.excluded_tag_set() {
            if excluded
                .iter()
                .any(|tag| candidate.tags.contains(&tag.to_uppercase()))
            {
                return false;
            }
        }

        true
    }

    async fn apply_match_rule(
        &self,
        rule: &EpgMatchRule,
        candidate: &MatchCandidate<'_>,
        indexes: &EpgIndexes,
        name_mappings: &[EpgChannelNameMapping],
    ) -> Result<Option<(usize, f64)>> {
        let channel = candidate.channel;

        let result = match rule.match_type {
            EpgMatchType::ProviderId => channel
                .epg_channel_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .and_then(|id| indexes.by_id.get(&id.to_lowercase()))
                .map(|index| (*index, 1.0)),

            EpgMatchType::CallsignTag => {
                let mut callsign_tags: Vec<&String> = candidate
                    .tags
                    .iter()
                    .filter(|t| t.len() >= 3 && t.starts_with(|c| c == 'K' || c == 'W'))
                    .collect();
                callsign_tags.sort();
                callsign_tags
                    .into_iter()
                    .find_map(|tag| indexes.by_callsign.get(tag.as_str()))
                    .map(|index| (*index, 0.95))
            }

            EpgMatchType::CallsignName => {
                let source = self.source_value(rule, candidate, name_mappings);
                source.and_then(|value| {
                    let upper = value.to_uppercase();
                    let re = Regex::new(r"\b([KW][A-Z]{2,3}(?:-[A-Z]{2,3})?)\b").unwrap();
                    re.captures(&upper)
                        .map(|captures| captures[1].replace('-', ""))
                        .and_then(|callsign| indexes.by_callsign.get(callsign.as_str()))
                        .map(|index| (*index, 0.9))
                })
            }

            EpgMatchType::FccLookup => {
                match self
                    .fcc
                    .lookup_callsign(&channel.name, candidate.tags)
                    .await?
                {
                    Some(callsign) => {
                        let upper = callsign.to_uppercase();
                        if let Some(index) = indexes.by_callsign.get(&upper) {
                            Some((*index, 0.85))
                        } else {
                            let base = base_callsign(&upper);
                            if base != upper {
                                indexes.by_callsign.get(&base).map(|index| (*index, 0.84))
                            } else {
                                None
                            }
                        }
                    }
                    None => None,
                }
            }

            EpgMatchType::ExactName => {
                let source = self.source_value(rule, candidate, name_mappings);
                source
                    .map(|value| normalize_name(&value))
                    .filter(|normalized| !normalized.is_empty())
                    .and_then(|normalized| indexes.by_name.get(&normalized))
                    .map(|index| (*index, 0.95))
            }

            EpgMatchType::FuzzyName => {
                let min_confidence = rule.min_confidence.unwrap_or(DEFAULT_FUZZY_CONFIDENCE);
                let source = self.source_value(rule, candidate, name_mappings);
                source
                    .map(|value| normalize_name(&value))
                    .filter(|normalized| !normalized.is_empty())
                    .and_then(|normalized| {
                        let mut best: Option<(usize, f64)> = None;
                        for (epg_name, index) in &indexes.by_name {
                            let score = strsim::normalized_levenshtein(&normalized, epg_name);
                            if score >= min_confidence
                                && best.map(|(_, b)| score > b).unwrap_or(true)
                            {
                                best = Some((*index, score));
                            }
                        }
                        best
                    })
            }

            EpgMatchType::Regex => {
                let Some(pattern) = &rule.pattern else {
                    return Ok(None);
                };
                let source = self.source_value(rule, candidate, name_mappings);
                match (source, RegexBuilder::new(pattern).case_insensitive(true).build()) {
                    (Some(value), Ok(re)) => re
                        .captures(&value)
                        .map(|captures| {
                            captures
                                .get(1)
                                .unwrap_or_else(|| captures.get(0).unwrap())
                                .as_str()
                                .to_lowercase()
                        })
                        .and_then(|id| indexes.by_id.get(&id))
                        .map(|index| (*index, 0.9)),
                    (_, Err(e)) => {
                        warn!("Invalid regex pattern in rule '{}': {}", rule.name, e);
                        None
                    }
                    _ => None,
                }
            }

            EpgMatchType::TagBased => {
                let Some(pattern) = &rule.pattern else {
                    return Ok(None);
                };
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(re) => {
                        let mut tags: Vec<&String> = candidate.tags.iter().collect();
                        tags.sort();
                        tags.into_iter()
                            .filter(|tag| re.is_match(tag))
                            .find_map(|tag| indexes.by_id.get(&tag.to_lowercase()))
                            .map(|index| (*index, 0.85))
                    }
                    Err(_) => None,
                }
            }

            EpgMatchType::CategoryPattern => {
                let Some(pattern) = &rule.pattern else {
                    return Ok(None);
                };
                if candidate.category_name.is_empty() {
                    return Ok(None);
                }
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(re) if re.is_match(candidate.category_name) => self
                        .source_value(rule, candidate, name_mappings)
                        .map(|value| normalize_name(&value))
                        .and_then(|normalized| indexes.by_name.get(&normalized))
                        .map(|index| (*index, 0.8)),
                    _ => None,
                }
            }

            EpgMatchType::NetworkFallback => {
                let mut networks: Vec<&str> = FALLBACK_NETWORKS
                    .iter()
                    .copied()
                    .filter(|n| candidate.tags.contains(*n))
                    .collect();
                networks.sort();
                networks.first().and_then(|network| {
                    let candidates = [
                        format!("{network}.us").to_lowercase(),
                        format!("{network}.us2").to_lowercase(),
                        network.to_lowercase(),
                    ];
                    candidates
                        .iter()
                        .find_map(|id| indexes.by_id.get(id))
                        .map(|index| (*index, 0.6))
                })
            }
        };

        Ok(result)
    }

    /// Resolve the rule's source field, applying channel-name mappings to
    /// name sources.
    fn source_value(
        &self,
        rule: &EpgMatchRule,
        candidate: &MatchCandidate<'_>,
        name_mappings: &[EpgChannelNameMapping],
    ) -> Option<String> {
        let channel = candidate.channel;
        match rule.source {
            EpgMatchSource::ChannelName => {
                let (mapped, _) = apply_name_mappings(&channel.name, name_mappings);
                Some(mapped)
            }
            EpgMatchSource::CleanedName => {
                let value = channel.cleaned_name.as_deref().unwrap_or(&channel.name);
                let (mapped, _) = apply_name_mappings(value, name_mappings);
                Some(mapped)
            }
            EpgMatchSource::CategoryName => {
                if candidate.category_name.is_empty() {
                    None
                } else {
                    Some(candidate.category_name.to_string())
                }
            }
            EpgMatchSource::EpgChannelId => channel.epg_channel_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_name_strips_punctuation() {
        assert_eq!(normalize_name("ESPN  HD!"), "espn hd");
        assert_eq!(normalize_name("A&E"), "ae");
        assert_eq!(normalize_name("  CNN "), "cnn");
    }

    fn epg_channel(channel_id: &str, display_name: &str) -> EpgChannel {
        use chrono::Utc;
        EpgChannel {
            id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            channel_id: channel_id.to_string(),
            display_name: display_name.to_string(),
            display_names_json: None,
            icon_url: None,
            url: None,
            program_count: 0,
            first_program: None,
            last_program: None,
            last_seen: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn indexes_cover_ids_names_and_callsigns() {
        let indexes = EpgIndexes::build(vec![
            epg_channel("KECI-DT.us_locals1", "KECI"),
            epg_channel("ESPN.us", "ESPN"),
        ]);

        assert!(indexes.by_id.contains_key("keci-dt.us_locals1"));
        assert!(indexes.by_name.contains_key("espn"));
        assert!(indexes.by_callsign.contains_key("KECI-DT"));
        // Base form indexed alongside the suffixed form
        assert!(indexes.by_callsign.contains_key("KECI"));
    }

    #[test]
    fn duplicate_display_names_keep_first_entry() {
        let first = epg_channel("one.us", "News Channel");
        let first_id = first.id;
        let indexes = EpgIndexes::build(vec![first, epg_channel("two.us", "News Channel")]);
        let index = indexes.by_name["news channel"];
        assert_eq!(indexes.get(index).id, first_id);
    }
}
