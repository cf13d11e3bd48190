//! FCC facility resolution.
//!
//! Maps a channel's detected network, channel number and location tags to a
//! station callsign using the imported FCC LMS dataset, driven by the
//! configurable pattern and strategy tables. Pattern sets and per-callsign
//! corrections are process-wide caches of plain value records; corrections
//! additionally expire after five minutes.

use crate::database::Database;
use crate::models::*;
use anyhow::Result;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Tags that are quality markers, never locations.
pub const QUALITY_TAGS: &[&str] = &["HD", "SD", "4K", "UHD", "FHD", "RAW", "60FPS"];

/// Tags that are country markers, never locations.
pub const COUNTRY_TAGS: &[&str] = &["US", "USA", "UK", "CA"];

/// Tags marking VOD/24-7 content that must not be FCC-enriched. "247" is
/// the normalized form of "24/7".
pub const VOD_EXCLUSION_TAGS: &[&str] = &["247", "VOD", "ON DEMAND", "MOVIES", "SERIES"];

const MAJOR_NETWORKS: &[&str] = &[
    "ABC", "NBC", "CBS", "FOX", "PBS", "CW", "ION", "UNIV", "TELE", "MNT", "MYNT", "IND",
    "INDEPENDENT", "UNIVISION", "TELEMUNDO",
];

const CORRECTIONS_TTL: Duration = Duration::from_secs(300);

const US_STATE_NAMES: &[(&str, &str)] = &[
    ("ALABAMA", "AL"),
    ("ALASKA", "AK"),
    ("ARIZONA", "AZ"),
    ("ARKANSAS", "AR"),
    ("CALIFORNIA", "CA"),
    ("COLORADO", "CO"),
    ("CONNECTICUT", "CT"),
    ("DELAWARE", "DE"),
    ("FLORIDA", "FL"),
    ("GEORGIA", "GA"),
    ("HAWAII", "HI"),
    ("IDAHO", "ID"),
    ("ILLINOIS", "IL"),
    ("INDIANA", "IN"),
    ("IOWA", "IA"),
    ("KANSAS", "KS"),
    ("KENTUCKY", "KY"),
    ("LOUISIANA", "LA"),
    ("MAINE", "ME"),
    ("MARYLAND", "MD"),
    ("MASSACHUSETTS", "MA"),
    ("MICHIGAN", "MI"),
    ("MINNESOTA", "MN"),
    ("MISSISSIPPI", "MS"),
    ("MISSOURI", "MO"),
    ("MONTANA", "MT"),
    ("NEBRASKA", "NE"),
    ("NEVADA", "NV"),
    ("NEW HAMPSHIRE", "NH"),
    ("NEW JERSEY", "NJ"),
    ("NEW MEXICO", "NM"),
    ("NEW YORK", "NY"),
    ("NORTH CAROLINA", "NC"),
    ("NORTH DAKOTA", "ND"),
    ("OHIO", "OH"),
    ("OKLAHOMA", "OK"),
    ("OREGON", "OR"),
    ("PENNSYLVANIA", "PA"),
    ("RHODE ISLAND", "RI"),
    ("SOUTH CAROLINA", "SC"),
    ("SOUTH DAKOTA", "SD"),
    ("TENNESSEE", "TN"),
    ("TEXAS", "TX"),
    ("UTAH", "UT"),
    ("VERMONT", "VT"),
    ("VIRGINIA", "VA"),
    ("WASHINGTON", "WA"),
    ("WEST VIRGINIA", "WV"),
    ("WISCONSIN", "WI"),
    ("WYOMING", "WY"),
];

const US_STATE_ABBREVS: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY", "DC", "PR", "VI", "GU",
];

fn state_abbrev_for_name(name: &str) -> Option<&'static str> {
    US_STATE_NAMES
        .iter()
        .find(|(full, _)| *full == name)
        .map(|(_, abbrev)| *abbrev)
}

fn is_state_abbrev(value: &str) -> bool {
    US_STATE_ABBREVS.contains(&value)
}

/// Extract the primary network from an FCC affiliation string. The raw
/// field carries subchannel clutter like `"5.1 FOX, 5.2 SSSEN"` or
/// `"FOX (25.1); Comet TV (25.2)"`.
pub fn normalize_network_affiliation(raw: &str) -> Option<String> {
    let network = raw.trim();
    if network.is_empty() {
        return None;
    }

    for major in MAJOR_NETWORKS {
        let pattern = format!(r"(?:^|\b)(?:\d+(?:\.\d+)?\s+)?({})\b", regex::escape(major));
        if let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() {
            if let Some(captures) = re.captures(network) {
                return Some(captures[1].to_uppercase());
            }
        }
    }

    // Strip parenthetical subchannel numbers, split on delimiters, take the
    // first part without a leading channel number
    let parens = Regex::new(r"\s*\([^)]*\)").unwrap();
    let cleaned = parens.replace_all(network, "").into_owned();
    let delimiters = Regex::new(r"[/;,&]+").unwrap();
    if let Some(first) = delimiters.split(&cleaned).next() {
        let leading_number = Regex::new(r"^\d+(?:\.\d+)?\s+").unwrap();
        let first = leading_number.replace(first.trim(), "").into_owned();
        if !first.is_empty() {
            return Some(first.to_uppercase());
        }
    }

    if network.len() <= 20 {
        return Some(network.to_uppercase());
    }

    None
}

/// Infer a network from a channel name. Used when the FCC record says
/// "Independent" (or carries no affiliation) but the name clearly names a
/// network, e.g. `"US: CW (KSTW)"`.
pub fn detect_network_from_name(channel_name: &str) -> Option<String> {
    if channel_name.is_empty() {
        return None;
    }

    let name_upper = channel_name.to_uppercase();
    let patterns: &[(&str, &str)] = &[
        (r"\bCW\b", "CW"),
        (r"\bABC\b", "ABC"),
        (r"\bNBC\b", "NBC"),
        (r"\bCBS\b", "CBS"),
        (r"\bFOX\b", "FOX"),
        (r"\bPBS\b", "PBS"),
        (r"\bION\b", "ION"),
        (r"\bMYNT\b", "MYNETWORK"),
        (r"\bMY\s*NETWORK", "MYNETWORK"),
        (r"\bUNIVISION\b", "UNIVISION"),
        (r"\bUNIV\b", "UNIVISION"),
        (r"\bTELEMUNDO\b", "TELEMUNDO"),
        (r"\bTELE\b", "TELEMUNDO"),
    ];

    for (pattern, network) in patterns {
        if Regex::new(pattern).unwrap().is_match(&name_upper) {
            return Some(network.to_string());
        }
    }
    None
}

/// Extract a station callsign from a channel name. Parenthesized callsigns
/// like `"US: NBC (WNBC)"` are the reliable form; bare in-name callsigns
/// need at least four letters.
pub fn extract_callsign_from_name(channel_name: &str) -> Option<String> {
    let name_upper = channel_name.to_uppercase();
    let callsign = r"[KW][A-Z]{2,4}(?:-(?:TV|DT|CD|HD|LP|LD|FM)\d?)?";
    let strip_suffix = Regex::new(r"-(?:TV|DT|CD|HD|LP|LD|FM)\d?$").unwrap();

    let paren = Regex::new(&format!(r"\(({callsign})(?:/[A-Z]{{3,5}})?\)")).unwrap();
    if let Some(captures) = paren.captures(&name_upper) {
        let stripped = strip_suffix.replace(&captures[1], "").into_owned();
        if stripped.len() >= 3 {
            return Some(stripped);
        }
    }

    let bare = Regex::new(&format!(r"\b({callsign})\b")).unwrap();
    for captures in bare.captures_iter(&name_upper) {
        let stripped = strip_suffix.replace(&captures[1], "").into_owned();
        if stripped.len() >= 4 {
            return Some(stripped);
        }
    }

    None
}

/// What FCC enrichment should attach.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentOptions {
    pub network_tags: bool,
    pub dma_tags: bool,
    pub state_tags: bool,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            network_tags: true,
            dma_tags: true,
            state_tags: true,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct PatternSet {
    networks: Vec<CachedFccNetwork>,
    channel_patterns: Vec<CachedChannelPattern>,
    location_patterns: Vec<CachedLocationPattern>,
    strategies: Vec<CachedFccStrategy>,
}

impl PatternSet {
    fn network_names(&self) -> HashSet<String> {
        self.networks.iter().map(|n| n.name.to_uppercase()).collect()
    }
}

/// Resolves callsigns against the FCC dataset and applies corrections.
pub struct FccResolver {
    db: Database,
    patterns: RwLock<Option<Arc<PatternSet>>>,
    corrections: RwLock<Option<(Arc<HashMap<String, CachedFccCorrection>>, Instant)>>,
}

impl FccResolver {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            patterns: RwLock::new(None),
            corrections: RwLock::new(None),
        }
    }

    /// Drop both caches. Called after any mutation of the pattern or
    /// correction tables.
    pub async fn invalidate(&self) {
        *self.patterns.write().await = None;
        *self.corrections.write().await = None;
    }

    async fn pattern_set(&self) -> Result<Arc<PatternSet>> {
        if let Some(patterns) = self.patterns.read().await.as_ref() {
            return Ok(patterns.clone());
        }

        let set = Arc::new(PatternSet {
            networks: self
                .db
                .list_fcc_networks()
                .await?
                .iter()
                .map(CachedFccNetwork::from)
                .collect(),
            channel_patterns: self
                .db
                .list_fcc_channel_patterns()
                .await?
                .iter()
                .map(CachedChannelPattern::from)
                .collect(),
            location_patterns: self
                .db
                .list_fcc_location_patterns()
                .await?
                .iter()
                .map(CachedLocationPattern::from)
                .collect(),
            strategies: self
                .db
                .list_fcc_strategies()
                .await?
                .iter()
                .map(CachedFccStrategy::from)
                .collect(),
        });

        *self.patterns.write().await = Some(set.clone());
        Ok(set)
    }

    async fn corrections(&self) -> Result<Arc<HashMap<String, CachedFccCorrection>>> {
        if let Some((corrections, loaded_at)) = self.corrections.read().await.as_ref() {
            if loaded_at.elapsed() < CORRECTIONS_TTL {
                return Ok(corrections.clone());
            }
        }

        let map: HashMap<String, CachedFccCorrection> = self
            .db
            .list_fcc_corrections()
            .await?
            .iter()
            .map(|c| (c.callsign.to_uppercase(), CachedFccCorrection::from(c)))
            .collect();
        let map = Arc::new(map);
        *self.corrections.write().await = Some((map.clone(), Instant::now()));
        debug!("Loaded {} FCC corrections into cache", map.len());
        Ok(map)
    }

    /// Overlay any per-callsign correction onto a facility record. Falls
    /// back to the base callsign when the exact one has no correction row.
    pub async fn apply_corrections(&self, facility: &mut FccFacility) -> Result<()> {
        let corrections = self.corrections().await?;
        let callsign_upper = facility.callsign.to_uppercase();

        let correction = corrections.get(&callsign_upper).or_else(|| {
            callsign_upper
                .split('-')
                .next()
                .and_then(|base| corrections.get(base))
        });

        if let Some(correction) = correction {
            if let Some(network) = &correction.network_affiliation {
                facility.network_affiliation = Some(network.clone());
            }
            if let Some(channel) = &correction.tv_virtual_channel {
                facility.tv_virtual_channel = Some(channel.clone());
            }
            if let Some(dma) = &correction.nielsen_dma {
                facility.nielsen_dma = Some(dma.clone());
            }
            if let Some(city) = &correction.community_city {
                facility.community_city = Some(city.clone());
            }
            if let Some(state) = &correction.community_state {
                facility.community_state = Some(state.clone());
            }
        }

        Ok(())
    }

    /// Detect the channel's network from its tags: direct name hit first,
    /// then each network's alternate tag patterns.
    pub async fn detect_network(&self, tags: &HashSet<String>) -> Result<Option<CachedFccNetwork>> {
        let patterns = self.pattern_set().await?;

        for network in &patterns.networks {
            if tags.contains(&network.name.to_uppercase()) {
                return Ok(Some(network.clone()));
            }
        }

        for network in &patterns.networks {
            if let Some(tag_patterns) = &network.tag_patterns {
                for pattern in tag_patterns {
                    if tags.contains(&pattern.to_uppercase()) {
                        return Ok(Some(network.clone()));
                    }
                }
            }
        }

        Ok(None)
    }

    fn extract_channel_number(
        patterns: &[CachedChannelPattern],
        name: &str,
        network: Option<&CachedFccNetwork>,
    ) -> Option<String> {
        if name.is_empty() {
            return None;
        }

        let network_name = network.map(|n| n.name.to_uppercase());

        for pattern in patterns {
            if let Some(networks) = &pattern.networks {
                let applies = network_name
                    .as_ref()
                    .map(|n| networks.iter().any(|p| p.to_uppercase() == *n))
                    .unwrap_or(false);
                if !applies {
                    continue;
                }
            }

            match RegexBuilder::new(&pattern.pattern).case_insensitive(true).build() {
                Ok(re) => {
                    if let Some(captures) = re.captures(name) {
                        if let Some(group) = captures.get(pattern.capture_group) {
                            return Some(group.as_str().to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!("Invalid channel pattern '{}': {}", pattern.name, e);
                }
            }
        }

        // Built-in fallbacks when no configured pattern matches
        let fallbacks = [
            r"\b(?:NBC|ABC|CBS|FOX|PBS|CW)\s*(\d{1,2})\b",
            r"\b(\d{1,2})\s*(?:NBC|ABC|CBS|FOX|HD|SD)\b",
            r"[\s:|]\s*(\d{1,2})\s*(?:HD|SD|\s|$|\[)",
        ];
        for fallback in fallbacks {
            let re = RegexBuilder::new(fallback).case_insensitive(true).build().unwrap();
            if let Some(captures) = re.captures(name) {
                return Some(captures[1].to_string());
            }
        }

        None
    }

    /// Split a location tag into (city, state). Handles `WICHITA_KS`, bare
    /// state names, two-letter abbreviations and hyphenated DMA names.
    fn parse_location_tag(
        patterns: &[CachedLocationPattern],
        location: &str,
    ) -> (Option<String>, Option<String>) {
        if location.is_empty() {
            return (None, None);
        }

        let upper = location.to_uppercase();

        for pattern in patterns {
            let re = match RegexBuilder::new(&pattern.pattern).case_insensitive(true).build() {
                Ok(re) => re,
                Err(e) => {
                    warn!("Invalid location pattern '{}': {}", pattern.name, e);
                    continue;
                }
            };
            let Some(captures) = re.captures(&upper) else {
                continue;
            };
            if captures.get(0).map(|m| m.start()) != Some(0) {
                continue;
            }

            let mut city = None;
            let mut state = None;
            if pattern.extract_city && pattern.city_group > 0 {
                city = captures
                    .get(pattern.city_group)
                    .map(|m| m.as_str().replace('_', " "));
            }
            if pattern.extract_state && pattern.state_group > 0 {
                state = captures.get(pattern.state_group).map(|m| {
                    let raw = m.as_str().to_uppercase().replace('_', " ");
                    state_abbrev_for_name(&raw)
                        .map(str::to_string)
                        .unwrap_or(raw)
                });
                state = state.filter(|s| s.len() == 2 && is_state_abbrev(s));
            }
            if city.is_some() || state.is_some() {
                return (city, state);
            }
        }

        // A full state name, underscores as spaces
        let spaced = upper.replace('_', " ");
        if let Some(abbrev) = state_abbrev_for_name(&spaced) {
            return (None, Some(abbrev.to_string()));
        }

        // A bare two-letter abbreviation
        if upper.len() == 2 && is_state_abbrev(&upper) {
            return (None, Some(upper));
        }

        // Trailing state abbreviation: WICHITA_KS, SPOKANE-WA
        let parts: Vec<&str> = upper.split(['-', '_']).collect();
        if parts.len() >= 2 {
            let last = parts[parts.len() - 1];
            if last.len() == 2 && is_state_abbrev(last) {
                let city = parts[..parts.len() - 1].join(" ");
                let city = if city.is_empty() { None } else { Some(city) };
                return (city, Some(last.to_string()));
            }
        }

        (Some(spaced), None)
    }

    /// Full FCC resolution for one channel: detect network, extract channel
    /// number and locations, then walk the configured strategies.
    pub async fn lookup_callsign(
        &self,
        channel_name: &str,
        tags: &HashSet<String>,
    ) -> Result<Option<String>> {
        let Some(network) = self.detect_network(tags).await? else {
            return Ok(None);
        };

        let patterns = self.pattern_set().await?;
        let channel_number =
            Self::extract_channel_number(&patterns.channel_patterns, channel_name, Some(&network));
        debug!(
            "FCC lookup for '{}': network={}, channel_number={:?}",
            channel_name, network.name, channel_number
        );

        // Location candidates: everything that is not a quality, country or
        // network tag
        let network_names = patterns.network_names();
        let potential_locations: Vec<&String> = tags
            .iter()
            .filter(|t| {
                t.len() >= 2
                    && !t.chars().all(|c| c.is_ascii_digit())
                    && !QUALITY_TAGS.contains(&t.as_str())
                    && !COUNTRY_TAGS.contains(&t.as_str())
                    && !network_names.contains(*t)
            })
            .collect();

        let mut state_abbrevs: HashSet<String> = HashSet::new();
        let mut city_locations: HashSet<String> = HashSet::new();
        let mut city_state_pairs: Vec<(String, String)> = Vec::new();

        for location in potential_locations {
            let (city, state) = Self::parse_location_tag(&patterns.location_patterns, location);
            if let Some(state) = &state {
                state_abbrevs.insert(state.clone());
            }
            if let Some(city) = &city {
                city_locations.insert(city.clone());
                if let Some(state) = &state {
                    city_state_pairs.push((city.clone(), state.clone()));
                }
            }

            // Hyphenated DMA names like CHICO-READING also contribute their
            // parts as city candidates
            if location.contains('-') {
                for part in location.split('-') {
                    let part = part.trim().replace('_', " ");
                    if part.len() >= 2 {
                        city_locations.insert(part);
                    }
                }
            }
        }

        debug!(
            "FCC lookup locations: states={:?}, cities={:?}, pairs={:?}",
            state_abbrevs, city_locations, city_state_pairs
        );

        self.apply_strategies(
            &network,
            channel_number.as_deref(),
            &state_abbrevs,
            &city_locations,
            &city_state_pairs,
            &patterns.strategies,
        )
        .await
    }

    async fn apply_strategies(
        &self,
        network: &CachedFccNetwork,
        channel_number: Option<&str>,
        state_abbrevs: &HashSet<String>,
        city_locations: &HashSet<String>,
        city_state_pairs: &[(String, String)],
        strategies: &[CachedFccStrategy],
    ) -> Result<Option<String>> {
        let pattern = &network.fcc_affiliation_pattern;

        for strategy in strategies {
            if strategy.require_channel_number && channel_number.is_none() {
                continue;
            }
            if strategy.require_state && state_abbrevs.is_empty() {
                continue;
            }
            if strategy.require_city && city_locations.is_empty() && city_state_pairs.is_empty() {
                continue;
            }

            let found = match strategy.strategy_type {
                FccStrategyType::CityStateChannel => {
                    let Some(channel) = channel_number else { continue };
                    let mut result = None;
                    for (city, state) in city_state_pairs {
                        result = self
                            .db
                            .fcc_facility_by_city_state_channel(pattern, city, state, channel)
                            .await?;
                        if result.is_some() {
                            break;
                        }
                    }
                    result
                }
                FccStrategyType::StateChannel => {
                    let Some(channel) = channel_number else { continue };
                    let mut result = None;
                    for state in state_abbrevs {
                        result = self
                            .db
                            .fcc_facility_by_state_channel(pattern, state, channel)
                            .await?;
                        if result.is_some() {
                            break;
                        }
                    }
                    result
                }
                FccStrategyType::CityDmaChannel => {
                    let Some(channel) = channel_number else { continue };
                    let mut result = None;
                    for city in city_locations {
                        result = self
                            .db
                            .fcc_facility_by_city_dma(
                                pattern,
                                city,
                                strategy.match_community_city,
                                strategy.match_nielsen_dma,
                                Some(channel),
                            )
                            .await?;
                        if result.is_some() {
                            break;
                        }
                    }
                    result
                }
                FccStrategyType::StateOnly => {
                    let mut result = None;
                    for state in state_abbrevs {
                        // Prefer a channel-number-refined match when possible
                        if let Some(channel) = channel_number {
                            result = self
                                .db
                                .fcc_facility_by_state(pattern, state, Some(channel))
                                .await?;
                            if result.is_some() {
                                break;
                            }
                        }
                        result = self.db.fcc_facility_by_state(pattern, state, None).await?;
                        if result.is_some() {
                            break;
                        }
                    }
                    result
                }
                FccStrategyType::CityDmaOnly => {
                    let mut result = None;
                    for city in city_locations {
                        if let Some(channel) = channel_number {
                            result = self
                                .db
                                .fcc_facility_by_city_dma(
                                    pattern,
                                    city,
                                    strategy.match_community_city,
                                    strategy.match_nielsen_dma,
                                    Some(channel),
                                )
                                .await?;
                            if result.is_some() {
                                break;
                            }
                        }
                        result = self
                            .db
                            .fcc_facility_by_city_dma(
                                pattern,
                                city,
                                strategy.match_community_city,
                                strategy.match_nielsen_dma,
                                None,
                            )
                            .await?;
                        if result.is_some() {
                            break;
                        }
                    }
                    result
                }
            };

            if let Some(mut facility) = found {
                self.apply_corrections(&mut facility).await?;
                debug!("FCC match (strategy: {}): {}", strategy.name, facility.callsign);
                return Ok(Some(facility.callsign));
            }
        }

        Ok(None)
    }

    /// Enrich US-tagged channels with NETWORK/DMA/STATE tags from the FCC
    /// dataset, keyed off callsigns embedded in channel names. VOD-style
    /// channels are skipped.
    pub async fn enrich_account(
        &self,
        account_id: Uuid,
        options: EnrichmentOptions,
    ) -> Result<EnrichmentStats> {
        let mut stats = EnrichmentStats::default();

        let us_streams: HashSet<String> = self
            .db
            .stream_ids_with_tag(account_id, "US")
            .await?
            .into_iter()
            .collect();
        if us_streams.is_empty() {
            return Ok(stats);
        }

        let mut excluded: HashSet<String> = HashSet::new();
        for vod_tag in VOD_EXCLUSION_TAGS {
            excluded.extend(self.db.stream_ids_with_tag(account_id, vod_tag).await?);
        }

        for channel in self.db.list_channels(account_id).await? {
            if !us_streams.contains(&channel.stream_id) || excluded.contains(&channel.stream_id) {
                continue;
            }

            let Some(callsign) = extract_callsign_from_name(&channel.name) else {
                continue;
            };
            let Some(mut facility) = self.db.fcc_facility_by_callsign(&callsign).await? else {
                continue;
            };

            // The extracted callsign must agree with the registered one
            let fcc_base = facility.callsign.split('-').next().unwrap_or("");
            if !fcc_base.starts_with(&callsign) && callsign != fcc_base {
                continue;
            }

            self.apply_corrections(&mut facility).await?;
            stats.channels_matched += 1;

            let mut tags_to_add = Vec::new();
            if options.network_tags {
                let mut network = facility
                    .network_affiliation
                    .as_deref()
                    .and_then(normalize_network_affiliation);
                if matches!(network.as_deref(), Some("INDEPENDENT") | Some("IND") | None) {
                    if let Some(detected) = detect_network_from_name(&channel.name) {
                        network = Some(detected);
                    }
                }
                if let Some(network) = network {
                    tags_to_add.push(format!("NETWORK:{network}"));
                }
            }
            if options.dma_tags {
                if let Some(dma) = &facility.nielsen_dma {
                    tags_to_add.push(format!("DMA:{}", dma.to_uppercase()));
                }
            }
            if options.state_tags {
                if let Some(state) = &facility.community_state {
                    tags_to_add.push(format!("STATE:{}", state.to_uppercase()));
                }
            }

            for tag_name in tags_to_add {
                match self
                    .db
                    .add_channel_tag(account_id, &channel.stream_id, &tag_name, TagSource::Enrichment)
                    .await
                {
                    Ok(true) => stats.channel_tags_added += 1,
                    Ok(false) => {}
                    Err(e) => stats
                        .errors
                        .push(format!("Error tagging channel {}: {}", channel.name, e)),
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_complex_affiliations() {
        assert_eq!(normalize_network_affiliation("ABC").as_deref(), Some("ABC"));
        assert_eq!(normalize_network_affiliation("Fox").as_deref(), Some("FOX"));
        assert_eq!(normalize_network_affiliation("FOX/COZI-TV").as_deref(), Some("FOX"));
        assert_eq!(
            normalize_network_affiliation("5.1 FOX, 5.2 SSSEN, 5.3 Court TV Mystery").as_deref(),
            Some("FOX")
        );
        assert_eq!(
            normalize_network_affiliation("FOX (25.1); Comet TV (25.2) & Laff TV (25.3)").as_deref(),
            Some("FOX")
        );
        assert_eq!(
            normalize_network_affiliation("Independent").as_deref(),
            Some("INDEPENDENT")
        );
        assert_eq!(normalize_network_affiliation(""), None);
    }

    #[test]
    fn infers_network_from_channel_names() {
        assert_eq!(detect_network_from_name("US: CW (KSTW)").as_deref(), Some("CW"));
        assert_eq!(detect_network_from_name("NBC 13 HD").as_deref(), Some("NBC"));
        assert_eq!(detect_network_from_name("My Network TV").as_deref(), Some("MYNETWORK"));
        assert_eq!(detect_network_from_name("Random Channel"), None);
    }

    #[test]
    fn extracts_parenthesized_callsigns() {
        assert_eq!(extract_callsign_from_name("US: NBC (WNBC)").as_deref(), Some("WNBC"));
        assert_eq!(
            extract_callsign_from_name("US: ABC 7 (KABC-TV) Los Angeles").as_deref(),
            Some("KABC")
        );
        assert_eq!(extract_callsign_from_name("US: CBS (WSVF-CD2)").as_deref(), Some("WSVF"));
        assert_eq!(extract_callsign_from_name("ESPN"), None);
    }

    #[test]
    fn parses_location_tags() {
        let no_patterns: Vec<CachedLocationPattern> = Vec::new();
        assert_eq!(
            FccResolver::parse_location_tag(&no_patterns, "WICHITA_KS"),
            (Some("WICHITA".to_string()), Some("KS".to_string()))
        );
        assert_eq!(
            FccResolver::parse_location_tag(&no_patterns, "MONTANA"),
            (None, Some("MT".to_string()))
        );
        assert_eq!(
            FccResolver::parse_location_tag(&no_patterns, "NY"),
            (None, Some("NY".to_string()))
        );
        assert_eq!(
            FccResolver::parse_location_tag(&no_patterns, "BINGHAMTON"),
            (Some("BINGHAMTON".to_string()), None)
        );
        assert_eq!(
            FccResolver::parse_location_tag(&no_patterns, "NEW_YORK"),
            (None, Some("NY".to_string()))
        );
    }

    #[test]
    fn extracts_channel_numbers_with_fallbacks() {
        let no_patterns: Vec<CachedChannelPattern> = Vec::new();
        assert_eq!(
            FccResolver::extract_channel_number(&no_patterns, "US: NBC 13 HD [MONTANA]", None)
                .as_deref(),
            Some("13")
        );
        assert_eq!(
            FccResolver::extract_channel_number(&no_patterns, "ABC 7 News", None).as_deref(),
            Some("7")
        );
        assert_eq!(
            FccResolver::extract_channel_number(&no_patterns, "Plain Channel", None),
            None
        );
    }
}
