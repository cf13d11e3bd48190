use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EpgSourceType {
    /// XMLTV fetched from the account's Xtream `xmltv.php` endpoint
    Provider,
    /// XMLTV fetched from an arbitrary URL
    XmltvUrl,
    /// Schedules Direct, synced by an external collaborator
    SchedulesDirect,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EpgSource {
    pub id: Uuid,
    pub name: String,
    pub source_type: EpgSourceType,
    pub account_id: Option<Uuid>,
    pub url: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_sync_status: Option<String>,
    pub last_sync_message: Option<String>,
    pub channel_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EpgChannel {
    pub id: Uuid,
    pub source_id: Uuid,
    /// Provider-issued channel id, e.g. `KECI-DT.us_locals1`
    pub channel_id: String,
    pub display_name: String,
    /// JSON array of every display-name seen for this channel
    pub display_names_json: Option<String>,
    pub icon_url: Option<String>,
    pub url: Option<String>,
    pub program_count: i64,
    pub first_program: Option<DateTime<Utc>>,
    pub last_program: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EpgChannel {
    /// All display names, primary first.
    pub fn display_names(&self) -> Vec<String> {
        let mut names = vec![self.display_name.clone()];
        if let Some(json) = &self.display_names_json {
            if let Ok(extra) = serde_json::from_str::<Vec<String>>(json) {
                for name in extra {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }
}

/// A channel parsed from one XMLTV feed, ready to upsert.
#[derive(Debug, Clone, Default)]
pub struct EpgChannelUpsert {
    pub channel_id: String,
    pub display_name: String,
    pub display_names: Vec<String>,
    pub icon_url: Option<String>,
    pub url: Option<String>,
    pub program_count: i64,
    pub first_program: Option<DateTime<Utc>>,
    pub last_program: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelEpgMapping {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub epg_channel_id: Uuid,
    pub mapping_type: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Manual mappings are never overwritten by rematching
    pub is_override: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EpgMatchRuleSet {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub enabled: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EpgMatchType {
    ProviderId,
    CallsignTag,
    CallsignName,
    FccLookup,
    ExactName,
    FuzzyName,
    Regex,
    TagBased,
    CategoryPattern,
    NetworkFallback,
}

impl EpgMatchType {
    /// Stable snake_case name, persisted as the mapping type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderId => "provider_id",
            Self::CallsignTag => "callsign_tag",
            Self::CallsignName => "callsign_name",
            Self::FccLookup => "fcc_lookup",
            Self::ExactName => "exact_name",
            Self::FuzzyName => "fuzzy_name",
            Self::Regex => "regex",
            Self::TagBased => "tag_based",
            Self::CategoryPattern => "category_pattern",
            Self::NetworkFallback => "network_fallback",
        }
    }
}

/// Which channel field feeds name-oriented match types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EpgMatchSource {
    ChannelName,
    CleanedName,
    CategoryName,
    EpgChannelId,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EpgMatchRule {
    pub id: Uuid,
    pub ruleset_id: Uuid,
    pub name: String,
    pub match_type: EpgMatchType,
    pub source: EpgMatchSource,
    pub pattern: Option<String>,
    pub category_pattern: Option<String>,
    pub category_exclude_pattern: Option<String>,
    /// JSON array; rule applies only when the channel carries one of these
    /// country tags
    pub country_codes: Option<String>,
    /// JSON array; all must be present on the channel
    pub required_tags: Option<String>,
    /// JSON array; none may be present on the channel
    pub excluded_tags: Option<String>,
    pub min_confidence: Option<f64>,
    pub stop_on_match: bool,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EpgMatchRule {
    fn parse_json_set(value: &Option<String>) -> Option<Vec<String>> {
        value
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
    }

    pub fn country_code_set(&self) -> Option<Vec<String>> {
        Self::parse_json_set(&self.country_codes)
    }

    pub fn required_tag_set(&self) -> Option<Vec<String>> {
        Self::parse_json_set(&self.required_tags)
    }

    pub fn excluded_tag_set(&self) -> Option<Vec<String>> {
        Self::parse_json_set(&self.excluded_tags)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExclusionPatternType {
    CategoryName,
    ChannelName,
    Tag,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EpgExclusionPattern {
    pub id: Uuid,
    pub name: String,
    pub pattern_type: ExclusionPatternType,
    pub pattern: String,
    pub is_regex: bool,
    /// When set, an excluded channel is also made invisible
    pub hide_channel: bool,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NameMappingMatchType {
    Exact,
    Contains,
    Prefix,
    Suffix,
    Regex,
}

/// Translates rebranded channel names whose playlist form lags EPG data.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EpgChannelNameMapping {
    pub id: Uuid,
    pub name: String,
    pub old_name: String,
    pub new_name: String,
    pub match_type: NameMappingMatchType,
    pub case_sensitive: bool,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelLinkType {
    TimeShifted,
    Simulcast,
    HdSdPair,
}

/// Asymmetric channel-to-channel link: the first channel takes its EPG from
/// the second, shifted by `time_offset_hours`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelLink {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub source_channel_id: Uuid,
    pub time_offset_hours: i32,
    pub link_type: ChannelLinkType,
    pub auto_detected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpgSyncStats {
    pub channels_added: u64,
    pub channels_updated: u64,
    pub channels_removed: u64,
    pub total_programs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchStats {
    pub total_channels: u64,
    pub excluded: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub skipped_existing: u64,
    pub matches_by_type: std::collections::HashMap<String, u64>,
    pub hidden: u64,
}
