use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub mod connection;
pub mod epg;
pub mod fcc;
pub mod health;

pub use connection::*;
pub use epg::*;
pub use fcc::*;
pub use health::*;

/// A provider identity. Owns credentials, filters and ruleset assignments.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub server: String,
    /// Legacy single-credential fields, used when no credential rows exist
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: String,
    pub enabled: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_sync_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A (username, password) pair under an account, with the provider-reported
/// connection cap and the advisory live count.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub account_id: Uuid,
    pub username: String,
    pub password: String,
    pub max_connections: i32,
    /// Advisory; the truth is COUNT(active_streams WHERE credential_id = id)
    pub active_connections: i32,
    pub status: Option<String>,
    pub exp_date: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_available(&self) -> bool {
        self.enabled && self.active_connections < self.max_connections.max(1)
    }
}

/// The credential an operation runs under: a tracked row, or the account's
/// legacy username/password pair for accounts predating credential rows.
#[derive(Debug, Clone)]
pub enum LeasedCredential {
    Tracked(Credential),
    Legacy { username: String, password: String },
}

impl LeasedCredential {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Self::Tracked(c) => Some(c.id),
            Self::Legacy { .. } => None,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Self::Tracked(c) => &c.username,
            Self::Legacy { username, .. } => username,
        }
    }

    pub fn password(&self) -> &str {
        match self {
            Self::Tracked(c) => &c.password,
            Self::Legacy { password, .. } => password,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub account_id: Uuid,
    /// External category id from the provider
    pub category_id: String,
    pub category_name: String,
    pub is_ppv: bool,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Channel {
    pub id: Uuid,
    pub account_id: Uuid,
    /// External stream id from the provider
    pub stream_id: String,
    pub name: String,
    /// Derived by the account's tag rules at sync time
    pub cleaned_name: Option<String>,
    pub category_id: Option<Uuid>,
    pub stream_type: Option<String>,
    pub stream_icon: Option<String>,
    pub epg_channel_id: Option<String>,
    pub added: Option<String>,
    pub custom_sid: Option<String>,
    pub tv_archive: Option<i32>,
    pub direct_source: Option<String>,
    pub tv_archive_duration: Option<i32>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    /// Pre-computed filter result
    pub is_visible: bool,
    pub is_ppv: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A globally-unique normalized tag, created lazily on first use.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Where a channel tag came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    Extraction,
    Enrichment,
    Manual,
    Sync,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelTag {
    pub id: Uuid,
    pub account_id: Uuid,
    pub stream_id: String,
    pub tag_id: Uuid,
    pub source: TagSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RuleSet {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Default rulesets apply to accounts with no explicit assignment
    pub is_default: bool,
    pub enabled: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Prefix,
    Suffix,
    Contains,
    Regex,
}

/// Which inputs a tag rule searches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    ChannelName,
    CategoryName,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TagRule {
    pub id: Uuid,
    pub ruleset_id: Uuid,
    pub name: String,
    pub pattern: String,
    pub pattern_kind: PatternKind,
    /// Literal tag, or one of the `__LOCATION__` / `__CALLSIGN__` /
    /// `__CLEANUP__` sentinels
    pub tag_name: String,
    pub source: RuleSource,
    pub remove_from_name: bool,
    /// Substituted for the matched text instead of plain removal
    pub replacement: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Category,
    ChannelName,
    Regex,
    Tag,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Whitelist,
    Blacklist,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Filter {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub filter_kind: FilterKind,
    pub filter_action: FilterAction,
    pub filter_value: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Process-wide key/value store for sync markers and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncMetadata {
    pub key: String,
    pub value: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// Request DTOs

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCreateRequest {
    pub name: String,
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialCreateRequest {
    pub account_id: Uuid,
    pub username: String,
    pub password: String,
    pub max_connections: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCreateRequest {
    pub account_id: Uuid,
    pub name: String,
    pub filter_kind: FilterKind,
    pub filter_action: FilterAction,
    pub filter_value: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRuleCreateRequest {
    pub ruleset_id: Uuid,
    pub name: String,
    pub pattern: String,
    pub pattern_kind: PatternKind,
    pub tag_name: String,
    pub source: RuleSource,
    pub remove_from_name: bool,
    pub replacement: Option<String>,
    pub priority: i32,
    pub enabled: bool,
}

// Stats objects returned by the services

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    pub success: bool,
    pub account_id: Option<Uuid>,
    pub account_name: String,
    pub categories_added: u64,
    pub categories_updated: u64,
    pub channels_added: u64,
    pub channels_updated: u64,
    pub channels_deactivated: u64,
    pub channels_visible: u64,
    pub channels_hidden: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisibilityStats {
    pub channels_processed: u64,
    pub channels_visible: u64,
    pub channels_hidden: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkDetectionStats {
    pub channels_processed: u64,
    pub links_created: u64,
    pub links_skipped: u64,
    pub errors: Vec<String>,
}

/// Exportable JSON form of a ruleset, used by export/import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetDocument {
    pub version: u32,
    pub kind: String,
    pub ruleset: RuleSetExport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetExport {
    pub name: String,
    pub description: Option<String>,
    pub rules: Vec<TagRuleExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRuleExport {
    pub name: String,
    pub pattern: String,
    pub pattern_kind: PatternKind,
    pub tag_name: String,
    pub source: RuleSource,
    pub remove_from_name: bool,
    pub replacement: Option<String>,
    pub priority: i32,
}
