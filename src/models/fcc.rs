use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One licensed US broadcast facility from the FCC LMS database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FccFacility {
    pub id: Uuid,
    pub facility_id: Option<i64>,
    pub callsign: String,
    pub service_code: Option<String>,
    pub station_type: Option<String>,
    pub community_city: Option<String>,
    pub community_state: Option<String>,
    pub channel: Option<String>,
    pub tv_virtual_channel: Option<String>,
    /// Normalized primary network (see affiliation normalization)
    pub network_affiliation: Option<String>,
    pub nielsen_dma: Option<String>,
    pub nielsen_dma_rank: Option<i64>,
    pub active: bool,
    pub facility_status: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parsed facility record before persistence, produced by the
/// `facility.dat` parser.
#[derive(Debug, Clone, PartialEq)]
pub struct FccFacilityRecord {
    pub facility_id: Option<i64>,
    pub callsign: String,
    pub service_code: String,
    pub station_type: Option<String>,
    pub community_city: Option<String>,
    pub community_state: Option<String>,
    pub channel: Option<String>,
    pub tv_virtual_channel: Option<String>,
    pub network_affiliation: Option<String>,
    pub nielsen_dma: Option<String>,
    pub active: bool,
    pub facility_status: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Per-callsign field overrides applied to facility reads.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FccCorrection {
    pub id: Uuid,
    pub callsign: String,
    pub facility_id: Option<i64>,
    pub network_affiliation: Option<String>,
    pub tv_virtual_channel: Option<String>,
    pub nielsen_dma: Option<String>,
    pub community_city: Option<String>,
    pub community_state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FccMatchNetwork {
    pub id: Uuid,
    pub name: String,
    /// SQL LIKE pattern against `fcc_facilities.network_affiliation`
    pub fcc_affiliation_pattern: String,
    /// JSON array of alternate tag spellings
    pub tag_patterns: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FccMatchChannelPattern {
    pub id: Uuid,
    pub name: String,
    pub pattern: String,
    pub capture_group: i32,
    /// JSON array restricting the pattern to specific networks
    pub networks: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FccMatchLocationPattern {
    pub id: Uuid,
    pub name: String,
    pub pattern: String,
    pub extract_city: bool,
    pub extract_state: bool,
    pub city_group: i32,
    pub state_group: i32,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FccStrategyType {
    CityStateChannel,
    StateChannel,
    CityDmaChannel,
    StateOnly,
    CityDmaOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FccMatchStrategy {
    pub id: Uuid,
    pub name: String,
    pub strategy_type: FccStrategyType,
    pub require_network: bool,
    pub require_channel_number: bool,
    pub require_state: bool,
    pub require_city: bool,
    pub match_nielsen_dma: bool,
    pub match_community_city: bool,
    pub match_community_state: bool,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Plain-value snapshots of the configurable pattern rows. These are held in
// process-wide caches and must survive outside the originating transaction.

#[derive(Debug, Clone)]
pub struct CachedFccNetwork {
    pub name: String,
    pub fcc_affiliation_pattern: String,
    pub tag_patterns: Option<Vec<String>>,
}

impl From<&FccMatchNetwork> for CachedFccNetwork {
    fn from(network: &FccMatchNetwork) -> Self {
        let tag_patterns = network
            .tag_patterns
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok());
        Self {
            name: network.name.clone(),
            fcc_affiliation_pattern: network.fcc_affiliation_pattern.clone(),
            tag_patterns,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedChannelPattern {
    pub name: String,
    pub pattern: String,
    pub capture_group: usize,
    pub networks: Option<Vec<String>>,
}

impl From<&FccMatchChannelPattern> for CachedChannelPattern {
    fn from(pattern: &FccMatchChannelPattern) -> Self {
        let networks = pattern
            .networks
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok());
        Self {
            name: pattern.name.clone(),
            pattern: pattern.pattern.clone(),
            capture_group: pattern.capture_group.max(0) as usize,
            networks,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedLocationPattern {
    pub name: String,
    pub pattern: String,
    pub extract_city: bool,
    pub extract_state: bool,
    pub city_group: usize,
    pub state_group: usize,
}

impl From<&FccMatchLocationPattern> for CachedLocationPattern {
    fn from(pattern: &FccMatchLocationPattern) -> Self {
        Self {
            name: pattern.name.clone(),
            pattern: pattern.pattern.clone(),
            extract_city: pattern.extract_city,
            extract_state: pattern.extract_state,
            city_group: pattern.city_group.max(0) as usize,
            state_group: pattern.state_group.max(0) as usize,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedFccStrategy {
    pub name: String,
    pub strategy_type: FccStrategyType,
    pub require_network: bool,
    pub require_channel_number: bool,
    pub require_state: bool,
    pub require_city: bool,
    pub match_nielsen_dma: bool,
    pub match_community_city: bool,
    pub match_community_state: bool,
}

impl From<&FccMatchStrategy> for CachedFccStrategy {
    fn from(strategy: &FccMatchStrategy) -> Self {
        Self {
            name: strategy.name.clone(),
            strategy_type: strategy.strategy_type,
            require_network: strategy.require_network,
            require_channel_number: strategy.require_channel_number,
            require_state: strategy.require_state,
            require_city: strategy.require_city,
            match_nielsen_dma: strategy.match_nielsen_dma,
            match_community_city: strategy.match_community_city,
            match_community_state: strategy.match_community_state,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedFccCorrection {
    pub callsign: String,
    pub facility_id: Option<i64>,
    pub network_affiliation: Option<String>,
    pub tv_virtual_channel: Option<String>,
    pub nielsen_dma: Option<String>,
    pub community_city: Option<String>,
    pub community_state: Option<String>,
}

impl From<&FccCorrection> for CachedFccCorrection {
    fn from(correction: &FccCorrection) -> Self {
        Self {
            callsign: correction.callsign.clone(),
            facility_id: correction.facility_id,
            network_affiliation: correction.network_affiliation.clone(),
            tv_virtual_channel: correction.tv_virtual_channel.clone(),
            nielsen_dma: correction.nielsen_dma.clone(),
            community_city: correction.community_city.clone(),
            community_state: correction.community_state.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FccSyncStats {
    pub added: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub channels_matched: u64,
    pub tags_created: u64,
    pub channel_tags_added: u64,
    pub errors: Vec<String>,
}
