use crate::models::*;
use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

fn facility_from_row(row: &SqliteRow) -> Result<FccFacility> {
    Ok(FccFacility {
        id: row.try_get::<String, _>("id")?.parse()?,
        facility_id: row.try_get("facility_id")?,
        callsign: row.try_get("callsign")?,
        service_code: row.try_get("service_code")?,
        station_type: row.try_get("station_type")?,
        community_city: row.try_get("community_city")?,
        community_state: row.try_get("community_state")?,
        channel: row.try_get("channel")?,
        tv_virtual_channel: row.try_get("tv_virtual_channel")?,
        network_affiliation: row.try_get("network_affiliation")?,
        nielsen_dma: row.try_get("nielsen_dma")?,
        nielsen_dma_rank: row.try_get("nielsen_dma_rank")?,
        active: row.try_get("active")?,
        facility_status: row.try_get("facility_status")?,
        last_update: row.try_get("last_update")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn correction_from_row(row: &SqliteRow) -> Result<FccCorrection> {
    Ok(FccCorrection {
        id: row.try_get::<String, _>("id")?.parse()?,
        callsign: row.try_get("callsign")?,
        facility_id: row.try_get("facility_id")?,
        network_affiliation: row.try_get("network_affiliation")?,
        tv_virtual_channel: row.try_get("tv_virtual_channel")?,
        nielsen_dma: row.try_get("nielsen_dma")?,
        community_city: row.try_get("community_city")?,
        community_state: row.try_get("community_state")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Stations are preferred full-power digital first, then legacy analog, then
/// translators; main stations before auxiliaries. Keeps lookups stable.
const FACILITY_ORDER: &str = "ORDER BY CASE service_code WHEN 'DTV' THEN 1 WHEN 'TV' THEN 2 ELSE 3 END,
     CASE station_type WHEN 'M' THEN 1 ELSE 2 END, callsign";

impl super::Database {
    /// Upsert parsed facility records. Existing rows are matched by
    /// facility_id; all fields refresh in place.
    pub async fn apply_fcc_facility_sync(&self, records: &[FccFacilityRecord]) -> Result<FccSyncStats> {
        let mut stats = FccSyncStats::default();
        let now = Utc::now();

        let existing: HashMap<i64, Uuid> = sqlx::query(
            "SELECT id, facility_id FROM fcc_facilities WHERE facility_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok((
                row.try_get::<i64, _>("facility_id")?,
                row.try_get::<String, _>("id")?.parse()?,
            ))
        })
        .collect::<Result<_>>()?;

        let mut tx = self.pool.begin().await?;

        for record in records {
            let existing_id = record.facility_id.and_then(|fid| existing.get(&fid));

            if let Some(id) = existing_id {
                let result = sqlx::query(
                    "UPDATE fcc_facilities
                     SET callsign = ?, service_code = ?, station_type = ?, community_city = ?,
                         community_state = ?, channel = ?, tv_virtual_channel = ?,
                         network_affiliation = ?, nielsen_dma = ?, active = ?, facility_status = ?,
                         last_update = ?, updated_at = ?
                     WHERE id = ?
                       AND (callsign != ? OR IFNULL(network_affiliation, '') != IFNULL(?, '')
                            OR IFNULL(community_city, '') != IFNULL(?, '')
                            OR IFNULL(community_state, '') != IFNULL(?, '')
                            OR IFNULL(tv_virtual_channel, '') != IFNULL(?, '')
                            OR active != ?)",
                )
                .bind(&record.callsign)
                .bind(&record.service_code)
                .bind(&record.station_type)
                .bind(&record.community_city)
                .bind(&record.community_state)
                .bind(&record.channel)
                .bind(&record.tv_virtual_channel)
                .bind(&record.network_affiliation)
                .bind(&record.nielsen_dma)
                .bind(record.active)
                .bind(&record.facility_status)
                .bind(record.last_update)
                .bind(now)
                .bind(id.to_string())
                .bind(&record.callsign)
                .bind(&record.network_affiliation)
                .bind(&record.community_city)
                .bind(&record.community_state)
                .bind(&record.tv_virtual_channel)
                .bind(record.active)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() > 0 {
                    stats.updated += 1;
                } else {
                    stats.unchanged += 1;
                }
            } else {
                sqlx::query(
                    "INSERT INTO fcc_facilities (id, facility_id, callsign, service_code, station_type,
                        community_city, community_state, channel, tv_virtual_channel, network_affiliation,
                        nielsen_dma, active, facility_status, last_update, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(record.facility_id)
                .bind(&record.callsign)
                .bind(&record.service_code)
                .bind(&record.station_type)
                .bind(&record.community_city)
                .bind(&record.community_state)
                .bind(&record.channel)
                .bind(&record.tv_virtual_channel)
                .bind(&record.network_affiliation)
                .bind(&record.nielsen_dma)
                .bind(record.active)
                .bind(&record.facility_status)
                .bind(record.last_update)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                stats.added += 1;
            }
        }

        tx.commit().await?;
        Ok(stats)
    }

    pub async fn count_fcc_facilities(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM fcc_facilities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Look up a facility by callsign, tolerating suffix differences between
    /// the query and the registered callsign (KECI vs KECI-TV).
    pub async fn fcc_facility_by_callsign(&self, callsign: &str) -> Result<Option<FccFacility>> {
        let callsign = callsign.trim().to_uppercase();

        let row = sqlx::query(&format!(
            "SELECT * FROM fcc_facilities WHERE callsign = ? {FACILITY_ORDER} LIMIT 1"
        ))
        .bind(&callsign)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return Ok(Some(facility_from_row(&row)?));
        }

        // Strip a trailing -TV/-DT style suffix and retry as a prefix
        for suffix in ["-TV", "-DT", "TV", "DT"] {
            if let Some(base) = callsign.strip_suffix(suffix) {
                if base.is_empty() {
                    continue;
                }
                let row = sqlx::query(&format!(
                    "SELECT * FROM fcc_facilities WHERE callsign LIKE ? {FACILITY_ORDER} LIMIT 1"
                ))
                .bind(format!("{base}%"))
                .fetch_optional(&self.pool)
                .await?;
                if let Some(row) = row {
                    return Ok(Some(facility_from_row(&row)?));
                }
            }
        }

        // Try the registered suffixed forms of a bare callsign
        for suffix in ["-TV", "-DT", "-LD", "-LP", "-CD"] {
            let row = sqlx::query(&format!(
                "SELECT * FROM fcc_facilities WHERE callsign = ? {FACILITY_ORDER} LIMIT 1"
            ))
            .bind(format!("{callsign}{suffix}"))
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                return Ok(Some(facility_from_row(&row)?));
            }
        }

        // Prefix match only for reasonably long callsigns, so short strings
        // like WAR cannot match WARP-LD
        if callsign.len() >= 4 {
            let row = sqlx::query(&format!(
                "SELECT * FROM fcc_facilities WHERE callsign LIKE ? {FACILITY_ORDER} LIMIT 1"
            ))
            .bind(format!("{callsign}-%"))
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                return Ok(Some(facility_from_row(&row)?));
            }
        }

        Ok(None)
    }

    /// First active affiliate in a state on a virtual channel.
    pub async fn fcc_facility_by_state_channel(
        &self,
        affiliation_pattern: &str,
        state: &str,
        channel: &str,
    ) -> Result<Option<FccFacility>> {
        let row = sqlx::query(&format!(
            "SELECT * FROM fcc_facilities
             WHERE UPPER(network_affiliation) LIKE UPPER(?) AND active = 1
               AND community_state = ? AND tv_virtual_channel = ?
             {FACILITY_ORDER} LIMIT 1"
        ))
        .bind(affiliation_pattern)
        .bind(state)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(facility_from_row).transpose()
    }

    /// First active affiliate in a city and state on a virtual channel.
    pub async fn fcc_facility_by_city_state_channel(
        &self,
        affiliation_pattern: &str,
        city: &str,
        state: &str,
        channel: &str,
    ) -> Result<Option<FccFacility>> {
        let row = sqlx::query(&format!(
            "SELECT * FROM fcc_facilities
             WHERE UPPER(network_affiliation) LIKE UPPER(?) AND active = 1
               AND community_state = ?
               AND UPPER(community_city) LIKE '%' || UPPER(?) || '%'
               AND tv_virtual_channel = ?
             {FACILITY_ORDER} LIMIT 1"
        ))
        .bind(affiliation_pattern)
        .bind(state)
        .bind(city)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(facility_from_row).transpose()
    }

    /// First active affiliate whose community city and/or DMA contains the
    /// given location, optionally refined by a virtual channel.
    pub async fn fcc_facility_by_city_dma(
        &self,
        affiliation_pattern: &str,
        location: &str,
        match_community_city: bool,
        match_nielsen_dma: bool,
        channel: Option<&str>,
    ) -> Result<Option<FccFacility>> {
        let mut conditions = Vec::new();
        if match_community_city {
            conditions.push("UPPER(community_city) LIKE '%' || UPPER(?) || '%'");
        }
        if match_nielsen_dma {
            conditions.push("UPPER(nielsen_dma) LIKE '%' || UPPER(?) || '%'");
        }
        if conditions.is_empty() {
            return Ok(None);
        }

        let location_clause = conditions.join(" OR ");
        let channel_clause = if channel.is_some() {
            "AND tv_virtual_channel = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT * FROM fcc_facilities
             WHERE UPPER(network_affiliation) LIKE UPPER(?) AND active = 1
               AND ({location_clause}) {channel_clause}
             {FACILITY_ORDER} LIMIT 1"
        );

        let mut query = sqlx::query(&sql).bind(affiliation_pattern);
        if match_community_city {
            query = query.bind(location);
        }
        if match_nielsen_dma {
            query = query.bind(location);
        }
        if let Some(channel) = channel {
            query = query.bind(channel);
        }

        let row = query.fetch_optional(&self.pool).await?;
        row.as_ref().map(facility_from_row).transpose()
    }

    /// First active affiliate in a state, optionally refined by channel.
    pub async fn fcc_facility_by_state(
        &self,
        affiliation_pattern: &str,
        state: &str,
        channel: Option<&str>,
    ) -> Result<Option<FccFacility>> {
        let channel_clause = if channel.is_some() {
            "AND tv_virtual_channel = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT * FROM fcc_facilities
             WHERE UPPER(network_affiliation) LIKE UPPER(?) AND active = 1
               AND community_state = ? {channel_clause}
             {FACILITY_ORDER} LIMIT 1"
        );

        let mut query = sqlx::query(&sql).bind(affiliation_pattern).bind(state);
        if let Some(channel) = channel {
            query = query.bind(channel);
        }

        let row = query.fetch_optional(&self.pool).await?;
        row.as_ref().map(facility_from_row).transpose()
    }

    // Corrections

    pub async fn list_fcc_corrections(&self) -> Result<Vec<FccCorrection>> {
        let rows = sqlx::query("SELECT * FROM fcc_corrections")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(correction_from_row).collect()
    }

    pub async fn upsert_fcc_correction(&self, correction: &FccCorrection) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO fcc_corrections
                (id, callsign, facility_id, network_affiliation, tv_virtual_channel,
                 nielsen_dma, community_city, community_state, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(callsign) DO UPDATE SET
                facility_id = excluded.facility_id,
                network_affiliation = excluded.network_affiliation,
                tv_virtual_channel = excluded.tv_virtual_channel,
                nielsen_dma = excluded.nielsen_dma,
                community_city = excluded.community_city,
                community_state = excluded.community_state,
                updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(correction.callsign.to_uppercase())
        .bind(correction.facility_id)
        .bind(&correction.network_affiliation)
        .bind(&correction.tv_virtual_channel)
        .bind(&correction.nielsen_dma)
        .bind(&correction.community_city)
        .bind(&correction.community_state)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_fcc_correction(&self, callsign: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM fcc_corrections WHERE callsign = ?")
            .bind(callsign.to_uppercase())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // Configurable match pattern tables

    pub async fn list_fcc_networks(&self) -> Result<Vec<FccMatchNetwork>> {
        let rows = sqlx::query(
            "SELECT * FROM fcc_match_networks WHERE enabled = 1 ORDER BY priority",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(FccMatchNetwork {
                    id: row.try_get::<String, _>("id")?.parse()?,
                    name: row.try_get("name")?,
                    fcc_affiliation_pattern: row.try_get("fcc_affiliation_pattern")?,
                    tag_patterns: row.try_get("tag_patterns")?,
                    priority: row.try_get("priority")?,
                    enabled: row.try_get("enabled")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    pub async fn list_fcc_channel_patterns(&self) -> Result<Vec<FccMatchChannelPattern>> {
        let rows = sqlx::query(
            "SELECT * FROM fcc_match_channel_patterns WHERE enabled = 1 ORDER BY priority",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(FccMatchChannelPattern {
                    id: row.try_get::<String, _>("id")?.parse()?,
                    name: row.try_get("name")?,
                    pattern: row.try_get("pattern")?,
                    capture_group: row.try_get("capture_group")?,
                    networks: row.try_get("networks")?,
                    priority: row.try_get("priority")?,
                    enabled: row.try_get("enabled")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    pub async fn list_fcc_location_patterns(&self) -> Result<Vec<FccMatchLocationPattern>> {
        let rows = sqlx::query(
            "SELECT * FROM fcc_match_location_patterns WHERE enabled = 1 ORDER BY priority",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(FccMatchLocationPattern {
                    id: row.try_get::<String, _>("id")?.parse()?,
                    name: row.try_get("name")?,
                    pattern: row.try_get("pattern")?,
                    extract_city: row.try_get("extract_city")?,
                    extract_state: row.try_get("extract_state")?,
                    city_group: row.try_get("city_group")?,
                    state_group: row.try_get("state_group")?,
                    priority: row.try_get("priority")?,
                    enabled: row.try_get("enabled")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    pub async fn list_fcc_strategies(&self) -> Result<Vec<FccMatchStrategy>> {
        let rows = sqlx::query(
            "SELECT * FROM fcc_match_strategies WHERE enabled = 1 ORDER BY priority",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(FccMatchStrategy {
                    id: row.try_get::<String, _>("id")?.parse()?,
                    name: row.try_get("name")?,
                    strategy_type: row.try_get("strategy_type")?,
                    require_network: row.try_get("require_network")?,
                    require_channel_number: row.try_get("require_channel_number")?,
                    require_state: row.try_get("require_state")?,
                    require_city: row.try_get("require_city")?,
                    match_nielsen_dma: row.try_get("match_nielsen_dma")?,
                    match_community_city: row.try_get("match_community_city")?,
                    match_community_state: row.try_get("match_community_state")?,
                    priority: row.try_get("priority")?,
                    enabled: row.try_get("enabled")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }
}
