//! FCC LMS `facility.dat` parsing.
//!
//! The archive download itself is an external collaborator; this module
//! takes the raw bytes of `facility.dat`, a pipe-delimited dump whose
//! records terminate with `^|` followed by a newline.

use crate::epg::fcc::normalize_network_affiliation;
use crate::models::FccFacilityRecord;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::info;

/// TV-related service codes retained from the dump.
pub const TV_SERVICE_CODES: &[&str] = &["DTV", "TV", "LPT", "LPD", "LPA", "LPX"];

// Column indices in facility.dat (0-based)
const COL_ACTIVE: usize = 0;
const COL_CALLSIGN: usize = 3;
const COL_CHANNEL: usize = 5;
const COL_CITY: usize = 7;
const COL_STATE: usize = 8;
const COL_FACILITY_ID: usize = 12;
const COL_FACILITY_STATUS: usize = 13;
const COL_LAST_UPDATE: usize = 18;
const COL_NETWORK: usize = 21;
const COL_NIELSEN_DMA: usize = 22;
const COL_SERVICE_CODE: usize = 25;
const COL_STATION_TYPE: usize = 26;
const COL_VIRTUAL_CHANNEL: usize = 30;

fn field(fields: &[&str], index: usize) -> Option<String> {
    let value = fields.get(index)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_last_update(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.len() < 19 {
        return None;
    }
    NaiveDateTime::parse_from_str(&trimmed[..19], "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse `facility.dat` content into TV facility records.
pub fn parse_facility_data(data: &[u8]) -> Vec<FccFacilityRecord> {
    let text = String::from_utf8_lossy(data).replace("\r\n", "\n");
    let mut records = Vec::new();

    // Skip the header line
    for line in text.split("^|\n").skip(1) {
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < 31 {
            continue;
        }

        let service_code = fields[COL_SERVICE_CODE].trim().to_uppercase();
        if !TV_SERVICE_CODES.contains(&service_code.as_str()) {
            continue;
        }

        let callsign = fields[COL_CALLSIGN].trim().to_uppercase();
        if callsign.is_empty() {
            continue;
        }

        let facility_id = fields[COL_FACILITY_ID].trim().parse::<i64>().ok();
        let network_affiliation =
            normalize_network_affiliation(fields[COL_NETWORK].trim());

        records.push(FccFacilityRecord {
            facility_id,
            callsign,
            service_code,
            station_type: field(&fields, COL_STATION_TYPE),
            community_city: field(&fields, COL_CITY).map(|c| c.to_uppercase()),
            community_state: field(&fields, COL_STATE).map(|s| s.to_uppercase()),
            channel: field(&fields, COL_CHANNEL),
            tv_virtual_channel: field(&fields, COL_VIRTUAL_CHANNEL),
            network_affiliation,
            nielsen_dma: field(&fields, COL_NIELSEN_DMA),
            active: fields[COL_ACTIVE].trim().eq_ignore_ascii_case("Y"),
            facility_status: field(&fields, COL_FACILITY_STATUS),
            last_update: parse_last_update(fields[COL_LAST_UPDATE]),
        });
    }

    info!("Parsed {} TV facility records from FCC data", records.len());
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_line(values: &[(usize, &str)]) -> String {
        let mut fields = vec![String::new(); 31];
        for (index, value) in values {
            fields[*index] = value.to_string();
        }
        fields.join("|")
    }

    fn sample_data() -> String {
        let header = "active_ind|atsc3_ind|authorizing_act|callsign|...".to_string();
        let keci = build_line(&[
            (COL_ACTIVE, "Y"),
            (COL_CALLSIGN, "KECI-TV"),
            (COL_CHANNEL, "13"),
            (COL_CITY, "Missoula"),
            (COL_STATE, "MT"),
            (COL_FACILITY_ID, "18084"),
            (COL_LAST_UPDATE, "2023-11-02 08:15:00"),
            (COL_NETWORK, "NBC"),
            (COL_NIELSEN_DMA, "Missoula"),
            (COL_SERVICE_CODE, "DTV"),
            (COL_STATION_TYPE, "M"),
            (COL_VIRTUAL_CHANNEL, "13"),
        ]);
        let fm_station = build_line(&[
            (COL_ACTIVE, "Y"),
            (COL_CALLSIGN, "KXYZ-FM"),
            (COL_SERVICE_CODE, "FM"),
        ]);
        format!("{header}^|\n{keci}^|\n{fm_station}^|\n")
    }

    #[test]
    fn keeps_tv_services_only() {
        let records = parse_facility_data(sample_data().as_bytes());
        assert_eq!(records.len(), 1);

        let keci = &records[0];
        assert_eq!(keci.callsign, "KECI-TV");
        assert_eq!(keci.facility_id, Some(18084));
        assert_eq!(keci.community_city.as_deref(), Some("MISSOULA"));
        assert_eq!(keci.community_state.as_deref(), Some("MT"));
        assert_eq!(keci.tv_virtual_channel.as_deref(), Some("13"));
        assert_eq!(keci.network_affiliation.as_deref(), Some("NBC"));
        assert!(keci.active);
        assert!(keci.last_update.is_some());
    }

    #[test]
    fn normalizes_subchannel_affiliations() {
        let line = build_line(&[
            (COL_ACTIVE, "Y"),
            (COL_CALLSIGN, "KXXX"),
            (COL_NETWORK, "5.1 FOX, 5.2 SSSEN, 5.3 Court TV Mystery"),
            (COL_SERVICE_CODE, "DTV"),
        ]);
        let data = format!("header^|\n{line}^|\n");
        let records = parse_facility_data(data.as_bytes());
        assert_eq!(records[0].network_affiliation.as_deref(), Some("FOX"));
    }

    #[test]
    fn skips_short_and_blank_records() {
        let data = "header^|\nshort|line^|\n\n^|\n";
        assert!(parse_facility_data(data.as_bytes()).is_empty());
    }
}
