//! Callsign extraction from EPG channel ids.
//!
//! EPG feeds key channels in a handful of shapes: Schedules Direct uses
//! `I{station_id}.json.schedulesdirect.org`, US locals packages use
//! `CALLSIGN-DT.suffix`, and many feeds use a bare short id.

use regex::Regex;

/// Extract a callsign-ish identifier from an EPG channel id.
pub fn extract_callsign(channel_id: &str) -> Option<String> {
    if channel_id.is_empty() {
        return None;
    }

    // Schedules Direct format: the station id digits are the identifier
    let sd = Regex::new(r"(?i)^I(\d+)\.json\.schedulesdirect\.org").unwrap();
    if let Some(captures) = sd.captures(channel_id) {
        return Some(captures[1].to_string());
    }

    // CALLSIGN.suffix (e.g. KECI-DT.us_locals1, WHAS.us)
    let dotted = Regex::new(r"^([A-Za-z][A-Za-z0-9\-]{2,9})\.").unwrap();
    if let Some(captures) = dotted.captures(channel_id) {
        return Some(captures[1].to_string());
    }

    // Bare short id without dots
    if !channel_id.contains('.') && channel_id.len() <= 10 {
        return Some(channel_id.to_string());
    }

    None
}

/// Strip broadcast suffixes (`-TV`, `-DT`, `-HD`, ...) from a callsign,
/// uppercasing it. `KECI-DT` and `KECI-TV` both reduce to `KECI`.
pub fn base_callsign(callsign: &str) -> String {
    let upper = callsign.to_uppercase();
    let suffix = Regex::new(r"-(TV|DT|HD|FM|AM|LP|CA|CD|LD|D\d?)$").unwrap();
    suffix.replace(&upper, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_schedules_direct_station_id() {
        assert_eq!(
            extract_callsign("I10021.json.schedulesdirect.org").as_deref(),
            Some("10021")
        );
    }

    #[test]
    fn extracts_dotted_callsigns() {
        assert_eq!(extract_callsign("KECI-DT.us_locals1").as_deref(), Some("KECI-DT"));
        assert_eq!(extract_callsign("WHAS.us").as_deref(), Some("WHAS"));
        assert_eq!(extract_callsign("ESPN.us").as_deref(), Some("ESPN"));
    }

    #[test]
    fn passes_through_short_plain_ids() {
        assert_eq!(extract_callsign("CNN").as_deref(), Some("CNN"));
        assert_eq!(extract_callsign("").as_deref(), None);
    }

    #[test]
    fn base_callsign_strips_suffixes() {
        assert_eq!(base_callsign("KECI-DT"), "KECI");
        assert_eq!(base_callsign("KECI-TV"), "KECI");
        assert_eq!(base_callsign("WSVF-D2"), "WSVF");
        assert_eq!(base_callsign("WNBC"), "WNBC");
    }
}
