//! PPV channel handling.
//!
//! PPV channels carry an event-scoped name: a placeholder like
//! `"DAZN PPV 1 - NO EVENT STREAMING -"` between events, and the event
//! title while one is scheduled. Placeholder channels are hidden from
//! playlists; channels with a live event are forced visible.

use crate::database::Database;
use crate::models::VisibilityStats;
use anyhow::Result;
use regex::Regex;
use tracing::info;
use uuid::Uuid;

/// Category-name markers identifying PPV categories (case-insensitive
/// substring match).
pub const PPV_CATEGORY_MARKERS: &[&str] = &["PPV", "PAY-PER-VIEW", "UFC PPV", "WWE PPV"];

pub fn is_ppv_category_name(category_name: &str) -> bool {
    let upper = category_name.to_uppercase();
    PPV_CATEGORY_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Whether a PPV channel name is a between-events placeholder.
pub fn is_ppv_placeholder_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return true;
    }

    let upper = trimmed.to_uppercase();

    // "NO EVENT STREAMING" / "NO EVENT SCHEDULED" markers, anywhere
    if upper.contains("NO EVENT") {
        return true;
    }

    // Bare TBA / TBD / OFFLINE / COMING SOON slots
    if matches!(upper.as_str(), "TBA" | "TBD" | "OFFLINE" | "COMING SOON") {
        return true;
    }

    // Numbered event slots with no event info: "EVENT 14", "UK: VIDIO EVENT 1"
    let numbered_event = Regex::new(r"\bEVENT\s*\d+\s*$").unwrap();
    if numbered_event.is_match(&upper) {
        return true;
    }

    // Empty slots ending in a separator: "UFC 09:", "NBA 10 -"
    if upper.ends_with(':') || upper.ends_with('-') {
        return true;
    }

    // Leading separator with a bare slot number: ":MAX NL  05"
    let leading_slot = Regex::new(r"^[:\-].*\d\s*$").unwrap();
    if leading_slot.is_match(&upper) {
        return true;
    }

    false
}

/// The scheduled event title of a PPV channel, if one is live.
pub fn ppv_event_title(name: &str) -> Option<String> {
    if is_ppv_placeholder_name(name) {
        None
    } else {
        Some(name.trim().to_string())
    }
}

/// Force visibility of an account's PPV channels from their names:
/// placeholder names hide, live event names show.
pub async fn update_ppv_channel_visibility(
    db: &Database,
    account_id: Uuid,
) -> Result<VisibilityStats> {
    let mut stats = VisibilityStats::default();

    let tagged: std::collections::HashSet<String> = db
        .stream_ids_with_tag(account_id, "PPV")
        .await?
        .into_iter()
        .collect();

    let mut changes = Vec::new();
    for channel in db.list_active_channels(account_id).await? {
        if !channel.is_ppv && !tagged.contains(&channel.stream_id) {
            continue;
        }

        stats.channels_processed += 1;
        let visible = !is_ppv_placeholder_name(&channel.name);
        if visible {
            stats.channels_visible += 1;
        } else {
            stats.channels_hidden += 1;
        }
        if channel.is_visible != visible {
            changes.push((channel.id, visible));
        }
    }

    db.apply_visibility(&changes).await?;
    if !changes.is_empty() {
        info!(
            "PPV visibility updated for account {}: {} hidden, {} visible",
            account_id, stats.channels_hidden, stats.channels_visible
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_event_markers_are_placeholders() {
        assert!(is_ppv_placeholder_name("NO EVENT STREAMING"));
        assert!(is_ppv_placeholder_name("- NO EVENT STREAMING -"));
        assert!(is_ppv_placeholder_name("UK: DAZN PPV 1 - NO EVENT STREAMING - | 8K EXCLUSIVE"));
        assert!(is_ppv_placeholder_name("NO EVENT SCHEDULED"));
    }

    #[test]
    fn numbered_event_slots_are_placeholders() {
        assert!(is_ppv_placeholder_name("UK: VIDIO EVENT 1"));
        assert!(is_ppv_placeholder_name("EVENT 14"));
    }

    #[test]
    fn empty_slots_are_placeholders() {
        assert!(is_ppv_placeholder_name("UFC 09:"));
        assert!(is_ppv_placeholder_name("NBA 10 -"));
        assert!(is_ppv_placeholder_name(":MAX NL  05"));
        assert!(is_ppv_placeholder_name("GaaGo Fixtures 10:"));
        assert!(is_ppv_placeholder_name("TBA"));
        assert!(is_ppv_placeholder_name("OFFLINE"));
        assert!(is_ppv_placeholder_name(""));
    }

    #[test]
    fn live_events_are_not_placeholders() {
        assert!(!is_ppv_placeholder_name("UFC 300: Main Event"));
        assert!(!is_ppv_placeholder_name("UFC 300 - Jones vs Miocic"));
        assert!(!is_ppv_placeholder_name("WWE Wrestlemania 40"));
        assert!(!is_ppv_placeholder_name("BOXING: Fury vs Joshua"));
        assert!(!is_ppv_placeholder_name("Bellator 300"));
        assert!(!is_ppv_placeholder_name(
            "UK: DAZN PPV 3 - EAST CAROLINA @ NORTH CAROLINA | Tue 23 Dec 01:50"
        ));
        assert!(!is_ppv_placeholder_name(
            "EPL 01: 20:00 Manchester United vs Newcastle United"
        ));
    }

    #[test]
    fn ppv_categories_detected_by_substring() {
        assert!(is_ppv_category_name("PPV EVENTS"));
        assert!(is_ppv_category_name("US| Pay-Per-View"));
        assert!(is_ppv_category_name("UFC PPV"));
        assert!(!is_ppv_category_name("US| SPORTS"));
    }

    #[test]
    fn event_title_only_for_live_events() {
        assert_eq!(ppv_event_title("UFC 300: Main Event").as_deref(), Some("UFC 300: Main Event"));
        assert_eq!(ppv_event_title("PPV 1 -"), None);
    }
}
