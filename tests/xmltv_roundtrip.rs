//! XMLTV parse/emit round-trip and EPG channel store upserts.

mod common;

use chrono::Utc;
use common::*;
use iptv_hub::ingestor::xmltv::{parse_xmltv, to_channel_upserts};
use iptv_hub::models::EpgSourceType;
use iptv_hub::proxy::epg_generator::write_xmltv;
use std::collections::BTreeSet;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="upstream">
  <channel id="KECI-DT.us_locals1">
    <display-name>KECI</display-name>
    <display-name>NBC Missoula</display-name>
    <icon src="http://logos.example/keci.png"/>
    <url>http://keci.example</url>
  </channel>
  <channel id="ESPN.us">
    <display-name>ESPN</display-name>
  </channel>
  <channel id="I10021.json.schedulesdirect.org">
    <display-name>CNN</display-name>
  </channel>
  <programme channel="ESPN.us" start="20231215120000 +0000" stop="20231215140000 +0000">
    <title>SportsCenter</title>
  </programme>
  <programme channel="ESPN.us" start="20231215140000 +0000" stop="20231215150000 +0000">
    <title>NFL Live</title>
  </programme>
  <programme channel="KECI-DT.us_locals1" start="20231215120000 -0700" stop="20231215130000 -0700">
    <title>Noon News</title>
  </programme>
</tv>"#;

#[test]
fn parse_emit_parse_preserves_channels_and_programmes() {
    let first = parse_xmltv(FEED).unwrap();
    let emitted = write_xmltv(&first).unwrap();
    let second = parse_xmltv(&emitted).unwrap();

    // Display-name sets per channel id are preserved
    let names = |doc: &iptv_hub::ingestor::xmltv::XmltvDocument| -> Vec<(String, BTreeSet<String>)> {
        let mut entries: Vec<_> = doc
            .channels
            .iter()
            .map(|c| (c.id.clone(), c.display_names.iter().cloned().collect()))
            .collect();
        entries.sort();
        entries
    };
    assert_eq!(names(&first), names(&second));

    // Programme counts per channel are preserved
    let counts = |doc: &iptv_hub::ingestor::xmltv::XmltvDocument| -> Vec<(String, usize)> {
        let mut map = std::collections::HashMap::new();
        for programme in &doc.programmes {
            *map.entry(programme.channel.clone()).or_insert(0) += 1;
        }
        let mut entries: Vec<_> = map.into_iter().collect();
        entries.sort();
        entries
    };
    assert_eq!(counts(&first), counts(&second));

    // Timestamps survive even when the source used a non-UTC offset
    assert_eq!(first.programmes, second.programmes);
}

#[tokio::test]
async fn epg_channel_sync_tracks_counts_and_time_ranges() {
    let db = test_db().await;
    let source = db
        .create_epg_source("Feed", EpgSourceType::XmltvUrl, None, Some("http://epg.example"), 100)
        .await
        .unwrap();

    let document = parse_xmltv(FEED).unwrap();
    let upserts = to_channel_upserts(&document);
    let stats = db
        .apply_epg_channel_sync(source.id, &upserts, Utc::now())
        .await
        .unwrap();

    assert_eq!(stats.channels_added, 3);
    assert_eq!(stats.total_programs, 3);

    let channels = db.list_epg_channels(Some(source.id)).await.unwrap();
    let espn = channels.iter().find(|c| c.channel_id == "ESPN.us").unwrap();
    assert_eq!(espn.program_count, 2);
    assert!(espn.first_program.unwrap() < espn.last_program.unwrap());

    // Resync updates in place rather than duplicating
    let stats = db
        .apply_epg_channel_sync(source.id, &upserts, Utc::now())
        .await
        .unwrap();
    assert_eq!(stats.channels_added, 0);
    assert_eq!(stats.channels_updated, 3);
    assert_eq!(db.list_epg_channels(Some(source.id)).await.unwrap().len(), 3);
}

#[tokio::test]
async fn missing_channels_are_counted_but_kept() {
    let db = test_db().await;
    let source = db
        .create_epg_source("Feed", EpgSourceType::XmltvUrl, None, Some("http://epg.example"), 100)
        .await
        .unwrap();

    let document = parse_xmltv(FEED).unwrap();
    let upserts = to_channel_upserts(&document);
    db.apply_epg_channel_sync(source.id, &upserts, Utc::now())
        .await
        .unwrap();

    // Next feed only carries ESPN; the others may come back
    let trimmed: Vec<_> = upserts
        .into_iter()
        .filter(|u| u.channel_id == "ESPN.us")
        .collect();
    let stats = db
        .apply_epg_channel_sync(source.id, &trimmed, Utc::now())
        .await
        .unwrap();

    assert_eq!(stats.channels_removed, 2);
    assert_eq!(db.list_epg_channels(Some(source.id)).await.unwrap().len(), 3);
}
