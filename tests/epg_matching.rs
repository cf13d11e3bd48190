//! Rule-driven EPG matching, including the FCC lookup path.

mod common;

use chrono::Utc;
use common::*;
use iptv_hub::database::Database;
use iptv_hub::epg::{EpgMatcher, FccResolver};
use iptv_hub::models::*;
use std::sync::Arc;
use uuid::Uuid;

async fn seed_epg_channel(db: &Database, channel_id: &str, display_name: &str) -> Uuid {
    let source = db
        .create_epg_source("US Locals", EpgSourceType::XmltvUrl, None, Some("http://epg.example/xmltv"), 100)
        .await
        .unwrap();

    db.apply_epg_channel_sync(
        source.id,
        &[EpgChannelUpsert {
            channel_id: channel_id.to_string(),
            display_name: display_name.to_string(),
            display_names: vec![display_name.to_string()],
            program_count: 120,
            ..Default::default()
        }],
        Utc::now(),
    )
    .await
    .unwrap();

    db.list_epg_channels(Some(source.id))
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.channel_id == channel_id)
        .unwrap()
        .id
}

fn keci_facility() -> FccFacilityRecord {
    FccFacilityRecord {
        facility_id: Some(18084),
        callsign: "KECI-TV".to_string(),
        service_code: "DTV".to_string(),
        station_type: Some("M".to_string()),
        community_city: Some("MISSOULA".to_string()),
        community_state: Some("MT".to_string()),
        channel: Some("13".to_string()),
        tv_virtual_channel: Some("13".to_string()),
        network_affiliation: Some("NBC".to_string()),
        nielsen_dma: Some("Missoula".to_string()),
        active: true,
        facility_status: None,
        last_update: None,
    }
}

#[tokio::test]
async fn fcc_lookup_binds_us_locals_through_base_callsign() {
    let db = test_db().await;
    let account = create_account(&db, "US Provider").await;

    db.apply_fcc_facility_sync(&[keci_facility()]).await.unwrap();
    let epg_id = seed_epg_channel(&db, "KECI-DT.us_locals1", "KECI").await;

    let channel = create_channel(
        &db,
        account.id,
        "1313",
        "US: NBC 13 HD [MONTANA]",
        "NBC 13 HD MONTANA",
        &["US", "NBC", "HD", "MONTANA"],
    )
    .await;

    let resolver = Arc::new(FccResolver::new(db.clone()));
    let matcher = EpgMatcher::new(db.clone(), resolver);
    let stats = matcher.match_account(account.id, None, 50, false).await.unwrap();

    assert_eq!(stats.matched, 1);
    assert_eq!(stats.matches_by_type.get("fcc_lookup"), Some(&1));

    let mapping = db.get_mapping_for_channel(channel.id).await.unwrap().unwrap();
    assert_eq!(mapping.epg_channel_id, epg_id);
    assert_eq!(mapping.mapping_type, "fcc_lookup");
    // Base-callsign match (KECI-TV via KECI against KECI-DT)
    assert!((mapping.confidence - 0.84).abs() < 1e-9);
}

#[tokio::test]
async fn provider_id_wins_over_everything() {
    let db = test_db().await;
    let account = create_account(&db, "Provider").await;

    let epg_id = seed_epg_channel(&db, "ESPN.us", "ESPN").await;

    // Give the channel a provider-supplied EPG id
    let record = iptv_hub::database::catalog::ChannelSyncRecord {
        stream_id: "42".to_string(),
        name: "US: ESPN".to_string(),
        cleaned_name: "ESPN".to_string(),
        epg_channel_id: Some("ESPN.us".to_string()),
        tags: vec!["US".to_string()],
        ..Default::default()
    };
    db.apply_channel_sync(account.id, &[record], Utc::now()).await.unwrap();
    let channel = db
        .list_channels(account.id)
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap();

    let matcher = EpgMatcher::new(db.clone(), Arc::new(FccResolver::new(db.clone())));
    let stats = matcher.match_account(account.id, None, 50, false).await.unwrap();

    assert_eq!(stats.matched, 1);
    let mapping = db.get_mapping_for_channel(channel.id).await.unwrap().unwrap();
    assert_eq!(mapping.epg_channel_id, epg_id);
    assert_eq!(mapping.mapping_type, "provider_id");
    assert!((mapping.confidence - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn exact_name_matches_normalized_display_names() {
    let db = test_db().await;
    let account = create_account(&db, "Provider").await;

    seed_epg_channel(&db, "discovery.uk", "Discovery Channel").await;
    let channel = create_channel(
        &db,
        account.id,
        "7",
        "UK: Discovery Channel!",
        "Discovery Channel",
        &[],
    )
    .await;

    let matcher = EpgMatcher::new(db.clone(), Arc::new(FccResolver::new(db.clone())));
    matcher.match_account(account.id, None, 50, false).await.unwrap();

    let mapping = db.get_mapping_for_channel(channel.id).await.unwrap().unwrap();
    assert_eq!(mapping.mapping_type, "exact_name");
    assert!((mapping.confidence - 0.95).abs() < 1e-9);
}

#[tokio::test]
async fn override_mappings_are_never_rematched() {
    let db = test_db().await;
    let account = create_account(&db, "Provider").await;

    let wanted = seed_epg_channel(&db, "manual.pick", "Manual Pick").await;
    let channel = create_channel(&db, account.id, "5", "US: ESPN", "ESPN", &["US"]).await;

    db.set_mapping_override(channel.id, wanted).await.unwrap();

    let matcher = EpgMatcher::new(db.clone(), Arc::new(FccResolver::new(db.clone())));
    let stats = matcher.match_account(account.id, None, 50, false).await.unwrap();

    assert_eq!(stats.skipped_existing, 1);
    let mapping = db.get_mapping_for_channel(channel.id).await.unwrap().unwrap();
    assert_eq!(mapping.epg_channel_id, wanted);
    assert!(mapping.is_override);
}

#[tokio::test]
async fn ppv_channels_are_skipped() {
    let db = test_db().await;
    let account = create_account(&db, "Provider").await;

    seed_epg_channel(&db, "event1.us", "Event 1").await;

    let now = Utc::now();
    db.apply_category_sync(
        account.id,
        &[iptv_hub::database::catalog::CategorySyncRecord {
            category_id: "100".to_string(),
            category_name: "PPV EVENTS".to_string(),
            is_ppv: true,
        }],
        now,
    )
    .await
    .unwrap();
    let categories = db.category_lookup(account.id).await.unwrap();

    let record = iptv_hub::database::catalog::ChannelSyncRecord {
        stream_id: "900".to_string(),
        name: "Event 1".to_string(),
        cleaned_name: "Event 1".to_string(),
        category_id: categories.get("100").map(|(id, _)| *id),
        is_ppv: true,
        ..Default::default()
    };
    db.apply_channel_sync(account.id, &[record], now).await.unwrap();
    let channel = db.list_channels(account.id).await.unwrap().remove(0);

    let matcher = EpgMatcher::new(db.clone(), Arc::new(FccResolver::new(db.clone())));
    let stats = matcher.match_account(account.id, None, 50, false).await.unwrap();

    assert_eq!(stats.excluded, 1);
    assert!(db.get_mapping_for_channel(channel.id).await.unwrap().is_none());
}
