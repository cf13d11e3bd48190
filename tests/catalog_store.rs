//! Catalog upserts, stale cutoff and PPV visibility at the store level.

mod common;

use chrono::{Duration, Utc};
use common::*;
use iptv_hub::database::catalog::ChannelSyncRecord;
use iptv_hub::epg::ppv::update_ppv_channel_visibility;

fn record(stream_id: &str, name: &str) -> ChannelSyncRecord {
    ChannelSyncRecord {
        stream_id: stream_id.to_string(),
        name: name.to_string(),
        cleaned_name: name.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn channels_present_in_sync_are_active_and_absent_ones_expire() {
    let db = test_db().await;
    let account = create_account(&db, "Catalog").await;

    let first_sync = Utc::now() - Duration::minutes(10);
    db.apply_channel_sync(
        account.id,
        &[record("1", "ESPN"), record("2", "CNN")],
        first_sync,
    )
    .await
    .unwrap();

    // Second sync only carries ESPN
    let second_sync = Utc::now();
    db.apply_channel_sync(account.id, &[record("1", "ESPN")], second_sync)
        .await
        .unwrap();

    let cutoff = second_sync - Duration::minutes(5);
    let deactivated = db.deactivate_unseen_channels(account.id, cutoff).await.unwrap();
    assert_eq!(deactivated, 1);

    for channel in db.list_channels(account.id).await.unwrap() {
        assert_eq!(channel.is_active, channel.stream_id == "1", "channel {}", channel.name);
    }
}

#[tokio::test]
async fn resync_updates_fields_in_place() {
    let db = test_db().await;
    let account = create_account(&db, "Catalog").await;

    let now = Utc::now();
    let (added, updated) = db
        .apply_channel_sync(account.id, &[record("1", "ESPN")], now)
        .await
        .unwrap();
    assert_eq!((added, updated), (1, 0));

    // Unchanged resync counts nothing as updated
    let (added, updated) = db
        .apply_channel_sync(account.id, &[record("1", "ESPN")], now)
        .await
        .unwrap();
    assert_eq!((added, updated), (0, 0));

    let mut renamed = record("1", "ESPN HD");
    renamed.cleaned_name = "ESPN".to_string();
    let (added, updated) = db
        .apply_channel_sync(account.id, &[renamed], now)
        .await
        .unwrap();
    assert_eq!((added, updated), (0, 1));

    let channel = db.list_channels(account.id).await.unwrap().remove(0);
    assert_eq!(channel.name, "ESPN HD");
    assert_eq!(channel.cleaned_name.as_deref(), Some("ESPN"));
}

#[tokio::test]
async fn extraction_tags_are_replaced_not_accumulated() {
    let db = test_db().await;
    let account = create_account(&db, "Catalog").await;

    create_channel(&db, account.id, "1", "ESPN", "ESPN", &["US", "HD"]).await;
    let tags = db.channel_tag_names(account.id, "1").await.unwrap();
    assert_eq!(tags.len(), 2);

    // Next sync extracts a different set; stale extraction tags go away
    create_channel(&db, account.id, "1", "ESPN", "ESPN", &["US", "4K"]).await;
    let mut tags = db.channel_tag_names(account.id, "1").await.unwrap();
    tags.sort();
    assert_eq!(tags, vec!["4K".to_string(), "US".to_string()]);
}

#[tokio::test]
async fn manual_tags_survive_resync() {
    let db = test_db().await;
    let account = create_account(&db, "Catalog").await;

    create_channel(&db, account.id, "1", "ESPN", "ESPN", &["US"]).await;
    db.add_channel_tag(account.id, "1", "FAVORITE", iptv_hub::models::TagSource::Manual)
        .await
        .unwrap();

    create_channel(&db, account.id, "1", "ESPN", "ESPN", &["HD"]).await;
    let mut tags = db.channel_tag_names(account.id, "1").await.unwrap();
    tags.sort();
    assert_eq!(tags, vec!["FAVORITE".to_string(), "HD".to_string()]);
}

#[tokio::test]
async fn ppv_placeholders_hide_and_events_show() {
    let db = test_db().await;
    let account = create_account(&db, "PPV").await;

    let now = Utc::now();
    let mut placeholder = record("1", "UK: DAZN PPV 1 - NO EVENT STREAMING -");
    placeholder.is_ppv = true;
    let mut live = record("2", "UFC 300: Main Event");
    live.is_ppv = true;
    db.apply_channel_sync(account.id, &[placeholder, live], now)
        .await
        .unwrap();

    // Start hidden to prove live events are forced visible
    for channel in db.list_channels(account.id).await.unwrap() {
        db.set_channel_visibility(channel.id, false).await.unwrap();
    }

    let stats = update_ppv_channel_visibility(&db, account.id).await.unwrap();
    assert_eq!(stats.channels_processed, 2);
    assert_eq!(stats.channels_hidden, 1);
    assert_eq!(stats.channels_visible, 1);

    for channel in db.list_channels(account.id).await.unwrap() {
        assert_eq!(channel.is_visible, channel.stream_id == "2");
    }
}
