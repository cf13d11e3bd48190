//! East/west channel-link auto-detection.

mod common;

use common::*;
use iptv_hub::models::*;
use iptv_hub::services::SyncService;

#[tokio::test]
async fn west_channels_link_to_east_with_offset() {
    let db = test_db().await;
    let account = create_account(&db, "Linked").await;

    let east = create_channel(&db, account.id, "1", "CNN East", "CNN", &["EAST"]).await;
    let west = create_channel(&db, account.id, "2", "CNN West", "CNN", &["WEST"]).await;

    let sync = SyncService::new(db.clone());
    let stats = sync.detect_channel_links(Some(account.id)).await.unwrap();
    assert_eq!(stats.links_created, 1);

    let links = db.list_channel_links(account.id).await.unwrap();
    assert_eq!(links.len(), 1);
    let link = &links[0];
    assert_eq!(link.channel_id, west.id);
    assert_eq!(link.source_channel_id, east.id);
    assert_eq!(link.time_offset_hours, -3);
    assert_eq!(link.link_type, ChannelLinkType::TimeShifted);
    assert!(link.auto_detected);
}

#[tokio::test]
async fn detection_is_idempotent() {
    let db = test_db().await;
    let account = create_account(&db, "Linked").await;

    create_channel(&db, account.id, "1", "CNN East", "CNN", &["EAST"]).await;
    create_channel(&db, account.id, "2", "CNN West", "CNN", &["WEST"]).await;

    let sync = SyncService::new(db.clone());
    let first = sync.detect_channel_links(Some(account.id)).await.unwrap();
    assert_eq!(first.links_created, 1);

    let second = sync.detect_channel_links(Some(account.id)).await.unwrap();
    assert_eq!(second.links_created, 0);
    assert_eq!(second.links_skipped, 1);
    assert_eq!(db.list_channel_links(account.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn lone_untagged_channel_acts_as_east() {
    let db = test_db().await;
    let account = create_account(&db, "Linked").await;

    let plain = create_channel(&db, account.id, "1", "TNT", "TNT", &[]).await;
    let west = create_channel(&db, account.id, "2", "TNT West", "TNT", &["PT"]).await;

    let sync = SyncService::new(db.clone());
    let stats = sync.detect_channel_links(Some(account.id)).await.unwrap();
    assert_eq!(stats.links_created, 1);

    let link = db.get_link_for_channel(west.id).await.unwrap().unwrap();
    assert_eq!(link.source_channel_id, plain.id);
    assert_eq!(link.time_offset_hours, -3);
}

#[tokio::test]
async fn unrelated_names_are_not_linked() {
    let db = test_db().await;
    let account = create_account(&db, "Linked").await;

    create_channel(&db, account.id, "1", "CNN East", "CNN", &["EAST"]).await;
    create_channel(&db, account.id, "2", "TBS West", "TBS", &["WEST"]).await;

    let sync = SyncService::new(db.clone());
    let stats = sync.detect_channel_links(Some(account.id)).await.unwrap();
    assert_eq!(stats.links_created, 0);
    assert!(db.list_channel_links(account.id).await.unwrap().is_empty());
}
