//! Filter composition and visibility recomputation against the store.

mod common;

use chrono::Utc;
use common::*;
use iptv_hub::database::catalog::{CategorySyncRecord, ChannelSyncRecord};
use iptv_hub::models::*;
use iptv_hub::services::FilterService;

async fn add_filter(
    db: &iptv_hub::database::Database,
    account_id: uuid::Uuid,
    kind: FilterKind,
    action: FilterAction,
    value: &str,
) {
    db.create_filter(&FilterCreateRequest {
        account_id,
        name: value.to_string(),
        filter_kind: kind,
        filter_action: action,
        filter_value: value.to_string(),
        enabled: true,
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn whitelists_and_blacklists_compose() {
    let db = test_db().await;
    let account = create_account(&db, "Filtered").await;
    let now = Utc::now();

    db.apply_category_sync(
        account.id,
        &[
            CategorySyncRecord {
                category_id: "1".into(),
                category_name: "Sports".into(),
                is_ppv: false,
            },
            CategorySyncRecord {
                category_id: "2".into(),
                category_name: "News".into(),
                is_ppv: false,
            },
            CategorySyncRecord {
                category_id: "3".into(),
                category_name: "Movies".into(),
                is_ppv: false,
            },
        ],
        now,
    )
    .await
    .unwrap();

    let categories = db.category_lookup(account.id).await.unwrap();
    let channel = |stream_id: &str, name: &str, category: &str| ChannelSyncRecord {
        stream_id: stream_id.to_string(),
        name: name.to_string(),
        cleaned_name: name.to_string(),
        category_id: categories.get(category).map(|(id, _)| *id),
        ..Default::default()
    };

    db.apply_channel_sync(
        account.id,
        &[
            channel("a", "ESPN", "1"),
            channel("b", "CNN", "2"),
            channel("c", "HBO", "3"),
            channel("d", "Test Channel", "1"),
        ],
        now,
    )
    .await
    .unwrap();

    add_filter(&db, account.id, FilterKind::Category, FilterAction::Whitelist, "Sports").await;
    add_filter(&db, account.id, FilterKind::Category, FilterAction::Whitelist, "News").await;
    add_filter(&db, account.id, FilterKind::ChannelName, FilterAction::Blacklist, "Test").await;

    let stats = FilterService::new(db.clone())
        .compute_visibility(account.id)
        .await
        .unwrap();
    assert_eq!(stats.channels_processed, 4);
    assert_eq!(stats.channels_visible, 2);
    assert_eq!(stats.channels_hidden, 2);

    let mut visibility: Vec<(String, bool)> = db
        .list_channels(account.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.name, c.is_visible))
        .collect();
    visibility.sort();

    assert_eq!(
        visibility,
        vec![
            ("CNN".to_string(), true),
            ("ESPN".to_string(), true),
            ("HBO".to_string(), false),
            ("Test Channel".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn no_filters_makes_everything_visible() {
    let db = test_db().await;
    let account = create_account(&db, "Open").await;

    let channel = create_channel(&db, account.id, "1", "Anything", "Anything", &[]).await;
    db.set_channel_visibility(channel.id, false).await.unwrap();

    FilterService::new(db.clone())
        .compute_visibility(account.id)
        .await
        .unwrap();

    let channel = db.get_channel(channel.id).await.unwrap().unwrap();
    assert!(channel.is_visible);
}

#[tokio::test]
async fn tag_whitelist_uses_stored_tags() {
    let db = test_db().await;
    let account = create_account(&db, "Tagged").await;

    create_channel(&db, account.id, "1", "US Channel", "US Channel", &["US"]).await;
    create_channel(&db, account.id, "2", "UK Channel", "UK Channel", &["UK"]).await;

    add_filter(&db, account.id, FilterKind::Tag, FilterAction::Whitelist, "us").await;

    let stats = FilterService::new(db.clone())
        .compute_visibility(account.id)
        .await
        .unwrap();
    assert_eq!(stats.channels_visible, 1);
    assert_eq!(stats.channels_hidden, 1);

    let channels = db.list_channels(account.id).await.unwrap();
    for channel in channels {
        assert_eq!(channel.is_visible, channel.name.starts_with("US"));
    }
}

#[tokio::test]
async fn visibility_matches_composition_after_recompute() {
    // Property: after compute_visibility, is_visible agrees with a direct
    // evaluation of the filter composition
    let db = test_db().await;
    let account = create_account(&db, "Property").await;

    create_channel(&db, account.id, "1", "ESPN US", "ESPN", &["US"]).await;
    create_channel(&db, account.id, "2", "ESPN UK", "ESPN", &["UK"]).await;
    create_channel(&db, account.id, "3", "Shopping", "Shopping", &["US"]).await;

    add_filter(&db, account.id, FilterKind::Tag, FilterAction::Whitelist, "US").await;
    add_filter(&db, account.id, FilterKind::ChannelName, FilterAction::Blacklist, "Shopping").await;

    FilterService::new(db.clone())
        .compute_visibility(account.id)
        .await
        .unwrap();

    let filters = db.list_enabled_filters(account.id).await.unwrap();
    for (channel, category_name) in db
        .list_active_channels_with_category(account.id)
        .await
        .unwrap()
    {
        let tags = db
            .channel_tag_names(account.id, &channel.stream_id)
            .await
            .unwrap();
        let expected = iptv_hub::services::filtering::channel_passes_filters(
            &channel,
            &category_name,
            &tags,
            &filters,
        );
        assert_eq!(channel.is_visible, expected, "channel {}", channel.name);
    }
}
