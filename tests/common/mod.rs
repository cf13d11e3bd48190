//! Shared fixtures for integration tests.
#![allow(dead_code)]

use chrono::Utc;
use iptv_hub::database::catalog::ChannelSyncRecord;
use iptv_hub::database::Database;
use iptv_hub::models::*;
use uuid::Uuid;

pub async fn test_db() -> Database {
    Database::new_in_memory()
        .await
        .expect("in-memory database should initialize")
}

pub async fn create_account(db: &Database, name: &str) -> Account {
    db.create_account(&AccountCreateRequest {
        name: name.to_string(),
        server: "provider.example:8080".to_string(),
        username: Some("legacy_user".to_string()),
        password: Some("legacy_pass".to_string()),
        user_agent: None,
        enabled: true,
    })
    .await
    .expect("account should be created")
}

pub async fn create_credential(db: &Database, account_id: Uuid, max_connections: i32) -> Credential {
    db.create_credential(&CredentialCreateRequest {
        account_id,
        username: format!("user_{max_connections}"),
        password: "secret".to_string(),
        max_connections,
        enabled: true,
    })
    .await
    .expect("credential should be created")
}

/// Insert one channel through the sync path so derived bookkeeping applies.
pub async fn create_channel(
    db: &Database,
    account_id: Uuid,
    stream_id: &str,
    name: &str,
    cleaned_name: &str,
    tags: &[&str],
) -> Channel {
    let record = ChannelSyncRecord {
        stream_id: stream_id.to_string(),
        name: name.to_string(),
        cleaned_name: cleaned_name.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    };
    db.apply_channel_sync(account_id, &[record], Utc::now())
        .await
        .expect("channel sync should apply");

    db.list_channels(account_id)
        .await
        .expect("channels should list")
        .into_iter()
        .find(|c| c.stream_id == stream_id)
        .expect("channel should exist after sync")
}
