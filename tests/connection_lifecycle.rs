//! Connection admission and lifecycle.

mod common;

use common::*;
use iptv_hub::errors::ConnectionError;
use iptv_hub::services::ConnectionManager;

#[tokio::test]
async fn admission_is_bounded_by_max_connections() {
    let db = test_db().await;
    let account = create_account(&db, "Provider A").await;
    let credential = create_credential(&db, account.id, 2).await;
    let manager = ConnectionManager::new(db.clone());

    let first = manager
        .acquire_connection(Some(credential.id), "100", Some("10.0.0.1"))
        .await
        .expect("first acquire should succeed");
    let second = manager
        .acquire_connection(Some(credential.id), "100", Some("10.0.0.2"))
        .await
        .expect("second acquire should succeed");

    assert_eq!(first.len(), 64);
    assert_ne!(first, second);

    let third = manager
        .acquire_connection(Some(credential.id), "100", Some("10.0.0.3"))
        .await;
    assert_eq!(third.unwrap_err(), ConnectionError::NoSlots);
    assert_eq!(
        ConnectionError::NoSlots.to_string(),
        "No available connection slots"
    );

    // Releasing a slot unblocks a subsequent acquire
    assert!(manager.release_connection(&first).await.unwrap());
    manager
        .acquire_connection(Some(credential.id), "100", Some("10.0.0.3"))
        .await
        .expect("acquire after release should succeed");
}

#[tokio::test]
async fn counts_are_recomputed_from_session_rows() {
    let db = test_db().await;
    let account = create_account(&db, "Provider B").await;
    let credential = create_credential(&db, account.id, 3).await;
    let manager = ConnectionManager::new(db.clone());

    let token = manager
        .acquire_connection(Some(credential.id), "7", None)
        .await
        .unwrap();

    assert_eq!(db.count_active_streams(credential.id).await.unwrap(), 1);
    let stored = db.get_credential(credential.id).await.unwrap().unwrap();
    assert_eq!(stored.active_connections, 1);

    manager.release_connection(&token).await.unwrap();
    assert_eq!(db.count_active_streams(credential.id).await.unwrap(), 0);
    let stored = db.get_credential(credential.id).await.unwrap().unwrap();
    assert_eq!(stored.active_connections, 0);
}

#[tokio::test]
async fn stale_sessions_are_reaped() {
    let db = test_db().await;
    let account = create_account(&db, "Provider C").await;
    let credential = create_credential(&db, account.id, 1).await;
    let manager = ConnectionManager::new(db.clone());

    let token = manager
        .acquire_connection(Some(credential.id), "55", None)
        .await
        .unwrap();

    // Backdate the session beyond the activity timeout
    sqlx::query("UPDATE active_streams SET last_activity = ?")
        .bind(chrono::Utc::now() - chrono::Duration::seconds(120))
        .execute(db.pool())
        .await
        .unwrap();

    let reaped = manager
        .cleanup_stale_connections(Some(account.id), 30)
        .await
        .unwrap();
    assert_eq!(reaped, 1);
    assert!(db.get_active_stream_by_token(&token).await.unwrap().is_none());

    // Capacity is free again
    manager
        .acquire_connection(Some(credential.id), "55", None)
        .await
        .expect("capacity should be free after reaping");
}

#[tokio::test]
async fn heartbeat_keeps_sessions_alive() {
    let db = test_db().await;
    let account = create_account(&db, "Provider D").await;
    let credential = create_credential(&db, account.id, 1).await;
    let manager = ConnectionManager::new(db.clone());

    let token = manager
        .acquire_connection(Some(credential.id), "9", None)
        .await
        .unwrap();
    assert!(manager.update_activity(&token).await.unwrap());

    let reaped = manager
        .cleanup_stale_connections(Some(account.id), 30)
        .await
        .unwrap();
    assert_eq!(reaped, 0);
    assert!(db.get_active_stream_by_token(&token).await.unwrap().is_some());
}

#[tokio::test]
async fn legacy_accounts_get_untracked_sessions() {
    let db = test_db().await;
    let account = create_account(&db, "Legacy Provider").await;
    let manager = ConnectionManager::new(db.clone());

    // No credential rows: selection falls back to the account's own fields
    let credential = manager
        .get_available_credential(account.id)
        .await
        .unwrap()
        .expect("legacy credential should be offered");
    assert!(credential.id().is_none());
    assert_eq!(credential.username(), "legacy_user");

    let token = manager
        .acquire_connection(credential.id(), "1", None)
        .await
        .unwrap();
    assert_eq!(token.len(), 64);

    let status = manager.get_connection_status(account.id).await.unwrap();
    assert!(status.legacy_mode);
    assert_eq!(status.total_max_connections, 1);
}

#[tokio::test]
async fn least_loaded_credential_is_selected() {
    let db = test_db().await;
    let account = create_account(&db, "Provider E").await;
    let busy = create_credential(&db, account.id, 2).await;
    let idle = create_credential(&db, account.id, 2).await;
    let manager = ConnectionManager::new(db.clone());

    manager
        .acquire_connection(Some(busy.id), "1", None)
        .await
        .unwrap();

    let selected = manager
        .get_available_credential(account.id)
        .await
        .unwrap()
        .expect("a credential should be available");
    assert_eq!(selected.id(), Some(idle.id));
}
