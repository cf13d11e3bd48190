//! Health status aggregation: distinct failure periods, auto-disable and
//! operator overrides.

mod common;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::*;
use iptv_hub::models::*;
use iptv_hub::services::{HealthMonitor, StreamAnalyzer};
use std::sync::Arc;

struct StubAnalyzer;

#[async_trait]
impl StreamAnalyzer for StubAnalyzer {
    async fn analyze(
        &self,
        _stream_url: &str,
        _duration_seconds: u32,
        _user_agent: &str,
        _black_screen_threshold: f64,
    ) -> StreamAnalysis {
        StreamAnalysis::failure(HealthCheckResult::ConnectionFailed, "stub")
    }
}

fn failure() -> StreamAnalysis {
    StreamAnalysis::failure(HealthCheckResult::ConnectionFailed, "connection refused")
}

fn success() -> StreamAnalysis {
    StreamAnalysis {
        result: HealthCheckResult::Success,
        http_status_code: None,
        error_message: None,
        analysis_details: None,
        check_duration_ms: 1200,
    }
}

#[tokio::test]
async fn clustered_failures_escalate_to_down_and_auto_disable() {
    let db = test_db().await;
    let account = create_account(&db, "Monitored").await;
    let channel = create_channel(&db, account.id, "1", "Flaky HD", "Flaky", &[]).await;
    let monitor = HealthMonitor::new(db.clone(), Arc::new(StubAnalyzer));

    // Five failures at t=0, 1h, 2h, 8h, 15h: clusters at 0, 8 and 15
    let base = Utc::now() - Duration::hours(20);
    for hours in [0, 1, 2, 8, 15] {
        monitor
            .record_check_at(channel.id, &failure(), None, base + Duration::hours(hours))
            .await
            .unwrap();
    }

    let status = db.get_health_status(channel.id).await.unwrap().unwrap();
    assert_eq!(status.status, HealthStatus::Down);
    assert_eq!(status.distinct_failure_periods, 3);
    assert_eq!(status.consecutive_failures, 5);
    assert_eq!(status.failed_checks, 5);
    assert!(status.auto_disabled_at.is_some());

    // Auto-disable hides the channel
    let channel = db.get_channel(channel.id).await.unwrap().unwrap();
    assert!(!channel.is_visible);
}

#[tokio::test]
async fn close_failures_stay_one_period() {
    let db = test_db().await;
    let account = create_account(&db, "Monitored").await;
    let channel = create_channel(&db, account.id, "2", "Glitchy", "Glitchy", &[]).await;
    let monitor = HealthMonitor::new(db.clone(), Arc::new(StubAnalyzer));

    let base = Utc::now() - Duration::hours(5);
    for minutes in [0, 30, 60, 90, 120] {
        monitor
            .record_check_at(channel.id, &failure(), None, base + Duration::minutes(minutes))
            .await
            .unwrap();
    }

    let status = db.get_health_status(channel.id).await.unwrap().unwrap();
    assert_eq!(status.distinct_failure_periods, 1);
    assert_eq!(status.status, HealthStatus::Degraded);

    // Still visible: one rough period is not enough to go down
    let channel = db.get_channel(channel.id).await.unwrap().unwrap();
    assert!(channel.is_visible);
}

#[tokio::test]
async fn success_restores_health_and_resets_periods() {
    let db = test_db().await;
    let account = create_account(&db, "Monitored").await;
    let channel = create_channel(&db, account.id, "3", "Recovering", "Recovering", &[]).await;
    let monitor = HealthMonitor::new(db.clone(), Arc::new(StubAnalyzer));

    let base = Utc::now() - Duration::hours(20);
    for hours in [0, 7, 14] {
        monitor
            .record_check_at(channel.id, &failure(), None, base + Duration::hours(hours))
            .await
            .unwrap();
    }
    let status = db.get_health_status(channel.id).await.unwrap().unwrap();
    assert_eq!(status.status, HealthStatus::Down);

    monitor
        .record_check_at(channel.id, &success(), None, base + Duration::hours(16))
        .await
        .unwrap();

    let status = db.get_health_status(channel.id).await.unwrap().unwrap();
    assert_eq!(status.status, HealthStatus::Healthy);
    assert_eq!(status.distinct_failure_periods, 0);
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.last_success_at.is_some());
}

#[tokio::test]
async fn skipped_checks_do_not_affect_status() {
    let db = test_db().await;
    let account = create_account(&db, "Monitored").await;
    let channel = create_channel(&db, account.id, "4", "Unprobed", "Unprobed", &[]).await;
    let monitor = HealthMonitor::new(db.clone(), Arc::new(StubAnalyzer));

    let skipped = StreamAnalysis::failure(HealthCheckResult::Skipped, "ffprobe not installed");
    monitor
        .record_check_at(channel.id, &skipped, None, Utc::now())
        .await
        .unwrap();

    let status = db.get_health_status(channel.id).await.unwrap().unwrap();
    assert_eq!(status.status, HealthStatus::Unknown);
    assert_eq!(status.failed_checks, 0);
    assert_eq!(status.total_checks, 1);
}

#[tokio::test]
async fn reenable_resets_status_and_visibility() {
    let db = test_db().await;
    let account = create_account(&db, "Monitored").await;
    let channel = create_channel(&db, account.id, "5", "Banished", "Banished", &[]).await;
    let monitor = HealthMonitor::new(db.clone(), Arc::new(StubAnalyzer));

    let base = Utc::now() - Duration::hours(20);
    for hours in [0, 7, 14] {
        monitor
            .record_check_at(channel.id, &failure(), None, base + Duration::hours(hours))
            .await
            .unwrap();
    }
    assert!(!db.get_channel(channel.id).await.unwrap().unwrap().is_visible);

    monitor.reenable_channel(channel.id).await.unwrap();

    let status = db.get_health_status(channel.id).await.unwrap().unwrap();
    assert_eq!(status.status, HealthStatus::Unknown);
    assert_eq!(status.distinct_failure_periods, 0);
    assert!(status.auto_disabled_at.is_none());
    assert!(status.manually_reenabled_at.is_some());
    assert!(db.get_channel(channel.id).await.unwrap().unwrap().is_visible);
}

#[tokio::test]
async fn ignored_channels_are_not_selected_for_scanning() {
    let db = test_db().await;
    let account = create_account(&db, "Monitored").await;
    let channel = create_channel(&db, account.id, "6", "Noisy", "Noisy", &[]).await;
    let other = create_channel(&db, account.id, "7", "Fine", "Fine", &[]).await;
    let monitor = HealthMonitor::new(db.clone(), Arc::new(StubAnalyzer));

    monitor.ignore_channel(channel.id, Some("operator request")).await.unwrap();

    let due = db
        .channels_to_scan(account.id, Utc::now(), 10)
        .await
        .unwrap();
    let ids: Vec<_> = due.iter().map(|c| c.id).collect();
    assert!(!ids.contains(&channel.id));
    assert!(ids.contains(&other.id));

    let status = db.get_health_status(channel.id).await.unwrap().unwrap();
    assert_eq!(status.status, HealthStatus::Ignored);
    assert_eq!(status.ignored_reason.as_deref(), Some("operator request"));
}
