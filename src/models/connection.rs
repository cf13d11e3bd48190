use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A live proxied streaming session. One row per downstream client; the
/// per-credential row count is the authoritative connection count.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActiveStream {
    pub id: Uuid,
    pub credential_id: Uuid,
    pub stream_id: String,
    pub client_ip: Option<String>,
    pub session_token: String,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConnectionStatus {
    pub id: Uuid,
    pub username: String,
    pub max_connections: i32,
    pub active_connections: i64,
    pub enabled: bool,
    pub status: Option<String>,
    pub exp_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub total_max_connections: i64,
    pub total_active_connections: i64,
    pub available_connections: i64,
    pub credentials: Vec<CredentialConnectionStatus>,
    pub legacy_mode: bool,
}
