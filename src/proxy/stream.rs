//! Upstream stream relay.
//!
//! Opens the provider's `/live/{user}/{pass}/{id}.ts` URL under an admitted
//! session and hands chunks to the caller. The session heartbeats while the
//! client keeps reading and is released on every exit path; an unread or
//! dropped relay is reaped by the stale-session cleanup.

use crate::database::Database;
use crate::errors::{AppError, ConnectionError};
use crate::models::{Account, LeasedCredential};
use crate::services::connection_manager::ConnectionManager;
use crate::utils::normalize_server_url;
use bytes::Bytes;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Heartbeat cadence while the downstream client is actively reading.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

pub struct ProxyStream {
    connections: ConnectionManager,
    session_token: Option<String>,
    response: reqwest::Response,
    last_heartbeat: Instant,
}

impl ProxyStream {
    /// Admit a session for the account and open the upstream stream.
    pub async fn open(
        db: Database,
        account: &Account,
        stream_id: &str,
        client_ip: Option<&str>,
    ) -> Result<Self, AppError> {
        let connections = ConnectionManager::new(db);

        let credential = connections
            .get_available_credential(account.id)
            .await
            .map_err(|e| AppError::internal(e.to_string()))?
            .ok_or(ConnectionError::NoSlots)?;

        let session_token = connections
            .acquire_connection(credential.id(), stream_id, client_ip)
            .await?;

        let upstream_url = match &credential {
            LeasedCredential::Tracked(c) => format!(
                "{}/live/{}/{}/{}.ts",
                normalize_server_url(&account.server),
                urlencoding::encode(&c.username),
                urlencoding::encode(&c.password),
                stream_id
            ),
            LeasedCredential::Legacy { username, password } => format!(
                "{}/live/{}/{}/{}.ts",
                normalize_server_url(&account.server),
                urlencoding::encode(username),
                urlencoding::encode(password),
                stream_id
            ),
        };

        // Long-lived relay; only connection setup is bounded
        let client = reqwest::Client::builder()
            .user_agent(account.user_agent.clone())
            .connect_timeout(Duration::from_secs(15))
            .build()?;

        let response = match client.get(&upstream_url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                let status = response.status();
                connections.release_connection(&session_token).await.ok();
                return Err(crate::errors::SourceError::Http {
                    status: status.as_u16(),
                    message: format!("upstream stream {stream_id}"),
                }
                .into());
            }
            Err(e) => {
                connections.release_connection(&session_token).await.ok();
                return Err(e.into());
            }
        };

        debug!(
            "Opened upstream stream {} for account {} (session {}...)",
            stream_id,
            account.name,
            &session_token[..8]
        );

        Ok(Self {
            connections,
            session_token: Some(session_token),
            response,
            last_heartbeat: Instant::now(),
        })
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Next chunk of upstream bytes, heartbeating the session every few
    /// seconds. `None` means the upstream closed the stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, AppError> {
        let chunk = self.response.chunk().await?;

        if self.last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
            if let Some(token) = &self.session_token {
                if let Err(e) = self.connections.update_activity(token).await {
                    warn!("Failed to heartbeat stream session: {}", e);
                }
            }
            self.last_heartbeat = Instant::now();
        }

        Ok(chunk)
    }

    /// Release the session explicitly.
    pub async fn close(mut self) {
        if let Some(token) = self.session_token.take() {
            if let Err(e) = self.connections.release_connection(&token).await {
                warn!("Failed to release stream session: {}", e);
            }
        }
    }
}

impl Drop for ProxyStream {
    fn drop(&mut self) {
        // Backstop when close() was skipped; stale-session reaping would
        // catch it anyway after the activity timeout
        if let Some(token) = self.session_token.take() {
            let connections = self.connections.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    connections.release_connection(&token).await.ok();
                });
            }
        }
    }
}
