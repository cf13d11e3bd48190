//! Stream connection management.
//!
//! Many downstream clients multiplex over a small pool of provider
//! credentials. The credential row's `active_connections` is an advisory
//! cache; every decision recounts the live `active_streams` rows.

use crate::database::Database;
use crate::errors::ConnectionError;
use crate::models::*;
use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Seconds without a heartbeat before a session is considered stale.
pub const STREAM_TIMEOUT_SECONDS: i64 = 30;

#[derive(Clone)]
pub struct ConnectionManager {
    db: Database,
}

impl ConnectionManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Pick the least-loaded credential with free capacity, reaping stale
    /// sessions first. Accounts without credential rows fall back to their
    /// legacy username/password as an untracked single-connection credential.
    pub async fn get_available_credential(
        &self,
        account_id: Uuid,
    ) -> Result<Option<LeasedCredential>> {
        self.cleanup_stale_connections(Some(account_id), STREAM_TIMEOUT_SECONDS)
            .await?;

        let Some(account) = self.db.get_account(account_id).await? else {
            warn!("Account {} not found", account_id);
            return Ok(None);
        };
        if !account.enabled {
            warn!("Account {} is disabled", account_id);
            return Ok(None);
        }

        let mut credentials = self.db.list_enabled_credentials(account_id).await?;

        if credentials.is_empty() {
            if let (Some(username), Some(password)) = (&account.username, &account.password) {
                debug!("Using legacy credentials for account {}", account_id);
                return Ok(Some(LeasedCredential::Legacy {
                    username: username.clone(),
                    password: password.clone(),
                }));
            }
            return Ok(None);
        }

        // Authoritative counts from the live session rows
        for credential in credentials.iter_mut() {
            credential.active_connections =
                self.db.count_active_streams(credential.id).await? as i32;
        }

        let mut available: Vec<Credential> = credentials
            .into_iter()
            .filter(Credential::is_available)
            .collect();
        if available.is_empty() {
            warn!("No available credentials for account {}", account_id);
            return Ok(None);
        }

        available.sort_by_key(|c| c.active_connections);
        let selected = available.remove(0);
        debug!(
            "Selected credential {} for account {} ({}/{} connections)",
            selected.id, account_id, selected.active_connections, selected.max_connections
        );
        Ok(Some(LeasedCredential::Tracked(selected)))
    }

    /// Admit a new session on a credential. Returns the session token;
    /// legacy (untracked) acquisitions get a token without bookkeeping.
    pub async fn acquire_connection(
        &self,
        credential_id: Option<Uuid>,
        stream_id: &str,
        client_ip: Option<&str>,
    ) -> Result<String, ConnectionError> {
        let Some(credential_id) = credential_id else {
            return Ok(new_session_token());
        };

        let credential = self
            .db
            .get_credential(credential_id)
            .await
            .map_err(|_| ConnectionError::CredentialNotFound)?
            .ok_or(ConnectionError::CredentialNotFound)?;

        if !credential.enabled {
            return Err(ConnectionError::CredentialDisabled);
        }

        let active = self
            .db
            .count_active_streams(credential_id)
            .await
            .map_err(|_| ConnectionError::CredentialNotFound)?;
        if active >= credential.max_connections.max(1) as i64 {
            return Err(ConnectionError::NoSlots);
        }

        let session_token = new_session_token();
        self.db
            .insert_active_stream(credential_id, stream_id, client_ip, &session_token)
            .await
            .map_err(|_| ConnectionError::NoSlots)?;
        self.db
            .refresh_credential_connection_count(credential_id)
            .await
            .ok();

        info!(
            "Acquired connection for credential {}, stream {} (session: {}...)",
            credential_id,
            stream_id,
            &session_token[..8]
        );
        Ok(session_token)
    }

    /// Release a session and recount its credential.
    pub async fn release_connection(&self, session_token: &str) -> Result<bool> {
        if session_token.is_empty() {
            return Ok(false);
        }

        let Some(credential_id) = self.db.delete_active_stream(session_token).await? else {
            warn!("No active stream found for session {}...", &session_token[..session_token.len().min(8)]);
            return Ok(false);
        };

        self.db
            .refresh_credential_connection_count(credential_id)
            .await?;
        info!("Released connection for session {}...", &session_token[..8]);
        Ok(true)
    }

    /// Heartbeat a session while the downstream client is reading.
    pub async fn update_activity(&self, session_token: &str) -> Result<bool> {
        if session_token.is_empty() {
            return Ok(false);
        }
        self.db.touch_active_stream(session_token).await
    }

    /// Delete sessions idle past the timeout and recount their credentials.
    pub async fn cleanup_stale_connections(
        &self,
        account_id: Option<Uuid>,
        timeout_seconds: i64,
    ) -> Result<u64> {
        let cutoff = Utc::now() - Duration::seconds(timeout_seconds);
        let stale = self.db.list_stale_streams(account_id, cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        info!("Cleaning up {} stale connections", stale.len());
        let mut reaped = 0u64;
        for stream in stale {
            if self
                .db
                .delete_active_stream(&stream.session_token)
                .await?
                .is_some()
            {
                self.db
                    .refresh_credential_connection_count(stream.credential_id)
                    .await?;
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    /// Totals and per-credential state for an account.
    pub async fn get_connection_status(&self, account_id: Uuid) -> Result<ConnectionStatus> {
        let credentials = self.db.list_credentials(account_id).await?;

        if credentials.is_empty() {
            return Ok(ConnectionStatus {
                total_max_connections: 1,
                total_active_connections: 0,
                available_connections: 1,
                credentials: Vec::new(),
                legacy_mode: true,
            });
        }

        let mut details = Vec::with_capacity(credentials.len());
        let mut total_max = 0i64;
        let mut total_active = 0i64;

        for credential in credentials {
            let active = self.db.count_active_streams(credential.id).await?;
            total_max += credential.max_connections.max(1) as i64;
            total_active += active;
            details.push(CredentialConnectionStatus {
                id: credential.id,
                username: credential.username,
                max_connections: credential.max_connections.max(1),
                active_connections: active,
                enabled: credential.enabled,
                status: credential.status,
                exp_date: credential.exp_date,
            });
        }

        Ok(ConnectionStatus {
            total_max_connections: total_max,
            total_active_connections: total_active,
            available_connections: total_max - total_active,
            credentials: details,
            legacy_mode: false,
        })
    }

    /// Live sessions, optionally for one account.
    pub async fn get_active_streams(&self, account_id: Option<Uuid>) -> Result<Vec<ActiveStream>> {
        self.db.list_active_streams(account_id).await
    }
}

/// 64 hex characters of cryptographic randomness.
fn new_session_token() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_tokens_are_64_hex_chars_and_unique() {
        let first = new_session_token();
        let second = new_session_token();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }
}
