//! EPG source synchronization.
//!
//! For each enabled EPG source: fetch XMLTV (from the provider's endpoint
//! or an arbitrary URL), parse it and upsert the channel catalog. Schedules
//! Direct sources are synced by an external collaborator and skipped here.

use crate::database::Database;
use crate::ingestor::xmltv::{parse_xmltv, to_channel_upserts};
use crate::ingestor::XtreamClient;
use crate::models::*;
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, warn};

const XMLTV_URL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct EpgSyncService {
    db: Database,
}

impl EpgSyncService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Sync every enabled EPG source, continuing past per-source failures.
    pub async fn sync_all_sources(&self) -> Result<Vec<(EpgSource, Result<EpgSyncStats>)>> {
        let sources = self.db.list_enabled_epg_sources().await?;
        info!("Syncing {} EPG source(s)", sources.len());

        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            let result = self.sync_source(&source).await;
            if let Err(e) = &result {
                error!("Error syncing EPG source {}: {}", source.name, e);
            }
            results.push((source, result));
        }
        Ok(results)
    }

    /// Fetch, parse and upsert one EPG source.
    pub async fn sync_source(&self, source: &EpgSource) -> Result<EpgSyncStats> {
        info!("Syncing EPG source: {} ({:?})", source.name, source.source_type);

        let content = match source.source_type {
            EpgSourceType::Provider => self.fetch_provider_xmltv(source).await?,
            EpgSourceType::XmltvUrl => self.fetch_url_xmltv(source).await?,
            EpgSourceType::SchedulesDirect => {
                warn!(
                    "Skipping Schedules Direct source {} - handled separately",
                    source.name
                );
                return Ok(EpgSyncStats::default());
            }
        };

        let document = match parse_xmltv(&content) {
            Ok(document) => document,
            Err(e) => {
                self.db
                    .set_epg_source_sync_outcome(source.id, "error", &e.to_string(), None)
                    .await?;
                return Err(e);
            }
        };

        let upserts = to_channel_upserts(&document);
        let stats = self
            .db
            .apply_epg_channel_sync(source.id, &upserts, Utc::now())
            .await?;

        let message = format!(
            "Synced {} channels, {} programs",
            upserts.len(),
            stats.total_programs
        );
        self.db
            .set_epg_source_sync_outcome(source.id, "success", &message, Some(upserts.len() as i64))
            .await?;

        info!(
            "EPG sync for source {} ({}): added={}, updated={}, programs={}",
            source.id, source.name, stats.channels_added, stats.channels_updated, stats.total_programs
        );
        Ok(stats)
    }

    async fn fetch_provider_xmltv(&self, source: &EpgSource) -> Result<String> {
        let account_id = source
            .account_id
            .ok_or_else(|| anyhow!("EPG source {} has no associated account", source.name))?;
        let account = self
            .db
            .get_account(account_id)
            .await?
            .ok_or_else(|| anyhow!("Account {} not found", account_id))?;
        let credential = self
            .db
            .primary_credential(&account)
            .await?
            .ok_or_else(|| anyhow!("Account {} has no usable credential", account.name))?;

        let client = XtreamClient::new(
            &account.server,
            credential.username(),
            credential.password(),
            &account.user_agent,
        )?;
        let bytes = client.get_xmltv().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn fetch_url_xmltv(&self, source: &EpgSource) -> Result<String> {
        let url = source
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("EPG source {} has no URL configured", source.name))?;

        let client = reqwest::Client::builder().timeout(XMLTV_URL_TIMEOUT).build()?;
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch XMLTV data: HTTP {}", response.status());
        }
        Ok(response.text().await?)
    }
}
