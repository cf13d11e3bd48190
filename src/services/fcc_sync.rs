//! FCC dataset synchronization.
//!
//! The archive download is delegated to an external fetcher (the dataset is
//! a slow-moving multi-hundred-megabyte dump behind a rate-limited server);
//! this service parses the fetched `facility.dat` bytes and upserts TV
//! facility records. Existing data stays in place when a fetch fails.

use crate::database::Database;
use crate::ingestor::fcc_data::parse_facility_data;
use crate::models::FccSyncStats;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Produces the raw bytes of `facility.dat`.
#[async_trait]
pub trait FccDataFetcher: Send + Sync {
    async fn fetch_facility_data(&self) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct FccSyncService {
    db: Database,
}

impl FccSyncService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Parse and upsert a fetched `facility.dat` dump.
    pub async fn sync_from_bytes(&self, data: &[u8]) -> Result<FccSyncStats> {
        let records = parse_facility_data(data);
        if records.is_empty() {
            anyhow::bail!("No TV facility records found in FCC data");
        }

        let stats = self.db.apply_fcc_facility_sync(&records).await?;
        info!(
            "FCC facility sync complete: added={}, updated={}, unchanged={}, errors={}",
            stats.added, stats.updated, stats.unchanged, stats.errors
        );
        Ok(stats)
    }

    /// Fetch via the external fetcher and sync.
    pub async fn full_sync(&self, fetcher: &dyn FccDataFetcher) -> Result<FccSyncStats> {
        let data = fetcher.fetch_facility_data().await?;
        self.sync_from_bytes(&data).await
    }
}
