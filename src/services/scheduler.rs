//! Periodic job scheduling.
//!
//! Three cooperating loops: account catalog sync, EPG source sync and FCC
//! dataset sync. Last-run markers persist in `sync_metadata`, so a restart
//! resumes the cadence instead of resetting it; a job is run when
//! `now - last_run >= interval`. Intervals can be overridden at runtime
//! through the same metadata keys. A short startup delay (plus jitter) lets
//! the process finish starting before the first pass.

use crate::config::SyncConfig;
use crate::database::Database;
use crate::services::epg_sync::EpgSyncService;
use crate::services::fcc_sync::{FccDataFetcher, FccSyncService};
use crate::services::sync::SyncService;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

const TICK_SECONDS: u64 = 60;

const LAST_ACCOUNT_SYNC: &str = "last_account_sync";
const LAST_EPG_SYNC: &str = "last_epg_sync";
const LAST_FCC_SYNC: &str = "last_fcc_sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Catalog,
    Epg,
    Fcc,
}

impl JobKind {
    fn marker(&self) -> &'static str {
        match self {
            Self::Catalog => LAST_ACCOUNT_SYNC,
            Self::Epg => LAST_EPG_SYNC,
            Self::Fcc => LAST_FCC_SYNC,
        }
    }

    fn interval_key(&self) -> &'static str {
        match self {
            Self::Catalog => "sync.account_interval_hours",
            Self::Epg => "sync.epg_interval_hours",
            Self::Fcc => "sync.fcc_interval_hours",
        }
    }
}

pub struct Scheduler {
    db: Database,
    config: SyncConfig,
    sync: SyncService,
    epg: EpgSyncService,
    fcc: FccSyncService,
    fcc_fetcher: Option<Arc<dyn FccDataFetcher>>,
    shutdown: watch::Sender<bool>,
    // One guard per job kind; manual triggers share them so runs of the
    // same kind never interleave
    catalog_guard: Arc<Mutex<()>>,
    epg_guard: Arc<Mutex<()>>,
    fcc_guard: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(
        db: Database,
        config: SyncConfig,
        fcc_fetcher: Option<Arc<dyn FccDataFetcher>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            sync: SyncService::new(db.clone()),
            epg: EpgSyncService::new(db.clone()),
            fcc: FccSyncService::new(db.clone()),
            db,
            config,
            fcc_fetcher,
            shutdown,
            catalog_guard: Arc::new(Mutex::new(())),
            epg_guard: Arc::new(Mutex::new(())),
            fcc_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Spawn the three periodic loops.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(
            "Starting scheduler (account: {}h, epg: {}h, fcc: {}h)",
            self.config.account_interval_hours,
            self.config.epg_interval_hours,
            self.config.fcc_interval_hours
        );

        [JobKind::Catalog, JobKind::Epg, JobKind::Fcc]
            .into_iter()
            .map(|kind| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.run_loop(kind).await })
            })
            .collect()
    }

    /// Signal all loops to stop. In-flight jobs finish their current
    /// account and exit.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn run_loop(self: Arc<Self>, kind: JobKind) {
        let mut shutdown = self.shutdown.subscribe();

        // Startup delay with a little jitter so the loops do not stampede
        let initial =
            Duration::from_secs(self.config.initial_delay_seconds + fastrand::u64(0..10));
        tokio::select! {
            _ = sleep(initial) => {}
            _ = shutdown.changed() => return,
        }

        loop {
            match self.is_overdue(kind).await {
                Ok(true) => {
                    if let Err(e) = self.run_job(kind).await {
                        error!("Scheduled {:?} job failed: {}", kind, e);
                    }
                }
                Ok(false) => {
                    debug!("{:?} job not due yet", kind);
                }
                Err(e) => {
                    error!("Error checking {:?} schedule: {}", kind, e);
                }
            }

            tokio::select! {
                _ = sleep(Duration::from_secs(TICK_SECONDS)) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler {:?} loop stopping", kind);
                        return;
                    }
                }
            }
        }
    }

    async fn is_overdue(&self, kind: JobKind) -> Result<bool> {
        let default_hours = match kind {
            JobKind::Catalog => self.config.account_interval_hours,
            JobKind::Epg => self.config.epg_interval_hours,
            JobKind::Fcc => self.config.fcc_interval_hours,
        };
        let interval_hours = self
            .db
            .get_metadata_i64(kind.interval_key(), default_hours)
            .await?;

        match self.db.get_last_run(kind.marker()).await? {
            Some(last_run) => {
                Ok(Utc::now() - last_run >= ChronoDuration::hours(interval_hours.max(1)))
            }
            None => Ok(true),
        }
    }

    async fn run_job(&self, kind: JobKind) -> Result<()> {
        match kind {
            JobKind::Catalog => self.run_catalog_sync().await,
            JobKind::Epg => self.run_epg_sync().await,
            JobKind::Fcc => self.run_fcc_sync().await,
        }
    }

    /// Sync all accounts now and advance the marker. Also the entry point
    /// for manual triggers.
    pub async fn run_catalog_sync(&self) -> Result<()> {
        let _guard = self.catalog_guard.lock().await;
        info!("Starting scheduled account sync at {}", Utc::now());

        let results = self.sync.sync_all_accounts().await?;
        for stats in &results {
            if !stats.success {
                error!(
                    "Account {} sync failed: {:?}",
                    stats.account_name, stats.errors
                );
            }
        }

        self.db.set_last_run(LAST_ACCOUNT_SYNC, Utc::now()).await?;
        info!("Scheduled account sync completed ({} accounts)", results.len());
        Ok(())
    }

    /// Sync all EPG sources now and advance the marker.
    pub async fn run_epg_sync(&self) -> Result<()> {
        let _guard = self.epg_guard.lock().await;
        info!("Starting scheduled EPG sync at {}", Utc::now());

        self.epg.sync_all_sources().await?;

        self.db.set_last_run(LAST_EPG_SYNC, Utc::now()).await?;
        info!("Scheduled EPG sync completed");
        Ok(())
    }

    /// Refresh the FCC dataset now and advance the marker. Without a
    /// configured fetcher the job is a no-op; existing data stays in place.
    pub async fn run_fcc_sync(&self) -> Result<()> {
        let _guard = self.fcc_guard.lock().await;

        let Some(fetcher) = &self.fcc_fetcher else {
            debug!("No FCC fetcher configured, skipping FCC sync");
            self.db.set_last_run(LAST_FCC_SYNC, Utc::now()).await?;
            return Ok(());
        };

        info!("Starting scheduled FCC sync at {}", Utc::now());
        self.fcc.full_sync(fetcher.as_ref()).await?;

        self.db.set_last_run(LAST_FCC_SYNC, Utc::now()).await?;
        info!("Scheduled FCC sync completed");
        Ok(())
    }
}
