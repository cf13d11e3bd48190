pub mod analyzer;
pub mod connection_manager;
pub mod epg_sync;
pub mod fcc_sync;
pub mod filtering;
pub mod health_monitor;
pub mod scheduler;
pub mod sync;

pub use analyzer::{FfprobeAnalyzer, StreamAnalyzer};
pub use connection_manager::ConnectionManager;
pub use epg_sync::EpgSyncService;
pub use fcc_sync::{FccDataFetcher, FccSyncService};
pub use filtering::FilterService;
pub use health_monitor::HealthMonitor;
pub use scheduler::Scheduler;
pub use sync::SyncService;
