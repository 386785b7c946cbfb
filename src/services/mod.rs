// 服务层模块
pub mod backup;
pub mod batch;
pub mod catalog_client;
pub mod classifier;
pub mod diagnostics;
pub mod export;
pub mod pipeline;
pub mod purge;
pub mod service_control;
pub mod sync_monitor;

#[cfg(test)]
pub mod fakes;

pub use backup::{BackupManager, PruneReport};
pub use batch::{BatchProcessor, BatchProgress, BatchSummary};
pub use catalog_client::{CatalogClient, HttpCatalogClient};
pub use classifier::{Classification, ClassificationReport, UpdateClassifier, classify};
pub use diagnostics::ConnectDiagnostics;
pub use export::{ExportEngine, ExportRequest};
pub use pipeline::Pipeline;
pub use purge::{DeepCleanReport, PurgeEngine};
pub use service_control::{CommandServiceControl, ServiceControl};
pub use sync_monitor::{SyncMonitor, SyncReport};
