use std::sync::Arc;
use tracing::{debug, info, warn};

use super::catalog_client::CatalogClient;
use crate::{
    config::SyncConfig,
    error::AppResult,
    models::{MaintenanceRun, SyncResult, SyncStatus},
};

/// 同步执行摘要
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// 是否在轮询次数内结束
    pub completed: bool,
    pub polls: u32,
    pub result: Option<SyncResult>,
}

/// 触发目录同步并轮询直至结束或超时
pub struct SyncMonitor {
    catalog: Arc<dyn CatalogClient>,
    config: SyncConfig,
}

impl SyncMonitor {
    pub fn new(catalog: Arc<dyn CatalogClient>, config: SyncConfig) -> Self {
        Self { catalog, config }
    }

    /// 触发失败为阶段错误；超时与非成功结果只记警告
    pub async fn run_sync(&self, run: &mut MaintenanceRun) -> AppResult<SyncReport> {
        self.catalog.trigger_sync().await?;
        info!(
            max_polls = self.config.timeout_iterations,
            interval_secs = self.config.poll_interval_secs,
            "已触发目录同步"
        );

        tokio::time::sleep(self.config.initial_grace()).await;

        let mut polls = 0u32;
        let mut completed = false;
        while polls < self.config.timeout_iterations {
            polls += 1;
            match self.catalog.get_sync_status().await {
                Ok(SyncStatus::NotProcessing) => {
                    completed = true;
                    break;
                }
                Ok(status) => debug!(poll = polls, ?status, "同步进行中"),
                Err(e) => warn!(poll = polls, error = %e, "查询同步状态失败，继续轮询"),
            }
            if polls < self.config.timeout_iterations {
                tokio::time::sleep(self.config.poll_interval()).await;
            }
        }

        if !completed {
            // 同步仍在进行，读到的是上一次同步的结果，只用于补充警告信息
            let last = match self.catalog.get_last_sync_result().await {
                Ok(result) => format!(
                    "上次同步结果 {}: {}",
                    result.result,
                    result.error.as_deref().unwrap_or("无错误信息")
                ),
                Err(e) => format!("读取同步结果失败: {}", e),
            };
            run.warn(format!(
                "目录同步在 {} 次轮询后仍未完成（{}），继续后续阶段",
                polls, last
            ));
            return Ok(SyncReport {
                completed,
                polls,
                result: None,
            });
        }

        let result = match self.catalog.get_last_sync_result().await {
            Ok(result) => {
                if result.succeeded() {
                    info!(
                        new = result.new_count,
                        revised = result.revised_count,
                        "目录同步成功"
                    );
                } else {
                    run.warn(format!(
                        "目录同步结果为 {}: {}",
                        result.result,
                        result.error.as_deref().unwrap_or("无错误信息")
                    ));
                }
                Some(result)
            }
            Err(e) => {
                run.warn(format!("读取同步结果失败: {}", e));
                None
            }
        };

        Ok(SyncReport {
            completed,
            polls,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        models::{CleanupSummary, ServerInfo, UpdateRecord},
    };
    use chrono::Utc;
    use mockall::mock;

    mock! {
        pub Catalog {}

        #[async_trait::async_trait]
        impl CatalogClient for Catalog {
            async fn server_info(&self) -> AppResult<ServerInfo>;
            async fn get_all_records(&self) -> AppResult<Vec<UpdateRecord>>;
            async fn decline(&self, id: &str) -> AppResult<()>;
            async fn approve(&self, id: &str, target_group: &str) -> AppResult<()>;
            async fn trigger_sync(&self) -> AppResult<()>;
            async fn get_sync_status(&self) -> AppResult<SyncStatus>;
            async fn get_last_sync_result(&self) -> AppResult<SyncResult>;
            async fn run_server_cleanup(&self) -> AppResult<CleanupSummary>;
        }
    }

    fn fast_config(iterations: u32) -> SyncConfig {
        SyncConfig {
            timeout_iterations: iterations,
            poll_interval_secs: 0,
            initial_grace_secs: 0,
        }
    }

    fn sync_result(result: &str, error: Option<&str>) -> SyncResult {
        SyncResult {
            result: result.to_string(),
            new_count: 4,
            revised_count: 2,
            error: error.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_completes_when_not_processing() {
        let mut catalog = MockCatalog::new();
        catalog.expect_trigger_sync().times(1).returning(|| Ok(()));
        let mut seq = mockall::Sequence::new();
        catalog
            .expect_get_sync_status()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Ok(SyncStatus::Running));
        catalog
            .expect_get_sync_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(SyncStatus::NotProcessing));
        catalog
            .expect_get_last_sync_result()
            .times(1)
            .returning(|| Ok(sync_result("Succeeded", None)));

        let monitor = SyncMonitor::new(Arc::new(catalog), fast_config(120));
        let mut run = MaintenanceRun::new(Utc::now());
        let report = monitor.run_sync(&mut run).await.unwrap();

        assert!(report.completed);
        assert_eq!(report.polls, 3);
        assert!(run.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_warning() {
        let mut catalog = MockCatalog::new();
        catalog.expect_trigger_sync().returning(|| Ok(()));
        catalog
            .expect_get_sync_status()
            .times(5)
            .returning(|| Ok(SyncStatus::Running));
        catalog
            .expect_get_last_sync_result()
            .times(1)
            .returning(|| Ok(sync_result("Failed", Some("proxy refused"))));

        let monitor = SyncMonitor::new(Arc::new(catalog), fast_config(5));
        let mut run = MaintenanceRun::new(Utc::now());
        let report = monitor.run_sync(&mut run).await.unwrap();

        assert!(!report.completed);
        assert_eq!(report.polls, 5);
        assert!(report.result.is_none());
        assert_eq!(run.warnings.len(), 1);
        assert!(run.warnings[0].contains("proxy refused"));
        assert!(run.errors.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_does_not_sleep_after_last_poll() {
        let mut catalog = MockCatalog::new();
        catalog.expect_trigger_sync().returning(|| Ok(()));
        catalog
            .expect_get_sync_status()
            .times(1)
            .returning(|| Err(AppError::catalog("connection refused")));
        catalog
            .expect_get_last_sync_result()
            .returning(|| Err(AppError::catalog("connection refused")));

        let config = SyncConfig {
            timeout_iterations: 1,
            poll_interval_secs: 2,
            initial_grace_secs: 0,
        };
        let monitor = SyncMonitor::new(Arc::new(catalog), config);
        let mut run = MaintenanceRun::new(Utc::now());
        let started = std::time::Instant::now();
        let report = monitor.run_sync(&mut run).await.unwrap();

        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert!(!report.completed);
        assert_eq!(report.polls, 1);
        assert!(run.warnings[0].contains("读取同步结果失败"));
    }

    #[tokio::test]
    async fn test_failed_result_is_warning() {
        let mut catalog = MockCatalog::new();
        catalog.expect_trigger_sync().returning(|| Ok(()));
        catalog
            .expect_get_sync_status()
            .returning(|| Ok(SyncStatus::NotProcessing));
        catalog
            .expect_get_last_sync_result()
            .returning(|| Ok(sync_result("Failed", Some("upstream unreachable"))));

        let monitor = SyncMonitor::new(Arc::new(catalog), fast_config(10));
        let mut run = MaintenanceRun::new(Utc::now());
        monitor.run_sync(&mut run).await.unwrap();

        assert_eq!(run.warnings.len(), 1);
        assert!(run.warnings[0].contains("upstream unreachable"));
    }

    #[tokio::test]
    async fn test_trigger_failure_is_phase_error() {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_trigger_sync()
            .returning(|| Err(AppError::catalog("503")));
        catalog.expect_get_sync_status().times(0);

        let monitor = SyncMonitor::new(Arc::new(catalog), fast_config(10));
        let mut run = MaintenanceRun::new(Utc::now());
        assert!(monitor.run_sync(&mut run).await.is_err());
    }
}
