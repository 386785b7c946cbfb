use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{batch::BatchProcessor, service_control::ServiceControl};
use crate::{
    config::PurgeConfig,
    database::{SqlExecutor, statements},
    error::{AppError, AppResult},
    models::MaintenanceRun,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupersessionReport {
    pub declined_rows: u64,
    pub superseded_rows: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub candidates: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub rebuilt: u32,
    pub reorganized: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeepCleanReport {
    pub supersession: SupersessionReport,
    pub purge: PurgeReport,
    pub indexes: IndexReport,
    pub shrunk: bool,
    pub database_size_gb: Option<f64>,
}

/// 目录数据库清理与优化
pub struct PurgeEngine {
    sql: Arc<dyn SqlExecutor>,
    config: PurgeConfig,
    database: String,
}

impl PurgeEngine {
    pub fn new(sql: Arc<dyn SqlExecutor>, config: PurgeConfig, database: String) -> Self {
        Self {
            sql,
            config,
            database,
        }
    }

    pub async fn database_size_gb(&self) -> AppResult<Option<f64>> {
        self.sql
            .execute(&statements::database_size_gb())
            .await?
            .scalar_f64()
    }

    pub async fn declined_ids(&self) -> AppResult<Vec<i64>> {
        self.sql
            .execute(&statements::declined_update_ids())
            .await?
            .column_i64(0)
    }

    /// 按行数上限分轮删除，直到某轮删除数不足上限
    async fn delete_in_rounds(
        &self,
        kind: &str,
        make: fn(u32) -> crate::database::SqlCommand,
        run: &mut MaintenanceRun,
    ) -> AppResult<u64> {
        let limit = self.config.supersession_row_limit;
        let mut total = 0u64;
        for round in 1..=self.config.supersession_max_rounds {
            let deleted = self
                .sql
                .execute(&make(limit))
                .await?
                .scalar_i64()?
                .unwrap_or(0)
                .max(0) as u64;
            total += deleted;
            debug!(kind, round, deleted, total, "取代关系清理");
            if deleted < u64::from(limit) {
                return Ok(total);
            }
        }
        run.warn(format!(
            "{} 取代关系清理达到最大轮数 {}，剩余记录留待下次运行",
            kind, self.config.supersession_max_rounds
        ));
        Ok(total)
    }

    pub async fn remove_supersession(
        &self,
        run: &mut MaintenanceRun,
    ) -> AppResult<SupersessionReport> {
        let declined_rows = self
            .delete_in_rounds("declined", statements::remove_declined_supersession, run)
            .await?;
        let superseded_rows = self
            .delete_in_rounds("superseded", statements::remove_superseded_supersession, run)
            .await?;
        info!(declined_rows, superseded_rows, "取代关系记录清理完成");
        Ok(SupersessionReport {
            declined_rows,
            superseded_rows,
        })
    }

    async fn delete_one(&self, id: i64) -> bool {
        let command = statements::delete_update(id, self.config.delete_timeout_secs);
        match self.sql.execute(&command).await {
            Ok(_) => true,
            Err(e) => {
                debug!(id, error = %e, "删除更新失败，跳过");
                false
            }
        }
    }

    /// 逐条调用官方存储过程删除；单条失败忽略，最后汇总一条警告
    pub async fn purge(&self, ids: &[i64], run: &mut MaintenanceRun) -> PurgeReport {
        if ids.is_empty() {
            info!("没有需要清除的已拒绝更新");
            return PurgeReport::default();
        }
        info!(count = ids.len(), batch_size = self.config.batch_size, "开始清除已拒绝更新");

        let engine = self;
        let summary = BatchProcessor::new(self.config.batch_size, self.config.progress_every_batches)
            .with_label("purge")
            .for_each_batch(ids, move |id| engine.delete_one(id))
            .await;

        if summary.failed > 0 {
            run.warn(format!(
                "{} 条已拒绝更新删除失败（共 {} 条），将在下次运行重试",
                summary.failed, summary.total
            ));
        }
        info!(deleted = summary.succeeded, failed = summary.failed, "已拒绝更新清除完成");
        PurgeReport {
            candidates: summary.total,
            deleted: summary.succeeded,
            failed: summary.failed,
        }
    }

    /// 碎片率高于重建阈值的索引重建，其余超过整理阈值的索引重组
    pub async fn optimize_indexes(&self, run: &mut MaintenanceRun) -> AppResult<IndexReport> {
        let rows = self
            .sql
            .execute(&statements::fragmented_indexes(
                self.config.reorganize_threshold_percent,
                self.config.min_index_pages,
            ))
            .await?;

        let mut report = IndexReport::default();
        for row in rows.rows() {
            let [schema, table, index, fragmentation] = row.as_slice() else {
                warn!(?row, "索引碎片查询结果格式异常");
                continue;
            };
            let fragmentation: f64 = fragmentation.parse().map_err(|e| {
                AppError::sql(format!("无法解析碎片率 '{}': {}", fragmentation, e))
            })?;

            let rebuild = fragmentation > self.config.rebuild_threshold_percent;
            let command = if rebuild {
                statements::rebuild_index(schema, table, index)
            } else {
                statements::reorganize_index(schema, table, index)
            };
            match self.sql.execute(&command).await {
                Ok(_) if rebuild => report.rebuilt += 1,
                Ok(_) => report.reorganized += 1,
                Err(e) => {
                    report.failed += 1;
                    run.warn(format!("索引 {}.{}.{} 维护失败: {}", schema, table, index, e));
                }
            }
        }

        info!(
            rebuilt = report.rebuilt,
            reorganized = report.reorganized,
            failed = report.failed,
            "索引维护完成"
        );
        Ok(report)
    }

    pub async fn update_statistics(&self) -> AppResult<()> {
        self.sql.execute(&statements::update_statistics()).await?;
        info!("统计信息已更新");
        Ok(())
    }

    /// 可回收空间超过阈值时收缩数据库，返回是否执行了收缩
    pub async fn reclaim_space(&self) -> AppResult<bool> {
        let reclaimable = self
            .sql
            .execute(&statements::reclaimable_space_mb())
            .await?
            .scalar_f64()?
            .unwrap_or(0.0);

        if reclaimable <= self.config.min_reclaim_mb {
            info!(
                reclaimable_mb = reclaimable,
                threshold_mb = self.config.min_reclaim_mb,
                "可回收空间不足，跳过收缩"
            );
            return Ok(false);
        }

        info!(reclaimable_mb = reclaimable, "开始收缩数据库");
        self.sql
            .execute(&statements::shrink_database(&self.database))
            .await?;
        Ok(true)
    }

    /// 在线优化（Cleanup 阶段）：索引维护 + 统计信息
    pub async fn online_optimize(&self, run: &mut MaintenanceRun) -> AppResult<IndexReport> {
        let indexes = self.optimize_indexes(run).await?;
        self.update_statistics().await?;
        Ok(indexes)
    }

    async fn deep_clean(&self, run: &mut MaintenanceRun) -> AppResult<DeepCleanReport> {
        let supersession = self.remove_supersession(run).await?;
        let ids = self.declined_ids().await?;
        let purge = self.purge(&ids, run).await;
        let indexes = self.optimize_indexes(run).await?;
        self.update_statistics().await?;
        let shrunk = self.reclaim_space().await?;
        let database_size_gb = match self.database_size_gb().await {
            Ok(size) => size,
            Err(e) => {
                run.warn(format!("读取数据库大小失败: {}", e));
                None
            }
        };
        Ok(DeepCleanReport {
            supersession,
            purge,
            indexes,
            shrunk,
            database_size_gb,
        })
    }

    /// 深度清理：停止目录服务后独占数据库执行，结束后总是尝试重启服务
    pub async fn ultimate_cleanup(
        &self,
        service: &dyn ServiceControl,
        run: &mut MaintenanceRun,
    ) -> AppResult<DeepCleanReport> {
        let result = match service.stop().await {
            Ok(()) => self.deep_clean(run).await,
            Err(e) => Err(e),
        };

        if let Err(e) = service.start().await {
            run.fail(format!("深度清理后重启目录服务失败: {}", e));
        }

        let report = result?;
        if let Some(size) = report.database_size_gb {
            run.database_size_gb = Some(size);
        }
        info!(
            purged = report.purge.deleted,
            shrunk = report.shrunk,
            size_gb = ?report.database_size_gb,
            "深度清理完成"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::SqlRows,
        services::fakes::{FakeService, FakeSql},
    };
    use chrono::Utc;

    fn config() -> PurgeConfig {
        PurgeConfig {
            batch_size: 2,
            supersession_row_limit: 10,
            supersession_max_rounds: 3,
            ..PurgeConfig::default()
        }
    }

    fn engine(sql: Arc<FakeSql>) -> PurgeEngine {
        PurgeEngine::new(sql, config(), "SUSDB".to_string())
    }

    #[tokio::test]
    async fn test_purge_swallows_record_failures() {
        let sql = Arc::new(FakeSql::default());
        sql.fail_delete_of(3);
        let mut run = MaintenanceRun::new(Utc::now());

        let report = engine(sql.clone()).purge(&[1, 2, 3, 4, 5], &mut run).await;

        assert_eq!(report.deleted, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(sql.count_containing("spDeleteUpdate"), 5);
        assert_eq!(run.warnings.len(), 1);
        assert!(run.errors.is_empty());
    }

    #[tokio::test]
    async fn test_supersession_rounds_stop_on_short_round() {
        let sql = Arc::new(FakeSql::default());
        sql.respond("IsDeclined = 1); SELECT", Ok(SqlRows::scalar("4")));
        sql.respond("IsLatestRevision = 0", Ok(SqlRows::scalar("10")));
        let mut run = MaintenanceRun::new(Utc::now());

        let report = engine(sql.clone())
            .remove_supersession(&mut run)
            .await
            .unwrap();

        assert_eq!(report.declined_rows, 4);
        assert_eq!(report.superseded_rows, 30);
        assert_eq!(sql.count_containing("IsLatestRevision = 0"), 3);
        assert_eq!(run.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_index_thresholds() {
        let sql = Arc::new(FakeSql::default());
        sql.respond(
            "dm_db_index_physical_stats",
            Ok(SqlRows::new(vec![
                vec!["dbo".into(), "tbUpdate".into(), "c1".into(), "45.0".into()],
                vec!["dbo".into(), "tbRevision".into(), "nc2".into(), "18.5".into()],
            ])),
        );
        let mut run = MaintenanceRun::new(Utc::now());

        let report = engine(sql.clone()).optimize_indexes(&mut run).await.unwrap();

        assert_eq!(report.rebuilt, 1);
        assert_eq!(report.reorganized, 1);
        assert_eq!(sql.count_containing("[c1] ON [dbo].[tbUpdate] REBUILD"), 1);
        assert_eq!(sql.count_containing("[nc2] ON [dbo].[tbRevision] REORGANIZE"), 1);
    }

    #[tokio::test]
    async fn test_shrink_only_above_threshold() {
        let sql = Arc::new(FakeSql::default());
        sql.respond("FILEPROPERTY", Ok(SqlRows::scalar("80.5")));
        assert!(!engine(sql.clone()).reclaim_space().await.unwrap());
        assert_eq!(sql.count_containing("SHRINKDATABASE"), 0);

        let sql = Arc::new(FakeSql::default());
        sql.respond("FILEPROPERTY", Ok(SqlRows::scalar("512.0")));
        assert!(engine(sql.clone()).reclaim_space().await.unwrap());
        assert_eq!(sql.count_containing("SHRINKDATABASE ([SUSDB], 10)"), 1);
    }

    #[tokio::test]
    async fn test_ultimate_cleanup_restarts_service_after_failure() {
        let sql = Arc::new(FakeSql::default());
        sql.respond("LocalUpdateID FROM", Err(AppError::sql("timeout")));
        let service = FakeService::default();
        let mut run = MaintenanceRun::new(Utc::now());

        let result = engine(sql).ultimate_cleanup(&service, &mut run).await;

        assert!(result.is_err());
        assert_eq!(service.calls(), vec!["stop", "start"]);
    }

    #[tokio::test]
    async fn test_ultimate_cleanup_sequence() {
        let sql = Arc::new(FakeSql::default());
        sql.respond("LocalUpdateID FROM", Ok(SqlRows::new(vec![vec!["7".into()]])));
        sql.respond("sys.database_files WHERE type", Ok(SqlRows::scalar("500")));
        sql.respond("FROM sys.database_files", Ok(SqlRows::scalar("4.250")));
        let service = FakeService::default();
        let mut run = MaintenanceRun::new(Utc::now());

        let report = engine(sql.clone())
            .ultimate_cleanup(&service, &mut run)
            .await
            .unwrap();

        assert_eq!(report.purge.deleted, 1);
        assert!(report.shrunk);
        assert_eq!(run.database_size_gb, Some(4.25));
        assert_eq!(service.calls(), vec!["stop", "start"]);

        let executed = sql.executed();
        let position = |needle: &str| executed.iter().position(|s| s.contains(needle)).unwrap();
        assert!(position("tbRevisionSupersedesUpdate") < position("spDeleteUpdate"));
        assert!(position("spDeleteUpdate") < position("sp_updatestats"));
        assert!(position("sp_updatestats") < position("SHRINKDATABASE"));
    }

    #[tokio::test]
    async fn test_failed_restart_is_error() {
        let sql = Arc::new(FakeSql::default());
        let service = FakeService::failing_start();
        let mut run = MaintenanceRun::new(Utc::now());

        let result = engine(sql).ultimate_cleanup(&service, &mut run).await;

        assert!(result.is_ok());
        assert_eq!(run.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_failure_skips_deep_clean_but_restarts() {
        let sql = Arc::new(FakeSql::default());
        sql.respond("LocalUpdateID FROM", Ok(SqlRows::new(vec![vec!["7".into()]])));
        let service = FakeService::failing_stop();
        let mut run = MaintenanceRun::new(Utc::now());

        let result = engine(sql.clone())
            .ultimate_cleanup(&service, &mut run)
            .await;

        assert!(matches!(result, Err(AppError::Service(_))));
        assert_eq!(service.calls(), vec!["stop", "start"]);
        assert_eq!(sql.count_containing("tbRevisionSupersedesUpdate"), 0);
        assert_eq!(sql.count_containing("spDeleteUpdate"), 0);
        assert!(sql.executed().is_empty());
    }
}
