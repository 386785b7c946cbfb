use chrono::Utc;
use std::{path::PathBuf, sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    backup::BackupManager,
    catalog_client::CatalogClient,
    classifier::UpdateClassifier,
    diagnostics::ConnectDiagnostics,
    export::{ExportEngine, ExportRequest},
    purge::PurgeEngine,
    service_control::ServiceControl,
    sync_monitor::SyncMonitor,
};
use crate::{
    config::{Config, PathsConfig},
    database::SqlExecutor,
    error::{AppError, AppResult},
    models::{MaintenancePlan, MaintenanceRun, Operation, PhaseName, PhaseStatus},
    storage::FileSync,
};

/// 单次运行内各阶段之间传递的状态
#[derive(Debug, Default)]
struct RunState {
    connected: bool,
    backup_file: Option<PathBuf>,
    cancelled: bool,
}

/// 维护流水线：按固定顺序串行执行各阶段并汇总结果
pub struct Pipeline {
    catalog: Arc<dyn CatalogClient>,
    service: Arc<dyn ServiceControl>,
    diagnostics: ConnectDiagnostics,
    sync_monitor: SyncMonitor,
    classifier: UpdateClassifier,
    purge: PurgeEngine,
    backup: BackupManager,
    export: ExportEngine,
    paths: PathsConfig,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        catalog: Arc<dyn CatalogClient>,
        sql: Arc<dyn SqlExecutor>,
        file_sync: Arc<dyn FileSync>,
        service: Arc<dyn ServiceControl>,
    ) -> Self {
        Self {
            diagnostics: ConnectDiagnostics::new(
                catalog.clone(),
                sql.clone(),
                config.health.clone(),
                config.paths.content_dir.clone(),
            ),
            sync_monitor: SyncMonitor::new(catalog.clone(), config.sync.clone()),
            classifier: UpdateClassifier::new(
                catalog.clone(),
                config.policy.clone(),
                config.catalog.approval_target_group.clone(),
            ),
            purge: PurgeEngine::new(sql.clone(), config.purge.clone(), config.sql.database.clone()),
            backup: BackupManager::new(
                sql,
                config.backup.clone(),
                config.sql.database.clone(),
                config.paths.backup_dir.clone(),
            ),
            export: ExportEngine::new(file_sync, config.export.clone()),
            paths: config.paths.clone(),
            catalog,
            service,
        }
    }

    /// 该阶段是否在本次计划中执行
    fn selected(phase: PhaseName, plan: &MaintenancePlan, state: &RunState) -> bool {
        match phase {
            PhaseName::Connect | PhaseName::Classification => true,
            PhaseName::Sync => plan.runs(Operation::Sync),
            PhaseName::Cleanup => plan.runs(Operation::Cleanup),
            PhaseName::UltimateCleanup => plan.runs(Operation::UltimateCleanup),
            PhaseName::Backup => plan.runs(Operation::Backup),
            PhaseName::RetentionPrune => {
                plan.runs(Operation::Backup) && state.backup_file.is_some()
            }
            PhaseName::Export => plan.runs(Operation::Export),
        }
    }

    pub async fn run(&self, plan: &MaintenancePlan, cancel: &CancellationToken) -> MaintenanceRun {
        let mut run = MaintenanceRun::new(Utc::now());
        let mut state = RunState::default();
        info!(
            run_id = %run.run_id,
            operations = ?plan.operations(),
            window_days = plan.export_window_days(),
            "维护流水线开始"
        );

        for phase in PhaseName::ORDER {
            if cancel.is_cancelled() && !state.cancelled {
                state.cancelled = true;
                run.fail(
                    AppError::cancelled(format!("未执行 {} 及后续阶段", phase)).to_string(),
                );
            }
            let runnable = !state.cancelled
                && (phase == PhaseName::Connect || state.connected)
                && Self::selected(phase, plan, &state);
            if !runnable {
                info!(phase = %phase, "跳过阶段");
                run.record_phase(phase, PhaseStatus::Skipped, 0.0);
                continue;
            }

            info!(phase = %phase, "阶段开始");
            let started = Instant::now();
            let status = match self.run_phase(phase, plan, &mut run, &mut state).await {
                Ok(()) => PhaseStatus::Completed,
                Err(e) => {
                    run.fail(format!("{} 阶段失败: {}", phase, e));
                    PhaseStatus::Failed
                }
            };
            let duration_secs = started.elapsed().as_secs_f64();
            info!(phase = %phase, status = %status, duration_secs, "阶段结束");
            run.record_phase(phase, status, duration_secs);

            if phase == PhaseName::Connect {
                state.connected = status == PhaseStatus::Completed;
                if !state.connected {
                    warn!("目录服务不可达，终止本次运行");
                }
            }
        }

        run.finalize(Utc::now());
        info!(
            run_id = %run.run_id,
            success = run.success,
            warnings = run.warnings.len(),
            errors = run.errors.len(),
            "维护流水线结束"
        );
        run
    }

    async fn run_phase(
        &self,
        phase: PhaseName,
        plan: &MaintenancePlan,
        run: &mut MaintenanceRun,
        state: &mut RunState,
    ) -> AppResult<()> {
        match phase {
            PhaseName::Connect => {
                self.diagnostics.check(run).await?;
            }
            PhaseName::Sync => {
                self.sync_monitor.run_sync(run).await?;
            }
            PhaseName::Classification => {
                let records = self.catalog.get_all_records().await?;
                let report = self.classifier.apply(&records, Utc::now(), run).await;
                run.declined_expired = report.declined_expired;
                run.declined_superseded = report.declined_superseded;
                run.declined_old = report.declined_old;
                run.approved = report.approved;
            }
            PhaseName::Cleanup => {
                let summary = self.catalog.run_server_cleanup().await?;
                info!(
                    obsolete_updates = summary.obsolete_updates_deleted,
                    compressed = summary.updates_compressed,
                    obsolete_computers = summary.obsolete_computers_deleted,
                    freed_bytes = summary.disk_space_freed,
                    "服务端清理完成"
                );
                self.purge.online_optimize(run).await?;
            }
            PhaseName::UltimateCleanup => {
                self.purge
                    .ultimate_cleanup(self.service.as_ref(), run)
                    .await?;
            }
            PhaseName::Backup => {
                let descriptor = self.backup.backup().await?;
                state.backup_file = Some(descriptor.file_path.clone());
                run.backup = Some(descriptor);
            }
            PhaseName::RetentionPrune => {
                self.backup
                    .prune(state.backup_file.as_deref(), run)
                    .await?;
            }
            PhaseName::Export => {
                let request = ExportRequest {
                    content_dir: &self.paths.content_dir,
                    backup_dir: self.backup.backup_dir(),
                    backup_prefix: self.backup.file_prefix(),
                    export_root: &self.paths.export_root,
                    window_days: plan.export_window_days(),
                };
                let descriptor = self.export.export(&request, run).await?;
                run.export = Some(descriptor);
            }
        }
        Ok(())
    }
}
