use chrono::{Datelike, Local, NaiveDate};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::info;

use super::backup::latest_backup;
use crate::{
    config::ExportConfig,
    error::{AppError, AppResult},
    models::{ExportDescriptor, MaintenanceRun},
    storage::{FileSync, SyncOptions, SyncOutcome},
};

const WRITE_PROBE: &str = ".patchfarm-write-probe";
const DEFAULT_CONTENT_DIR_NAME: &str = "WsusContent";

/// 导出源与目标
#[derive(Debug, Clone)]
pub struct ExportRequest<'a> {
    pub content_dir: &'a Path,
    pub backup_dir: &'a Path,
    pub backup_prefix: &'a str,
    pub export_root: &'a Path,
    pub window_days: u32,
}

#[derive(Debug, Default)]
struct Totals {
    files: u64,
    bytes: u64,
}

impl Totals {
    fn add(&mut self, outcome: &SyncOutcome) {
        self.files += outcome.files_copied;
        self.bytes += outcome.bytes_copied;
    }
}

/// 归档目录：`<root>/<YYYY>/<YYYY-MM-DD>`
pub fn archive_path(export_root: &Path, date: NaiveDate) -> PathBuf {
    export_root
        .join(date.year().to_string())
        .join(date.format("%Y-%m-%d").to_string())
}

/// 差异导出：根目录滚动全量镜像 + 按日期归档的窗口增量
pub struct ExportEngine {
    sync: Arc<dyn FileSync>,
    config: ExportConfig,
}

impl ExportEngine {
    pub fn new(sync: Arc<dyn FileSync>, config: ExportConfig) -> Self {
        Self { sync, config }
    }

    fn base_options(&self) -> SyncOptions {
        SyncOptions {
            recurse: true,
            max_age_days: None,
            exclude_older: true,
            include_patterns: Vec::new(),
            exclude_patterns: self.config.exclude_patterns.clone(),
            threads: self.config.threads,
            retries: self.config.retries,
            retry_wait: Duration::from_millis(self.config.retry_wait_ms),
        }
    }

    fn backup_options(&self, file_name: &str) -> SyncOptions {
        SyncOptions {
            recurse: false,
            include_patterns: vec![file_name.to_string()],
            exclude_patterns: Vec::new(),
            ..self.base_options()
        }
    }

    async fn ensure_writable(root: &Path) -> AppResult<()> {
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            AppError::export(format!("无法创建导出目录 {}: {}", root.display(), e))
        })?;
        let probe = root.join(WRITE_PROBE);
        tokio::fs::write(&probe, b"probe").await.map_err(|e| {
            AppError::export(format!("导出目录不可写 {}: {}", root.display(), e))
        })?;
        let _ = tokio::fs::remove_file(&probe).await;
        Ok(())
    }

    async fn copy(
        &self,
        stage: &str,
        source: &Path,
        dest: &Path,
        options: &SyncOptions,
        totals: &mut Totals,
        run: &mut MaintenanceRun,
    ) -> AppResult<()> {
        let outcome = self.sync.sync(source, dest, options).await?;
        if !outcome.is_success() {
            run.warn(format!(
                "{} 复制部分失败: {} -> {}，退出码 {}，失败 {} 个文件",
                stage,
                source.display(),
                dest.display(),
                outcome.exit_code,
                outcome.files_failed
            ));
        }
        totals.add(&outcome);
        Ok(())
    }

    pub async fn export(
        &self,
        request: &ExportRequest<'_>,
        run: &mut MaintenanceRun,
    ) -> AppResult<ExportDescriptor> {
        self.export_on(request, Local::now().date_naive(), run).await
    }

    pub async fn export_on(
        &self,
        request: &ExportRequest<'_>,
        date: NaiveDate,
        run: &mut MaintenanceRun,
    ) -> AppResult<ExportDescriptor> {
        let root = request.export_root;
        Self::ensure_writable(root).await?;

        let content_name = request
            .content_dir
            .file_name()
            .unwrap_or(OsStr::new(DEFAULT_CONTENT_DIR_NAME));
        let archive = archive_path(root, date);

        let backup = latest_backup(request.backup_dir, request.backup_prefix).await?;
        let backup_name = backup
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        if backup_name.is_none() {
            run.warn(format!(
                "{} 中没有可导出的备份文件，跳过备份复制",
                request.backup_dir.display()
            ));
        }

        let mut totals = Totals::default();

        // 根目录：最新备份 + 全量内容（只补缺/更新，不删除）
        if let Some(name) = &backup_name {
            self.copy(
                "根目录备份",
                request.backup_dir,
                root,
                &self.backup_options(name),
                &mut totals,
                run,
            )
            .await?;
        }
        self.copy(
            "根目录内容",
            request.content_dir,
            &root.join(content_name),
            &self.base_options(),
            &mut totals,
            run,
        )
        .await?;

        // 归档目录：同一备份 + 窗口期内修改过的内容
        if let Some(name) = &backup_name {
            self.copy(
                "归档备份",
                request.backup_dir,
                &archive,
                &self.backup_options(name),
                &mut totals,
                run,
            )
            .await?;
        }
        let windowed = SyncOptions {
            max_age_days: Some(request.window_days),
            ..self.base_options()
        };
        self.copy(
            "归档内容",
            request.content_dir,
            &archive.join(content_name),
            &windowed,
            &mut totals,
            run,
        )
        .await?;

        let descriptor = ExportDescriptor {
            root_path: root.to_path_buf(),
            archive_path: archive,
            file_count: totals.files,
            size_gb: totals.bytes as f64 / 1024.0 / 1024.0 / 1024.0,
            window_days: request.window_days,
        };
        info!(
            root = %descriptor.root_path.display(),
            archive = %descriptor.archive_path.display(),
            files = descriptor.file_count,
            size_gb = format!("{:.3}", descriptor.size_gb),
            window_days = descriptor.window_days,
            "差异导出完成"
        );
        Ok(descriptor)
    }
}
