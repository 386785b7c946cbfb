use chrono::{Local, NaiveDate};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};
use tracing::{debug, info};

use crate::{
    config::BackupConfig,
    database::{SqlExecutor, statements},
    error::{AppError, AppResult},
    models::{BackupDescriptor, MaintenanceRun},
};

const BACKUP_EXTENSION: &str = "bak";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: u32,
    pub freed_bytes: u64,
}

impl PruneReport {
    pub fn freed_mb(&self) -> f64 {
        self.freed_bytes as f64 / 1024.0 / 1024.0
    }
}

/// 只识别 `next_backup_path` 生成的文件名：`{prefix}_YYYYMMDD[_n].bak`
fn is_backup_file(path: &Path, prefix: &str) -> bool {
    let is_bak = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(BACKUP_EXTENSION));
    let Some(rest) = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix(prefix))
        .and_then(|s| s.strip_prefix('_'))
    else {
        return false;
    };
    let (date, counter) = match rest.split_once('_') {
        Some((date, n)) => (date, Some(n)),
        None => (rest, None),
    };
    is_bak
        && date.len() == 8
        && NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
        && counter.is_none_or(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// 生成当日备份文件名，同名存在时追加 `_1`、`_2`……
pub fn next_backup_path(dir: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    let stem = format!("{}_{}", prefix, date.format("%Y%m%d"));
    let first = dir.join(format!("{}.{}", stem, BACKUP_EXTENSION));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| dir.join(format!("{}_{}.{}", stem, n, BACKUP_EXTENSION)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// 目录中修改时间最新的、以 `prefix` 命名的备份文件
pub async fn latest_backup(dir: &Path, prefix: &str) -> AppResult<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_backup_file(&path, prefix) {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified()?;
        if latest.as_ref().is_none_or(|(t, _)| modified > *t) {
            latest = Some((modified, path));
        }
    }
    Ok(latest.map(|(_, p)| p))
}

/// 数据库完整备份与保留清理
pub struct BackupManager {
    sql: Arc<dyn SqlExecutor>,
    config: BackupConfig,
    database: String,
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(
        sql: Arc<dyn SqlExecutor>,
        config: BackupConfig,
        database: String,
        backup_dir: PathBuf,
    ) -> Self {
        Self {
            sql,
            config,
            database,
            backup_dir,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn file_prefix(&self) -> &str {
        &self.config.file_prefix
    }

    pub async fn backup(&self) -> AppResult<BackupDescriptor> {
        self.backup_on(Local::now().date_naive()).await
    }

    /// 备份不设超时，可能持续很久
    pub async fn backup_on(&self, date: NaiveDate) -> AppResult<BackupDescriptor> {
        tokio::fs::create_dir_all(&self.backup_dir).await?;
        let target = next_backup_path(&self.backup_dir, &self.config.file_prefix, date);
        info!(database = %self.database, target = %target.display(), "开始数据库备份");

        let started = Instant::now();
        self.sql
            .execute(&statements::backup_database(&self.database, &target))
            .await?;
        let duration_seconds = started.elapsed().as_secs_f64();

        let size = tokio::fs::metadata(&target)
            .await
            .map_err(|e| {
                AppError::sql(format!(
                    "备份命令已完成但未找到备份文件 {}: {}",
                    target.display(),
                    e
                ))
            })?
            .len();

        let descriptor = BackupDescriptor {
            file_path: target,
            size_mb: size as f64 / 1024.0 / 1024.0,
            duration_seconds,
        };
        info!(
            file = %descriptor.file_path.display(),
            size_mb = format!("{:.2}", descriptor.size_mb),
            duration_secs = format!("{:.1}", descriptor.duration_seconds),
            "数据库备份完成"
        );
        Ok(descriptor)
    }

    pub async fn prune(
        &self,
        keep: Option<&Path>,
        run: &mut MaintenanceRun,
    ) -> AppResult<PruneReport> {
        self.prune_at(keep, SystemTime::now(), run).await
    }

    /// 删除修改时间早于保留窗口的备份；`keep` 指定的文件永不删除
    pub async fn prune_at(
        &self,
        keep: Option<&Path>,
        now: SystemTime,
        run: &mut MaintenanceRun,
    ) -> AppResult<PruneReport> {
        let window = Duration::from_secs(u64::from(self.config.retention_days) * 86_400);
        let cutoff = now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = PruneReport::default();

        let mut entries = tokio::fs::read_dir(&self.backup_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_backup_file(&path, &self.config.file_prefix) || keep.is_some_and(|k| k == path)
            {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() || meta.modified()? >= cutoff {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(file = %path.display(), "已删除过期备份");
                    report.deleted += 1;
                    report.freed_bytes += meta.len();
                }
                Err(e) => run.warn(format!("删除过期备份 {} 失败: {}", path.display(), e)),
            }
        }

        info!(
            deleted = report.deleted,
            freed_mb = format!("{:.2}", report.freed_mb()),
            retention_days = self.config.retention_days,
            "备份保留清理完成"
        );
        Ok(report)
    }
}
