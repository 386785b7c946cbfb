use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use sysinfo::Disks;
use tracing::info;

use super::catalog_client::CatalogClient;
use crate::{
    config::HealthConfig,
    database::{SqlExecutor, statements},
    error::{AppError, AppResult},
    models::{MaintenanceRun, ServerInfo},
};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// 在挂载点列表中找到包含 `path` 的最长挂载点，返回其可用字节数
pub fn free_space_for(path: &Path, mounts: &[(PathBuf, u64)]) -> Option<u64> {
    mounts
        .iter()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, available)| *available)
}

fn system_mounts() -> Vec<(PathBuf, u64)> {
    Disks::new_with_refreshed_list()
        .list()
        .iter()
        .map(|d| (d.mount_point().to_path_buf(), d.available_space()))
        .collect()
}

/// 连接阶段检查：目录服务可达（致命），数据库大小与磁盘空间（仅告警）
pub struct ConnectDiagnostics {
    catalog: Arc<dyn CatalogClient>,
    sql: Arc<dyn SqlExecutor>,
    health: HealthConfig,
    content_dir: PathBuf,
}

impl ConnectDiagnostics {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        sql: Arc<dyn SqlExecutor>,
        health: HealthConfig,
        content_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            sql,
            health,
            content_dir,
        }
    }

    pub async fn check(&self, run: &mut MaintenanceRun) -> AppResult<ServerInfo> {
        let server = self
            .catalog
            .server_info()
            .await
            .map_err(|e| AppError::catalog(format!("无法连接目录服务: {}", e)))?;
        info!(server = %server.name, version = %server.version, "已连接目录服务");

        self.check_database_size(run).await;
        self.check_free_disk(run).await;
        Ok(server)
    }

    async fn check_database_size(&self, run: &mut MaintenanceRun) {
        let size = match self.sql.execute(&statements::database_size_gb()).await {
            Ok(rows) => rows.scalar_f64(),
            Err(e) => Err(e),
        };
        match size {
            Ok(Some(size_gb)) => {
                run.database_size_gb = Some(size_gb);
                info!(size_gb, "数据库大小");
                if size_gb > self.health.database_size_warning_gb {
                    run.warn(format!(
                        "数据库大小 {:.2} GB 超过告警阈值 {:.2} GB，接近 10 GB 上限",
                        size_gb, self.health.database_size_warning_gb
                    ));
                }
            }
            Ok(None) => run.warn("数据库大小查询无结果"),
            Err(e) => run.warn(format!("读取数据库大小失败: {}", e)),
        }
    }

    async fn check_free_disk(&self, run: &mut MaintenanceRun) {
        let path = tokio::fs::canonicalize(&self.content_dir)
            .await
            .unwrap_or_else(|_| self.content_dir.clone());
        let mounts = match tokio::task::spawn_blocking(system_mounts).await {
            Ok(mounts) => mounts,
            Err(e) => {
                run.warn(format!("读取磁盘信息失败: {}", e));
                return;
            }
        };

        match free_space_for(&path, &mounts) {
            Some(available) => {
                let free_gb = available as f64 / BYTES_PER_GB;
                info!(path = %path.display(), free_gb = format!("{:.1}", free_gb), "内容磁盘可用空间");
                if free_gb < self.health.min_free_disk_gb {
                    run.warn(format!(
                        "内容目录所在磁盘可用空间 {:.1} GB 低于 {:.1} GB",
                        free_gb, self.health.min_free_disk_gb
                    ));
                }
            }
            None => run.warn(format!("无法确定 {} 所在磁盘的可用空间", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::SqlRows,
        services::fakes::{FakeCatalog, FakeSql},
    };
    use chrono::Utc;

    #[test]
    fn test_longest_mount_wins() {
        let mounts = vec![
            (PathBuf::from("/"), 100),
            (PathBuf::from("/data"), 200),
            (PathBuf::from("/data/wsus"), 300),
        ];
        assert_eq!(free_space_for(Path::new("/data/wsus/content"), &mounts), Some(300));
        assert_eq!(free_space_for(Path::new("/data/other"), &mounts), Some(200));
        assert_eq!(free_space_for(Path::new("/var"), &mounts), Some(100));
        assert_eq!(free_space_for(Path::new("relative"), &mounts), None);
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_fatal() {
        let diagnostics = ConnectDiagnostics::new(
            Arc::new(FakeCatalog::unreachable()),
            Arc::new(FakeSql::default()),
            HealthConfig::default(),
            PathBuf::from("."),
        );
        let mut run = MaintenanceRun::new(Utc::now());
        assert!(diagnostics.check(&mut run).await.is_err());
    }

    #[tokio::test]
    async fn test_large_database_is_warning() {
        let sql = Arc::new(FakeSql::default());
        sql.respond("sys.database_files", Ok(SqlRows::scalar("9.6")));
        let diagnostics = ConnectDiagnostics::new(
            Arc::new(FakeCatalog::default()),
            sql,
            HealthConfig {
                min_free_disk_gb: 0.0,
                ..HealthConfig::default()
            },
            PathBuf::from("."),
        );
        let mut run = MaintenanceRun::new(Utc::now());

        diagnostics.check(&mut run).await.unwrap();

        assert_eq!(run.database_size_gb, Some(9.6));
        assert!(run.warnings.iter().any(|w| w.contains("9.60 GB")));
        assert!(run.errors.is_empty());
    }

    #[tokio::test]
    async fn test_size_query_failure_is_warning() {
        let sql = Arc::new(FakeSql::default());
        sql.respond("sys.database_files", Err(AppError::sql("login failed")));
        let diagnostics = ConnectDiagnostics::new(
            Arc::new(FakeCatalog::default()),
            sql,
            HealthConfig::default(),
            PathBuf::from("."),
        );
        let mut run = MaintenanceRun::new(Utc::now());

        assert!(diagnostics.check(&mut run).await.is_ok());
        assert!(run.database_size_gb.is_none());
        assert!(run.warnings.iter().any(|w| w.contains("login failed")));
    }
}
