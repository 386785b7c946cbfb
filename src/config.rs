use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod catalog;
pub mod policy;

pub use catalog::{CatalogConfig, SqlConfig};
pub use policy::{
    BackupConfig, ExportConfig, HealthConfig, PolicyConfig, PurgeConfig, SyncConfig,
};

/// 维护程序配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub sql: SqlConfig,
    pub paths: PathsConfig,
    pub policy: PolicyConfig,
    pub sync: SyncConfig,
    pub purge: PurgeConfig,
    pub backup: BackupConfig,
    pub export: ExportConfig,
    pub health: HealthConfig,
}

/// 文件路径配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// 更新内容目录
    pub content_dir: PathBuf,
    /// 数据库备份目录
    pub backup_dir: PathBuf,
    /// 离线站点导出根目录
    pub export_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from(r"D:\WSUS\WsusContent"),
            backup_dir: PathBuf::from(r"D:\WSUS\Backups"),
            export_root: PathBuf::from(r"E:\PatchExport"),
        }
    }
}

impl Config {
    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| AppError::config(format!("解析配置文件失败: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> AppResult<()> {
        if let Err(e) = self.catalog.validate() {
            return Err(AppError::config(format!("目录服务配置无效: {}", e)));
        }

        if let Err(e) = self.sql.validate() {
            return Err(AppError::config(format!("SQL配置无效: {}", e)));
        }

        if self.paths.content_dir.as_os_str().is_empty() {
            return Err(AppError::config("内容目录不能为空"));
        }

        if self.paths.backup_dir.as_os_str().is_empty() {
            return Err(AppError::config("备份目录不能为空"));
        }

        if self.paths.export_root.as_os_str().is_empty() {
            return Err(AppError::config("导出根目录不能为空"));
        }

        if let Err(e) = self.policy.validate() {
            return Err(AppError::config(format!("策略配置无效: {}", e)));
        }

        if let Err(e) = self.sync.validate() {
            return Err(AppError::config(format!("同步配置无效: {}", e)));
        }

        if let Err(e) = self.purge.validate() {
            return Err(AppError::config(format!("清理配置无效: {}", e)));
        }

        if let Err(e) = self.backup.validate() {
            return Err(AppError::config(format!("备份配置无效: {}", e)));
        }

        if let Err(e) = self.export.validate() {
            return Err(AppError::config(format!("导出配置无效: {}", e)));
        }

        Ok(())
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::config(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}
