use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 拒绝/审批策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// 更新发布日期超过该月数视为过旧；审批窗口同样使用该值
    pub max_update_age_months: u32,
    /// 单次运行允许自动审批的最大数量，超过则整体跳过
    pub approval_cap: usize,
    /// 超出上限时警告中列出的样例标题数量
    pub approval_sample_size: usize,
    /// 标题包含这些关键字（不区分大小写）的更新不自动审批
    pub excluded_title_keywords: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_update_age_months: 6,
            approval_cap: 100,
            approval_sample_size: 10,
            excluded_title_keywords: vec!["preview".to_string(), "beta".to_string()],
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_update_age_months == 0 {
            return Err("max_update_age_months 必须大于0".to_string());
        }
        if self.approval_sample_size == 0 {
            return Err("approval_sample_size 必须大于0".to_string());
        }
        Ok(())
    }
}

/// 同步监视配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 最大轮询次数
    pub timeout_iterations: u32,
    /// 轮询间隔（秒）
    pub poll_interval_secs: u64,
    /// 触发同步后首次轮询前的等待（秒）
    pub initial_grace_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_iterations: 120,
            poll_interval_secs: 30,
            initial_grace_secs: 15,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_iterations == 0 {
            return Err("同步最大轮询次数必须大于0".to_string());
        }
        if self.poll_interval_secs == 0 {
            return Err("同步轮询间隔必须大于0".to_string());
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_grace(&self) -> Duration {
        Duration::from_secs(self.initial_grace_secs)
    }
}

/// 清理与优化配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeConfig {
    /// 每批处理的记录数（仅用于进度汇报）
    pub batch_size: usize,
    /// 每隔多少批输出一次进度
    pub progress_every_batches: usize,
    /// 单条删除存储过程的超时（秒）
    pub delete_timeout_secs: u64,
    /// 取代关系清理每轮最多删除的行数
    pub supersession_row_limit: u32,
    /// 取代关系清理的最大轮数
    pub supersession_max_rounds: u32,
    /// 碎片率高于该值时重建索引
    pub rebuild_threshold_percent: f64,
    /// 碎片率高于该值（且低于重建阈值）时重组索引
    pub reorganize_threshold_percent: f64,
    /// 页数低于该值的索引不做维护
    pub min_index_pages: u32,
    /// 可回收空间超过该值（MB）才执行收缩
    pub min_reclaim_mb: f64,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            progress_every_batches: 5,
            delete_timeout_secs: 300,
            supersession_row_limit: 1000,
            supersession_max_rounds: 500,
            rebuild_threshold_percent: 30.0,
            reorganize_threshold_percent: 10.0,
            min_index_pages: 100,
            min_reclaim_mb: 100.0,
        }
    }
}

impl PurgeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("批量大小必须大于0".to_string());
        }
        if self.progress_every_batches == 0 {
            return Err("进度汇报间隔必须大于0".to_string());
        }
        if self.supersession_row_limit == 0 || self.supersession_max_rounds == 0 {
            return Err("取代关系清理的行数/轮数限制必须大于0".to_string());
        }
        if self.reorganize_threshold_percent >= self.rebuild_threshold_percent {
            return Err("索引重组阈值必须低于重建阈值".to_string());
        }
        if self.min_reclaim_mb < 0.0 {
            return Err("最小回收空间不能为负数".to_string());
        }
        Ok(())
    }
}

/// 备份与保留配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// 备份文件保留天数
    pub retention_days: u32,
    /// 备份文件名前缀
    pub file_prefix: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            file_prefix: "SUSDB".to_string(),
        }
    }
}

impl BackupConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.retention_days == 0 {
            return Err("备份保留天数必须大于0".to_string());
        }
        if self.file_prefix.is_empty()
            || self
                .file_prefix
                .chars()
                .any(|c| matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        {
            return Err("备份文件名前缀非法".to_string());
        }
        Ok(())
    }
}

/// 差异导出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// 无人值守时的默认导出窗口（天）
    pub default_window_days: u32,
    /// 文件复制并发数
    pub threads: usize,
    /// 单文件复制失败重试次数
    pub retries: u32,
    /// 重试等待（毫秒）
    pub retry_wait_ms: u64,
    /// 排除的文件名模式（支持 * 和 ?）
    pub exclude_patterns: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_window_days: 30,
            threads: 8,
            retries: 3,
            retry_wait_ms: 2000,
            exclude_patterns: vec!["*.tmp".to_string(), "*.partial".to_string()],
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_window_days == 0 {
            return Err("默认导出窗口必须大于0".to_string());
        }
        if self.threads == 0 || self.threads > 128 {
            return Err("复制并发数应在1-128之间".to_string());
        }
        Ok(())
    }
}

/// 连接阶段的健康检查阈值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// 数据库大小超过该值（GB）时告警
    pub database_size_warning_gb: f64,
    /// 内容目录所在磁盘可用空间低于该值（GB）时告警
    pub min_free_disk_gb: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            database_size_warning_gb: 9.0,
            min_free_disk_gb: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.max_update_age_months, 6);
        assert_eq!(policy.approval_cap, 100);
        assert_eq!(policy.approval_sample_size, 10);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_purge_thresholds_must_be_ordered() {
        let mut purge = PurgeConfig::default();
        assert!(purge.validate().is_ok());

        purge.reorganize_threshold_percent = 40.0;
        assert!(purge.validate().is_err());
    }

    #[test]
    fn test_backup_prefix_rejects_path_separators() {
        let mut backup = BackupConfig::default();
        assert!(backup.validate().is_ok());

        backup.file_prefix = "../SUSDB".to_string();
        assert!(backup.validate().is_err());
    }

    #[test]
    fn test_sync_durations() {
        let sync = SyncConfig::default();
        assert_eq!(sync.poll_interval(), Duration::from_secs(30));
        assert_eq!(sync.initial_grace(), Duration::from_secs(15));
    }
}
