use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 更新分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateClassification {
    Critical,
    Security,
    Rollup,
    ServicePack,
    Update,
    Definition,
    Upgrade,
    #[serde(other)]
    Other,
}

impl UpdateClassification {
    /// 是否属于允许自动审批的分类
    ///
    /// 定义更新（过于频繁）与功能升级（需人工评估）不参与自动审批。
    pub fn is_auto_approvable(&self) -> bool {
        matches!(
            self,
            UpdateClassification::Critical
                | UpdateClassification::Security
                | UpdateClassification::Rollup
                | UpdateClassification::ServicePack
                | UpdateClassification::Update
        )
    }
}

/// 目录中的单条更新记录（只读快照）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    pub id: String,
    pub title: String,
    pub is_declined: bool,
    pub is_superseded: bool,
    pub is_expired: bool,
    /// 厂商发布日期
    pub release_date: DateTime<Utc>,
    pub classification: UpdateClassification,
    /// 默认目标组是否已有安装审批
    #[serde(default)]
    pub approved_for_install: bool,
}

/// 目录服务器基本信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    NotProcessing,
    Running,
    Stopping,
    #[serde(other)]
    Unknown,
}

/// 最近一次同步结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub result: String,
    #[serde(default)]
    pub new_count: u32,
    #[serde(default)]
    pub revised_count: u32,
    pub error: Option<String>,
}

impl SyncResult {
    pub fn succeeded(&self) -> bool {
        self.result.eq_ignore_ascii_case("succeeded")
    }
}

/// 服务端清理结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupSummary {
    pub obsolete_updates_deleted: u32,
    pub updates_compressed: u32,
    pub obsolete_computers_deleted: u32,
    pub disk_space_freed: u64,
}
