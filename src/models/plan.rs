use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};

/// 可选维护操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// 与上游目录同步
    Sync,
    /// 在线清理（服务端清理 + 索引/统计维护）
    Cleanup,
    /// 深度清理（需停止目录服务）
    UltimateCleanup,
    /// 数据库完整备份
    Backup,
    /// 离线站点差异导出
    Export,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Sync,
        Operation::Cleanup,
        Operation::UltimateCleanup,
        Operation::Backup,
        Operation::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Sync => "sync",
            Operation::Cleanup => "cleanup",
            Operation::UltimateCleanup => "ultimate-cleanup",
            Operation::Backup => "backup",
            Operation::Export => "export",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| format!("未知的维护操作: {}", s))
    }
}

/// 预置的操作组合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Full,
    Quick,
    SyncOnly,
    BackupAndExport,
    DbOnly,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Full,
        Preset::Quick,
        Preset::SyncOnly,
        Preset::BackupAndExport,
        Preset::DbOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Full => "full",
            Preset::Quick => "quick",
            Preset::SyncOnly => "sync-only",
            Preset::BackupAndExport => "backup-and-export",
            Preset::DbOnly => "db-only",
        }
    }

    /// 预置包含的操作
    pub fn operations(&self) -> BTreeSet<Operation> {
        let ops: &[Operation] = match self {
            Preset::Full => &Operation::ALL,
            Preset::Quick => &[Operation::Sync, Operation::Cleanup, Operation::Backup],
            Preset::SyncOnly => &[Operation::Sync],
            Preset::BackupAndExport => &[Operation::Backup, Operation::Export],
            Preset::DbOnly => &[Operation::Cleanup, Operation::UltimateCleanup],
        };
        ops.iter().copied().collect()
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| format!("未知的预置方案: {}", s))
    }
}

/// 维护计划，流水线启动后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenancePlan {
    operations: BTreeSet<Operation>,
    skip_ultimate_cleanup: bool,
    skip_export: bool,
    export_window_days: u32,
    unattended: bool,
}

impl MaintenancePlan {
    pub fn new(
        operations: impl IntoIterator<Item = Operation>,
        export_window_days: u32,
    ) -> AppResult<Self> {
        if export_window_days == 0 {
            return Err(AppError::validation("导出窗口天数必须大于0"));
        }
        Ok(Self {
            operations: operations.into_iter().collect(),
            skip_ultimate_cleanup: false,
            skip_export: false,
            export_window_days,
            unattended: false,
        })
    }

    pub fn from_preset(preset: Preset, export_window_days: u32) -> AppResult<Self> {
        Self::new(preset.operations(), export_window_days)
    }

    pub fn with_skip_ultimate_cleanup(mut self, skip: bool) -> Self {
        self.skip_ultimate_cleanup = skip;
        self
    }

    pub fn with_skip_export(mut self, skip: bool) -> Self {
        self.skip_export = skip;
        self
    }

    pub fn with_unattended(mut self, unattended: bool) -> Self {
        self.unattended = unattended;
        self
    }

    pub fn operations(&self) -> &BTreeSet<Operation> {
        &self.operations
    }

    pub fn includes(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    /// 该操作在本次运行中是否实际执行（考虑 skip 标志）
    pub fn runs(&self, op: Operation) -> bool {
        match op {
            Operation::UltimateCleanup => self.includes(op) && !self.skip_ultimate_cleanup,
            Operation::Export => self.includes(op) && !self.skip_export,
            _ => self.includes(op),
        }
    }

    pub fn skip_ultimate_cleanup(&self) -> bool {
        self.skip_ultimate_cleanup
    }

    pub fn skip_export(&self) -> bool {
        self.skip_export
    }

    pub fn export_window_days(&self) -> u32 {
        self.export_window_days
    }

    pub fn unattended(&self) -> bool {
        self.unattended
    }
}
