use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};
use uuid::Uuid;

/// 流水线阶段（固定执行顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseName {
    Connect,
    Sync,
    Classification,
    Cleanup,
    UltimateCleanup,
    Backup,
    RetentionPrune,
    Export,
}

impl PhaseName {
    pub const ORDER: [PhaseName; 8] = [
        PhaseName::Connect,
        PhaseName::Sync,
        PhaseName::Classification,
        PhaseName::Cleanup,
        PhaseName::UltimateCleanup,
        PhaseName::Backup,
        PhaseName::RetentionPrune,
        PhaseName::Export,
    ];
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseName::Connect => "Connect",
            PhaseName::Sync => "Sync",
            PhaseName::Classification => "Classification",
            PhaseName::Cleanup => "Cleanup",
            PhaseName::UltimateCleanup => "UltimateCleanup",
            PhaseName::Backup => "Backup",
            PhaseName::RetentionPrune => "RetentionPrune",
            PhaseName::Export => "Export",
        };
        f.write_str(name)
    }
}

/// 阶段状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Skipped,
    Completed,
    Failed,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            PhaseStatus::Skipped => "skipped",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
        };
        f.write_str(status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub name: PhaseName,
    pub status: PhaseStatus,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDescriptor {
    pub file_path: PathBuf,
    pub size_mb: f64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDescriptor {
    pub root_path: PathBuf,
    pub archive_path: PathBuf,
    pub file_count: u64,
    pub size_gb: f64,
    pub window_days: u32,
}

/// 一次维护运行的聚合结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRun {
    pub run_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub phases: Vec<PhaseResult>,
    pub declined_expired: u32,
    pub declined_superseded: u32,
    pub declined_old: u32,
    pub approved: u32,
    pub database_size_gb: Option<f64>,
    pub backup: Option<BackupDescriptor>,
    pub export: Option<ExportDescriptor>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub success: bool,
}

impl MaintenanceRun {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            start_time,
            end_time: None,
            phases: Vec::new(),
            declined_expired: 0,
            declined_superseded: 0,
            declined_old: 0,
            approved: 0,
            database_size_gb: None,
            backup: None,
            export: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            success: false,
        }
    }

    /// 记录阶段结果；每个阶段只能记录一次，重复记录返回 false
    pub fn record_phase(
        &mut self,
        name: PhaseName,
        status: PhaseStatus,
        duration_seconds: f64,
    ) -> bool {
        if self.phase(name).is_some() {
            tracing::warn!(phase = %name, "阶段结果重复记录，已忽略");
            return false;
        }
        self.phases.push(PhaseResult {
            name,
            status,
            duration_seconds,
        });
        true
    }

    pub fn phase(&self, name: PhaseName) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn phase_status(&self, name: PhaseName) -> Option<PhaseStatus> {
        self.phase(name).map(|p| p.status)
    }

    /// 记录性降级/单条记录失败
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    /// 记录阶段失败
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.errors.push(message);
    }

    pub fn total_declined(&self) -> u32 {
        self.declined_expired + self.declined_superseded + self.declined_old
    }

    /// 结束运行：success 仅取决于 errors 是否为空
    pub fn finalize(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.success = self.errors.is_empty();
    }
}
