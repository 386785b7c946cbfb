//! 运行报告输出

use std::{fmt::Write as _, path::Path};

use crate::{
    error::{AppError, AppResult},
    models::{MaintenanceRun, PhaseStatus},
};

/// 纯文本摘要：逐项列出阶段、计数、警告与错误
pub fn render_text(run: &MaintenanceRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "维护运行 {}", run.run_id);
    let _ = writeln!(out, "开始: {}", run.start_time.to_rfc3339());
    if let Some(end) = run.end_time {
        let _ = writeln!(
            out,
            "结束: {} (耗时 {} 秒)",
            end.to_rfc3339(),
            (end - run.start_time).num_seconds()
        );
    }

    let _ = writeln!(out, "\n阶段:");
    for phase in &run.phases {
        let marker = match phase.status {
            PhaseStatus::Completed => "OK  ",
            PhaseStatus::Failed => "FAIL",
            PhaseStatus::Skipped => "--  ",
        };
        let _ = writeln!(
            out,
            "  [{}] {:<16} {:>9.1}s",
            marker,
            phase.name.to_string(),
            phase.duration_seconds
        );
    }

    let _ = writeln!(
        out,
        "\n拒绝: 过期 {} / 被取代 {} / 过旧 {}",
        run.declined_expired, run.declined_superseded, run.declined_old
    );
    let _ = writeln!(out, "审批: {}", run.approved);
    if let Some(size) = run.database_size_gb {
        let _ = writeln!(out, "数据库大小: {:.2} GB", size);
    }
    if let Some(backup) = &run.backup {
        let _ = writeln!(
            out,
            "备份: {} ({:.1} MB, {:.0} 秒)",
            backup.file_path.display(),
            backup.size_mb,
            backup.duration_seconds
        );
    }
    if let Some(export) = &run.export {
        let _ = writeln!(
            out,
            "导出: {} -> {} ({} 个文件, {:.2} GB, 窗口 {} 天)",
            export.root_path.display(),
            export.archive_path.display(),
            export.file_count,
            export.size_gb,
            export.window_days
        );
    }

    if !run.warnings.is_empty() {
        let _ = writeln!(out, "\n警告 ({}):", run.warnings.len());
        for warning in &run.warnings {
            let _ = writeln!(out, "  - {}", warning);
        }
    }
    if !run.errors.is_empty() {
        let _ = writeln!(out, "\n错误 ({}):", run.errors.len());
        for error in &run.errors {
            let _ = writeln!(out, "  - {}", error);
        }
    }

    let _ = writeln!(out, "\n结果: {}", if run.success { "成功" } else { "失败" });
    out
}

/// 将运行结果以 JSON 写入文件
pub fn write_json<P: AsRef<Path>>(run: &MaintenanceRun, path: P) -> AppResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(run)?;
    std::fs::write(path, content)
        .map_err(|e| AppError::export(format!("写入报告 {} 失败: {}", path.display(), e)))
}
