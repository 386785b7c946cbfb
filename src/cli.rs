use clap::Parser;
use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use crate::{
    error::AppResult,
    models::{MaintenancePlan, Operation, Preset},
};

/// 补丁分发服务器维护工具
#[derive(Debug, Parser)]
#[command(name = "patchfarm-maintenance", version, about)]
pub struct Cli {
    /// 配置文件路径（不存在时写出默认配置）
    #[arg(short, long, default_value = "maintenance.toml")]
    pub config: PathBuf,

    /// 预设操作组合：full | quick | sync-only | backup-and-export | db-only
    #[arg(short, long, default_value = "full")]
    pub preset: Preset,

    /// 显式操作列表（逗号分隔），覆盖预设
    #[arg(long, value_delimiter = ',')]
    pub operations: Vec<Operation>,

    #[arg(long)]
    pub skip_ultimate_cleanup: bool,

    #[arg(long)]
    pub skip_export: bool,

    /// 导出窗口天数
    #[arg(long)]
    pub window_days: Option<u32>,

    /// 无人值守：不提示，使用默认值
    #[arg(long)]
    pub unattended: bool,

    /// 将运行结果写为 JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// 交互式询问导出窗口，空输入或非法输入使用默认值
pub fn prompt_window_days<R: BufRead, W: Write>(input: &mut R, output: &mut W, default: u32) -> u32 {
    let _ = write!(output, "导出窗口天数 [{}]: ", default);
    let _ = output.flush();
    let mut line = String::new();
    if input.read_line(&mut line).is_err() {
        return default;
    }
    match line.trim().parse::<u32>() {
        Ok(days) if days > 0 => days,
        _ => default,
    }
}

impl Cli {
    pub fn selected_operations(&self) -> Vec<Operation> {
        if self.operations.is_empty() {
            self.preset.operations().into_iter().collect()
        } else {
            self.operations.clone()
        }
    }

    /// 构造维护计划；`ask_window` 仅在交互模式且未显式给出窗口时调用
    pub fn to_plan(
        &self,
        default_window_days: u32,
        ask_window: impl FnOnce(u32) -> u32,
    ) -> AppResult<MaintenancePlan> {
        let operations = self.selected_operations();
        let window_days = match self.window_days {
            Some(days) => days,
            None if self.unattended || !operations.contains(&Operation::Export) => {
                default_window_days
            }
            None => ask_window(default_window_days),
        };

        Ok(MaintenancePlan::new(operations, window_days)?
            .with_skip_ultimate_cleanup(self.skip_ultimate_cleanup)
            .with_skip_export(self.skip_export)
            .with_unattended(self.unattended))
    }
}
