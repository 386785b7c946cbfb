pub mod local;

pub use local::LocalFileSync;

use crate::error::AppResult;
use std::{path::Path, time::Duration};

/// 目录同步抽象接口
#[async_trait::async_trait]
pub trait FileSync: Send + Sync {
    /// 将 source 下满足条件的文件复制到 dest，不删除目标端多余文件
    async fn sync(&self, source: &Path, dest: &Path, options: &SyncOptions)
    -> AppResult<SyncOutcome>;
}

/// 同步选项
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// 是否递归子目录
    pub recurse: bool,
    /// 仅复制最近 N 天内修改过的文件
    pub max_age_days: Option<u32>,
    /// 目标端已有且不旧于源文件时跳过
    pub exclude_older: bool,
    /// 仅复制文件名匹配这些模式的文件（为空表示全部）
    pub include_patterns: Vec<String>,
    /// 排除文件名匹配这些模式的文件
    pub exclude_patterns: Vec<String>,
    /// 并发复制数
    pub threads: usize,
    /// 单文件失败重试次数
    pub retries: u32,
    /// 重试等待
    pub retry_wait: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            recurse: true,
            max_age_days: None,
            exclude_older: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            threads: 8,
            retries: 3,
            retry_wait: Duration::from_secs(2),
        }
    }
}

/// 同步结果
///
/// exit_code 与 robocopy 兼容：bit 1 表示有文件被复制，bit 8 表示有文件复制失败。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub exit_code: i32,
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
}

impl SyncOutcome {
    pub const COPIED: i32 = 1;
    pub const FAILURE_THRESHOLD: i32 = 8;

    pub fn from_counts(
        files_copied: u64,
        bytes_copied: u64,
        files_skipped: u64,
        files_failed: u64,
    ) -> Self {
        let mut exit_code = 0;
        if files_copied > 0 {
            exit_code |= Self::COPIED;
        }
        if files_failed > 0 {
            exit_code |= Self::FAILURE_THRESHOLD;
        }
        Self {
            exit_code,
            files_copied,
            bytes_copied,
            files_skipped,
            files_failed,
        }
    }

    /// 低于阈值的退出码视为成功/部分成功
    pub fn is_success(&self) -> bool {
        self.exit_code < Self::FAILURE_THRESHOLD
    }
}

/// 不区分大小写的通配符匹配（`*` 任意串，`?` 单个字符）
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let n: Vec<char> = name.to_lowercase().chars().collect();

    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ni;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

pub fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|p| wildcard_match(p, name))
}
