pub mod query;
pub mod sqlcmd;
pub mod statements;

pub use query::{CommandTimeout, SqlCommand, SqlValue};
pub use sqlcmd::SqlcmdExecutor;

use crate::error::{AppError, AppResult};

/// SQL 执行抽象
#[async_trait::async_trait]
pub trait SqlExecutor: Send + Sync {
    /// 执行命令并返回结果行
    async fn execute(&self, command: &SqlCommand) -> AppResult<SqlRows>;
}

/// 查询结果（按列拆分的文本行）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRows {
    rows: Vec<Vec<String>>,
}

impl SqlRows {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// 单值结果
    pub fn scalar(value: impl Into<String>) -> Self {
        Self {
            rows: vec![vec![value.into()]],
        }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 第一行第一列，NULL 视为 None
    pub fn first_value(&self) -> Option<&str> {
        self.rows
            .first()
            .and_then(|r| r.first())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("NULL"))
    }

    pub fn scalar_f64(&self) -> AppResult<Option<f64>> {
        self.first_value()
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|e| AppError::sql(format!("无法解析数值结果 '{}': {}", v, e)))
            })
            .transpose()
    }

    pub fn scalar_i64(&self) -> AppResult<Option<i64>> {
        self.first_value()
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|e| AppError::sql(format!("无法解析整数结果 '{}': {}", v, e)))
            })
            .transpose()
    }

    /// 读取所有行指定列的整数值
    pub fn column_i64(&self, index: usize) -> AppResult<Vec<i64>> {
        self.rows
            .iter()
            .map(|row| {
                let raw = row
                    .get(index)
                    .ok_or_else(|| AppError::sql(format!("结果缺少第 {} 列", index)))?;
                raw.trim()
                    .parse::<i64>()
                    .map_err(|e| AppError::sql(format!("无法解析整数列 '{}': {}", raw, e)))
            })
            .collect()
    }
}
