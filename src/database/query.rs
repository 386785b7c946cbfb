use crate::error::{AppError, AppResult};
use regex::{Captures, Regex};
use std::{sync::LazyLock, time::Duration};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(([A-Za-z0-9_]+)\)").expect("valid placeholder regex"));

/// 带类型的查询参数
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    /// 字符串字面量，渲染为 N'...'
    Text(String),
    /// 标识符，渲染为 [...]
    Ident(String),
}

impl SqlValue {
    fn render(&self) -> String {
        match self {
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Float(v) => format!("{}", v),
            SqlValue::Text(v) => format!("N'{}'", v.replace('\'', "''")),
            SqlValue::Ident(v) => format!("[{}]", v.replace(']', "]]")),
        }
    }
}

/// 查询超时策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTimeout {
    /// 使用执行器的默认超时
    Default,
    Limited(Duration),
    /// 不设超时（备份、索引重建等长操作）
    Unbounded,
}

/// 参数化 SQL 命令
///
/// 模板中的 `$(Name)` 占位符在渲染时按类型转义后替换，未绑定的占位符会导致渲染失败。
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCommand {
    template: String,
    params: Vec<(String, SqlValue)>,
    timeout: CommandTimeout,
}

impl SqlCommand {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            params: Vec::new(),
            timeout: CommandTimeout::Default,
        }
    }

    pub fn bind(mut self, name: &str, value: SqlValue) -> Self {
        self.params.retain(|(n, _)| n != name);
        self.params.push((name.to_string(), value));
        self
    }

    pub fn timeout(mut self, timeout: CommandTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(CommandTimeout::Limited(Duration::from_secs(secs)))
    }

    pub fn unbounded(self) -> Self {
        self.timeout(CommandTimeout::Unbounded)
    }

    pub fn get_timeout(&self) -> CommandTimeout {
        self.timeout
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn param(&self, name: &str) -> Option<&SqlValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// 渲染为最终 SQL 文本，所有未绑定的占位符合并报告
    pub fn render(&self) -> AppResult<String> {
        let mut unbound = Vec::new();
        let rendered = PLACEHOLDER_RE.replace_all(&self.template, |cap: &Captures| {
            match self.param(&cap[1]) {
                Some(value) => value.render(),
                None => {
                    unbound.push(cap[1].to_string());
                    String::new()
                }
            }
        });

        if !unbound.is_empty() {
            return Err(AppError::sql(format!(
                "占位符未绑定参数: {}",
                unbound.join(", ")
            )));
        }

        Ok(rendered.into_owned())
    }
}
