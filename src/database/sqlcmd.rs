use super::{CommandTimeout, SqlCommand, SqlExecutor, SqlRows};
use crate::{
    config::SqlConfig,
    error::{AppError, AppResult},
};
use std::{process::Stdio, time::Duration};
use tokio::process::Command;
use tracing::debug;

const COLUMN_SEPARATOR: char = '|';

/// 通过 sqlcmd 执行 T-SQL 的执行器
#[derive(Clone)]
pub struct SqlcmdExecutor {
    config: SqlConfig,
}

impl std::fmt::Debug for SqlcmdExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlcmdExecutor")
            .field("server", &self.config.server)
            .field("database", &self.config.database)
            .field("username", &self.config.username)
            .field("password", &self.config.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl SqlcmdExecutor {
    pub fn new(config: SqlConfig) -> Self {
        Self { config }
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    fn timeout_for(&self, timeout: CommandTimeout) -> Option<Duration> {
        match timeout {
            CommandTimeout::Default => Some(Duration::from_secs(self.config.default_timeout_secs)),
            CommandTimeout::Limited(d) => Some(d),
            CommandTimeout::Unbounded => None,
        }
    }

    /// 构造 sqlcmd 参数列表
    fn build_args(&self, sql: &str, timeout: Option<Duration>) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            self.config.server.clone(),
            "-d".to_string(),
            self.config.database.clone(),
            "-b".to_string(),
            "-h".to_string(),
            "-1".to_string(),
            "-W".to_string(),
            "-s".to_string(),
            COLUMN_SEPARATOR.to_string(),
        ];

        match (&self.config.username, &self.config.password) {
            (Some(user), Some(password)) => {
                args.extend(["-U".to_string(), user.clone()]);
                args.extend(["-P".to_string(), password.clone()]);
            }
            _ => args.push("-E".to_string()),
        }

        if let Some(t) = timeout {
            // sqlcmd 的查询超时上限为 65535 秒
            let secs = t.as_secs().clamp(1, 65535);
            args.extend(["-t".to_string(), secs.to_string()]);
        }

        args.extend(["-Q".to_string(), format!("SET NOCOUNT ON; {}", sql)]);
        args
    }
}

/// 隐藏参数中的密码
fn mask_args(args: &[String]) -> String {
    let mut masked = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            masked.push("***".to_string());
            hide_next = false;
            continue;
        }
        hide_next = arg == "-P";
        masked.push(arg.clone());
    }
    masked.join(" ")
}

/// 解析 `-h -1 -W -s |` 格式的输出
fn parse_output(stdout: &str) -> SqlRows {
    let rows = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split(COLUMN_SEPARATOR)
                .map(|c| c.trim().to_string())
                .collect()
        })
        .collect();
    SqlRows::new(rows)
}

#[async_trait::async_trait]
impl SqlExecutor for SqlcmdExecutor {
    async fn execute(&self, command: &SqlCommand) -> AppResult<SqlRows> {
        let sql = command.render()?;
        let timeout = self.timeout_for(command.get_timeout());
        let args = self.build_args(&sql, timeout);
        debug!(command = %mask_args(&args), "执行 sqlcmd");

        let child = Command::new(&self.config.sqlcmd_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::sql(format!("启动 sqlcmd 失败: {}", e)))?;

        // sqlcmd 自身的 -t 负责查询超时，这里只兜底防止进程挂死
        let output = match timeout {
            Some(t) => tokio::time::timeout(t + Duration::from_secs(30), child.wait_with_output())
                .await
                .map_err(|_| AppError::timeout(format!("SQL 执行超过 {} 秒", t.as_secs())))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| AppError::sql(format!("等待 sqlcmd 结束失败: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(AppError::sql(format!(
                "sqlcmd 返回 {}: {}",
                output.status,
                detail.chars().take(500).collect::<String>()
            )));
        }

        Ok(parse_output(&stdout))
    }
}
