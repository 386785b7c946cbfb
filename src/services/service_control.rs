use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{
    config::CatalogConfig,
    error::{AppError, AppResult},
};

/// 目录服务启停控制
#[async_trait::async_trait]
pub trait ServiceControl: Send + Sync {
    async fn stop(&self) -> AppResult<()>;
    async fn start(&self) -> AppResult<()>;
}

/// 通过外部命令（如 `net stop`）启停服务
#[derive(Debug, Clone)]
pub struct CommandServiceControl {
    service_name: String,
    stop_command: Vec<String>,
    start_command: Vec<String>,
}

impl CommandServiceControl {
    pub fn new(cfg: &CatalogConfig) -> Self {
        Self {
            service_name: cfg.service_name.clone(),
            stop_command: cfg.stop_command.clone(),
            start_command: cfg.start_command.clone(),
        }
    }

    fn expand(&self, template: &[String]) -> Vec<String> {
        template
            .iter()
            .map(|part| part.replace("{service}", &self.service_name))
            .collect()
    }

    async fn run(&self, template: &[String], action: &str) -> AppResult<()> {
        let argv = self.expand(template);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AppError::config("服务控制命令为空"))?;
        debug!(program, ?args, action, "执行服务控制命令");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::service(format!("{}服务 {} 失败: {}", action, self.service_name, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::service(format!(
                "{}服务 {} 失败: {} {}",
                action,
                self.service_name,
                output.status,
                stderr.trim().chars().take(300).collect::<String>()
            )));
        }

        info!(service = %self.service_name, action, "服务控制命令执行成功");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ServiceControl for CommandServiceControl {
    async fn stop(&self) -> AppResult<()> {
        self.run(&self.stop_command, "停止").await
    }

    async fn start(&self) -> AppResult<()> {
        self.run(&self.start_command, "启动").await
    }
}
