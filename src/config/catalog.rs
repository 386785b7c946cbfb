use serde::{Deserialize, Serialize};

/// 更新目录服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// 目录服务 API 基础URL
    pub base_url: String,
    /// 单次请求超时（秒），0 表示不限制
    pub request_timeout_secs: u64,
    /// 自动审批使用的默认目标组
    pub approval_target_group: String,
    /// 目录服务名称（用于停止/启动）
    pub service_name: String,
    /// 停止服务的命令，`{service}` 会被替换为服务名
    pub stop_command: Vec<String>,
    /// 启动服务的命令
    pub start_command: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8530/api".to_string(),
            request_timeout_secs: 300,
            approval_target_group: "All Computers".to_string(),
            service_name: "WsusService".to_string(),
            stop_command: vec![
                "net".to_string(),
                "stop".to_string(),
                "{service}".to_string(),
            ],
            start_command: vec![
                "net".to_string(),
                "start".to_string(),
                "{service}".to_string(),
            ],
        }
    }
}

impl CatalogConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("目录服务 base_url 不能为空".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("目录服务 base_url 必须以 http:// 或 https:// 开头".to_string());
        }

        if self.approval_target_group.trim().is_empty() {
            return Err("审批目标组不能为空".to_string());
        }

        if self.stop_command.is_empty() || self.start_command.is_empty() {
            return Err("服务停止/启动命令不能为空".to_string());
        }

        Ok(())
    }

    /// 获取完整的API URL
    pub fn get_api_url(&self, endpoint: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let endpoint = endpoint.trim_start_matches('/');
        format!("{}/{}", base, endpoint)
    }
}

/// SQL 引擎配置（通过 sqlcmd 执行）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// sqlcmd 可执行文件路径
    pub sqlcmd_path: String,
    /// 服务器/实例地址
    pub server: String,
    /// 目录数据库名称
    pub database: String,
    /// SQL 登录名（为空则使用集成认证）
    pub username: Option<String>,
    pub password: Option<String>,
    /// 普通查询超时（秒）
    pub default_timeout_secs: u64,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            sqlcmd_path: "sqlcmd".to_string(),
            server: r"np:\\.\pipe\MICROSOFT##WID\tsql\query".to_string(),
            database: "SUSDB".to_string(),
            username: None,
            password: None,
            default_timeout_secs: 600,
        }
    }
}

impl SqlConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sqlcmd_path.is_empty() {
            return Err("sqlcmd 路径不能为空".to_string());
        }
        if self.server.is_empty() {
            return Err("SQL 服务器地址不能为空".to_string());
        }
        if self.database.is_empty() {
            return Err("数据库名称不能为空".to_string());
        }
        if self.username.is_some() && self.password.is_none() {
            return Err("配置了 SQL 登录名但缺少密码".to_string());
        }
        if self.default_timeout_secs == 0 {
            return Err("默认查询超时必须大于0".to_string());
        }
        Ok(())
    }
}
