use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

use crate::{
    config::CatalogConfig,
    error::{AppError, AppResult},
    models::{CleanupSummary, ServerInfo, SyncResult, SyncStatus, UpdateRecord},
};

/// 更新目录服务接口
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// 服务器信息（连接检查）
    async fn server_info(&self) -> AppResult<ServerInfo>;
    async fn get_all_records(&self) -> AppResult<Vec<UpdateRecord>>;
    async fn decline(&self, id: &str) -> AppResult<()>;
    async fn approve(&self, id: &str, target_group: &str) -> AppResult<()>;
    async fn trigger_sync(&self) -> AppResult<()>;
    async fn get_sync_status(&self) -> AppResult<SyncStatus>;
    async fn get_last_sync_result(&self) -> AppResult<SyncResult>;
    /// 服务端清理向导（过期更新、无用内容、过期计算机）
    async fn run_server_cleanup(&self) -> AppResult<CleanupSummary>;
}

/// 基于 HTTP API 的目录服务客户端
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    http: Client,
    config: CatalogConfig,
}

impl HttpCatalogClient {
    pub fn new(cfg: &CatalogConfig) -> AppResult<Self> {
        let mut builder = Client::builder();
        if cfg.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(cfg.request_timeout_secs));
        }
        let http = builder
            .build()
            .map_err(|e| AppError::config(format!("创建HTTP客户端失败: {}", e)))?;
        Ok(Self {
            http,
            config: cfg.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        self.config.get_api_url(path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| map_transport_error(path, e))?;
        let text = read_body(path, resp).await?;
        serde_json::from_str(&text).map_err(|e| {
            AppError::catalog(format!(
                "解析 {} 响应失败: {}, body_preview={}",
                path,
                e,
                text.chars().take(200).collect::<String>()
            ))
        })
    }

    async fn post(&self, path: &str, body: Option<serde_json::Value>) -> AppResult<String> {
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| map_transport_error(path, e))?;
        read_body(path, resp).await
    }
}

fn map_transport_error(path: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::timeout(format!("请求 {} 超时: {}", path, e))
    } else {
        AppError::catalog(format!("请求 {} 失败: {}", path, e))
    }
}

async fn read_body(path: &str, resp: reqwest::Response) -> AppResult<String> {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    debug!(path, %status, len = text.len(), "目录服务响应");
    if status == StatusCode::NOT_FOUND {
        return Err(AppError::catalog(format!("目录服务资源不存在: {}", path)));
    }
    if !status.is_success() {
        let preview = text.chars().take(200).collect::<String>();
        error!(path, %status, preview = %preview, "目录服务请求失败");
        return Err(AppError::catalog(format!(
            "目录服务请求失败: path={}, status={}, body_preview={}",
            path, status, preview
        )));
    }
    Ok(text)
}

#[async_trait::async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn server_info(&self) -> AppResult<ServerInfo> {
        self.get_json("/server").await
    }

    async fn get_all_records(&self) -> AppResult<Vec<UpdateRecord>> {
        self.get_json("/updates").await
    }

    async fn decline(&self, id: &str) -> AppResult<()> {
        self.post(&format!("/updates/{}/decline", id), None).await?;
        Ok(())
    }

    async fn approve(&self, id: &str, target_group: &str) -> AppResult<()> {
        let body = serde_json::json!({ "action": "install", "targetGroup": target_group });
        self.post(&format!("/updates/{}/approve", id), Some(body))
            .await?;
        Ok(())
    }

    async fn trigger_sync(&self) -> AppResult<()> {
        self.post("/subscription/sync", None).await?;
        Ok(())
    }

    async fn get_sync_status(&self) -> AppResult<SyncStatus> {
        #[derive(serde::Deserialize)]
        struct StatusBody {
            status: SyncStatus,
        }
        let body: StatusBody = self.get_json("/subscription/status").await?;
        Ok(body.status)
    }

    async fn get_last_sync_result(&self) -> AppResult<SyncResult> {
        self.get_json("/subscription/last-sync").await
    }

    async fn run_server_cleanup(&self) -> AppResult<CleanupSummary> {
        let text = self.post("/cleanup", None).await?;
        if text.trim().is_empty() {
            return Ok(CleanupSummary::default());
        }
        Ok(serde_json::from_str(&text)?)
    }
}
