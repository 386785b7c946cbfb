//! 测试用内存实现

use chrono::{DateTime, Utc};
use std::{
    collections::{HashSet, VecDeque},
    sync::Mutex,
};

use super::{catalog_client::CatalogClient, service_control::ServiceControl};
use crate::{
    database::{SqlCommand, SqlExecutor, SqlRows, SqlValue},
    error::{AppError, AppResult},
    models::{
        CleanupSummary, ServerInfo, SyncResult, SyncStatus, UpdateClassification, UpdateRecord,
    },
};

pub fn record(id: &str, title: &str, release_date: DateTime<Utc>) -> UpdateRecord {
    UpdateRecord {
        id: id.to_string(),
        title: title.to_string(),
        is_declined: false,
        is_superseded: false,
        is_expired: false,
        release_date,
        classification: UpdateClassification::Security,
        approved_for_install: false,
    }
}

#[derive(Default)]
struct CatalogState {
    records: Vec<UpdateRecord>,
    unreachable: bool,
    fail_records: bool,
    fail_decline: HashSet<String>,
    declined: Vec<String>,
    approved: Vec<String>,
    sync_triggered: u32,
    statuses: VecDeque<SyncStatus>,
    last_sync: Option<SyncResult>,
    cleanups: u32,
}

#[derive(Default)]
pub struct FakeCatalog {
    state: Mutex<CatalogState>,
}

impl FakeCatalog {
    pub fn with_records(records: Vec<UpdateRecord>) -> Self {
        let catalog = Self::default();
        catalog.state.lock().unwrap().records = records;
        catalog
    }

    pub fn unreachable() -> Self {
        let catalog = Self::default();
        catalog.state.lock().unwrap().unreachable = true;
        catalog
    }

    pub fn fail_records(&self) {
        self.state.lock().unwrap().fail_records = true;
    }

    pub fn fail_decline_of(&self, id: &str) {
        self.state.lock().unwrap().fail_decline.insert(id.to_string());
    }

    pub fn declined(&self) -> Vec<String> {
        self.state.lock().unwrap().declined.clone()
    }

    pub fn approved(&self) -> Vec<String> {
        self.state.lock().unwrap().approved.clone()
    }

    pub fn sync_triggered(&self) -> u32 {
        self.state.lock().unwrap().sync_triggered
    }

    pub fn cleanups(&self) -> u32 {
        self.state.lock().unwrap().cleanups
    }

    fn check(&self) -> AppResult<()> {
        if self.state.lock().unwrap().unreachable {
            return Err(AppError::catalog("connection refused"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogClient for FakeCatalog {
    async fn server_info(&self) -> AppResult<ServerInfo> {
        self.check()?;
        Ok(ServerInfo {
            name: "wsus-test".to_string(),
            version: "10.0".to_string(),
        })
    }

    async fn get_all_records(&self) -> AppResult<Vec<UpdateRecord>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        if state.fail_records {
            return Err(AppError::catalog("records unavailable"));
        }
        Ok(state.records.clone())
    }

    async fn decline(&self, id: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_decline.contains(id) {
            return Err(AppError::catalog(format!("decline {} rejected", id)));
        }
        state.declined.push(id.to_string());
        Ok(())
    }

    async fn approve(&self, id: &str, _target_group: &str) -> AppResult<()> {
        self.state.lock().unwrap().approved.push(id.to_string());
        Ok(())
    }

    async fn trigger_sync(&self) -> AppResult<()> {
        self.state.lock().unwrap().sync_triggered += 1;
        Ok(())
    }

    async fn get_sync_status(&self) -> AppResult<SyncStatus> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .statuses
            .pop_front()
            .unwrap_or(SyncStatus::NotProcessing))
    }

    async fn get_last_sync_result(&self) -> AppResult<SyncResult> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .last_sync
            .clone()
            .unwrap_or(SyncResult {
                result: "Succeeded".to_string(),
                new_count: 0,
                revised_count: 0,
                error: None,
            }))
    }

    async fn run_server_cleanup(&self) -> AppResult<CleanupSummary> {
        self.state.lock().unwrap().cleanups += 1;
        Ok(CleanupSummary::default())
    }
}

/// 按模板关键字返回预设结果的 SQL 执行器
///
/// BACKUP 命令会在目标路径写出一个小文件。
#[derive(Default)]
pub struct FakeSql {
    responses: Mutex<Vec<(String, AppResult<SqlRows>)>>,
    executed: Mutex<Vec<String>>,
    fail_delete: Mutex<HashSet<i64>>,
}

impl FakeSql {
    /// 模板包含 `pattern` 时返回给定结果（先注册者优先，可重复使用）
    pub fn respond(&self, pattern: &str, result: AppResult<SqlRows>) {
        self.responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), result));
    }

    pub fn fail_delete_of(&self, id: i64) {
        self.fail_delete.lock().unwrap().insert(id);
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.executed()
            .iter()
            .filter(|sql| sql.contains(needle))
            .count()
    }
}

fn clone_result(result: &AppResult<SqlRows>) -> AppResult<SqlRows> {
    match result {
        Ok(rows) => Ok(rows.clone()),
        Err(e) => Err(AppError::sql(e.to_string())),
    }
}

#[async_trait::async_trait]
impl SqlExecutor for FakeSql {
    async fn execute(&self, command: &SqlCommand) -> AppResult<SqlRows> {
        let sql = command.render()?;
        self.executed.lock().unwrap().push(sql.clone());

        if let Some(SqlValue::Int(id)) = command.param("LocalUpdateId") {
            if self.fail_delete.lock().unwrap().contains(id) {
                return Err(AppError::sql(format!("delete {} deadlocked", id)));
            }
        }

        if let Some(SqlValue::Text(path)) = command.param("BackupPath") {
            std::fs::write(path, b"backup-bytes")?;
        }

        let responses = self.responses.lock().unwrap();
        let matched = responses
            .iter()
            .find(|(pattern, _)| command.template().contains(pattern.as_str()));
        match matched {
            Some((_, result)) => clone_result(result),
            None => Ok(SqlRows::empty()),
        }
    }
}

#[derive(Default)]
pub struct FakeService {
    calls: Mutex<Vec<&'static str>>,
    fail_stop: Mutex<bool>,
    fail_start: Mutex<bool>,
}

impl FakeService {
    pub fn failing_start() -> Self {
        let service = Self::default();
        *service.fail_start.lock().unwrap() = true;
        service
    }

    pub fn failing_stop() -> Self {
        let service = Self::default();
        *service.fail_stop.lock().unwrap() = true;
        service
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ServiceControl for FakeService {
    async fn stop(&self) -> AppResult<()> {
        self.calls.lock().unwrap().push("stop");
        if *self.fail_stop.lock().unwrap() {
            return Err(AppError::service("stop refused"));
        }
        Ok(())
    }

    async fn start(&self) -> AppResult<()> {
        self.calls.lock().unwrap().push("start");
        if *self.fail_start.lock().unwrap() {
            return Err(AppError::service("start refused"));
        }
        Ok(())
    }
}
