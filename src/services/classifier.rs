//! 更新分类与拒绝/审批策略

use chrono::{DateTime, Months, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::catalog_client::CatalogClient;
use crate::{
    config::PolicyConfig,
    models::{MaintenanceRun, UpdateRecord},
};

/// 分类结果；三个拒绝集合互不相交
#[derive(Debug, Default)]
pub struct Classification<'a> {
    pub expired: Vec<&'a UpdateRecord>,
    pub superseded: Vec<&'a UpdateRecord>,
    pub old: Vec<&'a UpdateRecord>,
    pub approvable: Vec<&'a UpdateRecord>,
}

impl Classification<'_> {
    pub fn decline_count(&self) -> usize {
        self.expired.len() + self.superseded.len() + self.old.len()
    }
}

/// 拒绝与审批的执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationReport {
    pub declined_expired: u32,
    pub declined_superseded: u32,
    pub declined_old: u32,
    pub approved: u32,
    /// 超过审批上限而整体跳过
    pub approvals_capped: bool,
}

/// 按发布日期计算的年龄阈值
pub fn age_cutoff(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn title_excluded(title: &str, keywords: &[String]) -> bool {
    let title = title.to_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && title.contains(&k.to_lowercase()))
}

/// 纯函数分类
///
/// 一条记录同时满足多个拒绝条件时，按 过期 > 被取代 > 过旧 的优先级只归入一个集合。
pub fn classify<'a>(
    records: &'a [UpdateRecord],
    now: DateTime<Utc>,
    policy: &PolicyConfig,
) -> Classification<'a> {
    let cutoff = age_cutoff(now, policy.max_update_age_months);
    let mut result = Classification::default();

    for record in records.iter().filter(|r| !r.is_declined) {
        if record.is_expired {
            result.expired.push(record);
        } else if record.is_superseded {
            result.superseded.push(record);
        } else if record.release_date < cutoff {
            result.old.push(record);
        } else if !record.approved_for_install
            && record.release_date > cutoff
            && record.classification.is_auto_approvable()
            && !title_excluded(&record.title, &policy.excluded_title_keywords)
        {
            result.approvable.push(record);
        }
    }

    result
}

/// 将分类结果提交到目录服务
pub struct UpdateClassifier {
    catalog: Arc<dyn CatalogClient>,
    policy: PolicyConfig,
    target_group: String,
}

impl UpdateClassifier {
    pub fn new(catalog: Arc<dyn CatalogClient>, policy: PolicyConfig, target_group: String) -> Self {
        Self {
            catalog,
            policy,
            target_group,
        }
    }

    /// 逐条拒绝；单条失败记为警告，返回成功数
    async fn decline_all(
        &self,
        records: &[&UpdateRecord],
        category: &str,
        run: &mut MaintenanceRun,
    ) -> u32 {
        let mut declined = 0u32;
        for record in records {
            match self.catalog.decline(&record.id).await {
                Ok(()) => {
                    debug!(id = %record.id, category, "已拒绝更新");
                    declined += 1;
                }
                Err(e) => run.warn(format!(
                    "拒绝更新失败 [{}] {}: {}",
                    category, record.title, e
                )),
            }
        }
        declined
    }

    async fn approve_all(&self, records: &[&UpdateRecord], run: &mut MaintenanceRun) -> u32 {
        let mut approved = 0u32;
        for record in records {
            match self.catalog.approve(&record.id, &self.target_group).await {
                Ok(()) => {
                    debug!(id = %record.id, group = %self.target_group, "已审批更新");
                    approved += 1;
                }
                Err(e) => run.warn(format!("审批更新失败 {}: {}", record.title, e)),
            }
        }
        approved
    }

    pub async fn apply(
        &self,
        records: &[UpdateRecord],
        now: DateTime<Utc>,
        run: &mut MaintenanceRun,
    ) -> ClassificationReport {
        let classification = classify(records, now, &self.policy);
        info!(
            total = records.len(),
            expired = classification.expired.len(),
            superseded = classification.superseded.len(),
            old = classification.old.len(),
            approvable = classification.approvable.len(),
            "更新分类完成"
        );

        let mut report = ClassificationReport {
            declined_expired: self
                .decline_all(&classification.expired, "expired", run)
                .await,
            declined_superseded: self
                .decline_all(&classification.superseded, "superseded", run)
                .await,
            declined_old: self.decline_all(&classification.old, "old", run).await,
            ..Default::default()
        };

        if classification.approvable.len() > self.policy.approval_cap {
            let samples = classification
                .approvable
                .iter()
                .take(self.policy.approval_sample_size)
                .map(|r| r.title.as_str())
                .collect::<Vec<_>>();
            run.warn(format!(
                "待审批更新 {} 条超过上限 {}，本次跳过全部审批。样例: {}",
                classification.approvable.len(),
                self.policy.approval_cap,
                samples.join("; ")
            ));
            report.approvals_capped = true;
        } else {
            report.approved = self.approve_all(&classification.approvable, run).await;
        }

        info!(
            declined_expired = report.declined_expired,
            declined_superseded = report.declined_superseded,
            declined_old = report.declined_old,
            approved = report.approved,
            "拒绝/审批执行完成"
        );
        report
    }
}
