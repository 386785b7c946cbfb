use std::future::Future;
use tracing::info;

/// 进度快照
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub batch: usize,
    pub total_batches: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub batches: usize,
    pub progress: Vec<BatchProgress>,
}

/// 分批顺序处理，批次仅用于进度汇报
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    batch_size: usize,
    progress_every: usize,
    label: &'static str,
}

impl BatchProcessor {
    pub fn new(batch_size: usize, progress_every: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            progress_every: progress_every.max(1),
            label: "batch",
        }
    }

    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// 对每个元素依次调用 `f`，`f` 返回是否成功；单项失败不中断
    pub async fn for_each_batch<T, F, Fut>(&self, items: &[T], mut f: F) -> BatchSummary
    where
        T: Clone,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = bool>,
    {
        let total = items.len();
        let total_batches = total.div_ceil(self.batch_size);
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };

        for (index, chunk) in items.chunks(self.batch_size).enumerate() {
            for item in chunk {
                if f(item.clone()).await {
                    summary.succeeded += 1;
                } else {
                    summary.failed += 1;
                }
            }
            summary.batches = index + 1;

            if summary.batches % self.progress_every == 0 {
                let processed = summary.succeeded + summary.failed;
                let progress = BatchProgress {
                    batch: summary.batches,
                    total_batches,
                    processed,
                    succeeded: summary.succeeded,
                    percent: processed as f64 * 100.0 / total as f64,
                };
                info!(
                    label = self.label,
                    batch = progress.batch,
                    total_batches,
                    percent = format!("{:.1}", progress.percent),
                    succeeded = progress.succeeded,
                    "批处理进度"
                );
                summary.progress.push(progress);
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_every_five_batches() {
        let items: Vec<u32> = (0..1050).collect();
        let processor = BatchProcessor::new(100, 5);
        let summary = processor
            .for_each_batch(&items, |i| async move { i % 10 != 0 })
            .await;

        assert_eq!(summary.total, 1050);
        assert_eq!(summary.batches, 11);
        assert_eq!(summary.failed, 105);
        assert_eq!(summary.succeeded, 945);
        assert_eq!(summary.progress.len(), 2);
        assert_eq!(summary.progress[0].batch, 5);
        assert_eq!(summary.progress[0].processed, 500);
        assert!((summary.progress[1].percent - 1000.0 * 100.0 / 1050.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_items_processed_in_order() {
        let items = vec!["a", "b", "c"];
        let mut seen = Vec::new();
        let summary = BatchProcessor::new(2, 1)
            .for_each_batch(&items, |s| {
                seen.push(s);
                async { true }
            })
            .await;
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.progress.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let summary = BatchProcessor::new(100, 5)
            .for_each_batch(&Vec::<i64>::new(), |_| async { true })
            .await;
        assert_eq!(summary, BatchSummary::default());
    }
}
