use super::{FileSync, SyncOptions, SyncOutcome, matches_any};
use crate::error::{AppError, AppResult};
use rand::Rng;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const PARTIAL_SUFFIX: &str = ".partial";

/// 本地文件系统同步实现（多线程复制 + 失败重试）
#[derive(Debug, Clone, Default)]
pub struct LocalFileSync;

impl LocalFileSync {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone)]
struct CopyJob {
    src: PathBuf,
    dst: PathBuf,
}

#[derive(Debug, Default)]
struct ScanResult {
    jobs: Vec<CopyJob>,
    skipped: u64,
    failed: u64,
}

/// 扫描源目录，确定需要复制的文件
fn scan(source: &Path, dest: &Path, options: &SyncOptions, now: SystemTime) -> ScanResult {
    let mut result = ScanResult::default();
    let max_depth = if options.recurse { usize::MAX } else { 1 };
    let cutoff = options
        .max_age_days
        .and_then(|d| now.checked_sub(Duration::from_secs(u64::from(d) * 86_400)));

    for entry in WalkDir::new(source).min_depth(1).max_depth(max_depth) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "扫描源目录失败");
                result.failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !options.include_patterns.is_empty() && !matches_any(&options.include_patterns, &name)
        {
            continue;
        }
        if matches_any(&options.exclude_patterns, &name) {
            result.skipped += 1;
            continue;
        }

        let src_meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "读取文件元数据失败");
                result.failed += 1;
                continue;
            }
        };
        let src_mtime = src_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if let Some(cutoff) = cutoff {
            if src_mtime < cutoff {
                result.skipped += 1;
                continue;
            }
        }

        let relative = match entry.path().strip_prefix(source) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let dst = dest.join(relative);

        if let Ok(dst_meta) = std::fs::metadata(&dst) {
            let dst_mtime = dst_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let up_to_date = if options.exclude_older {
                src_mtime <= dst_mtime
            } else {
                src_mtime == dst_mtime && src_meta.len() == dst_meta.len()
            };
            if up_to_date {
                result.skipped += 1;
                continue;
            }
        }

        result.jobs.push(CopyJob {
            src: entry.path().to_path_buf(),
            dst,
        });
    }

    result
}

/// 临时文件，未成功改名时在析构中删除
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn for_target(dst: &Path) -> Self {
        let mut path = dst.to_path_buf().into_os_string();
        path.push(PARTIAL_SUFFIX);
        Self {
            path: PathBuf::from(path),
            committed: false,
        }
    }

    fn commit(mut self, dst: &Path) -> std::io::Result<()> {
        std::fs::rename(&self.path, dst)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "删除临时文件失败");
            }
        }
    }
}

/// 复制单个文件：先写临时文件再改名，并保留源文件修改时间
fn copy_file(job: &CopyJob) -> std::io::Result<u64> {
    if let Some(parent) = job.dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = PartialFile::for_target(&job.dst);

    let bytes = std::fs::copy(&job.src, &partial.path)?;
    let mtime = std::fs::metadata(&job.src)?.modified()?;
    std::fs::File::options()
        .write(true)
        .open(&partial.path)?
        .set_modified(mtime)?;
    partial.commit(&job.dst)?;
    Ok(bytes)
}

async fn copy_with_retry<F>(
    job: CopyJob,
    retries: u32,
    retry_wait: Duration,
    copy: F,
) -> AppResult<u64>
where
    F: Fn(&CopyJob) -> std::io::Result<u64> + Clone + Send + 'static,
{
    let mut attempt = 0u32;
    loop {
        let current = job.clone();
        let op = copy.clone();
        let result = tokio::task::spawn_blocking(move || op(&current))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let err = match result {
            Ok(bytes) => return Ok(bytes),
            Err(e) => AppError::from(e),
        };
        if attempt >= retries || !err.is_transient() {
            return Err(AppError::sync(format!(
                "复制 {} 失败（第 {} 次尝试）: {}",
                job.src.display(),
                attempt + 1,
                err
            )));
        }

        attempt += 1;
        let base = retry_wait.as_millis() as u64;
        let jitter = if base > 0 {
            rand::rng().random_range(0..=base / 4)
        } else {
            0
        };
        debug!(
            path = %job.src.display(),
            attempt,
            error = %err,
            "文件复制失败，等待重试"
        );
        tokio::time::sleep(Duration::from_millis(base + jitter)).await;
    }
}

#[async_trait::async_trait]
impl FileSync for LocalFileSync {
    async fn sync(
        &self,
        source: &Path,
        dest: &Path,
        options: &SyncOptions,
    ) -> AppResult<SyncOutcome> {
        if !tokio::fs::metadata(source)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(AppError::sync(format!("源目录不存在: {}", source.display())));
        }
        tokio::fs::create_dir_all(dest).await?;

        let scan_result = {
            let source = source.to_path_buf();
            let dest = dest.to_path_buf();
            let options = options.clone();
            tokio::task::spawn_blocking(move || scan(&source, &dest, &options, SystemTime::now()))
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
        };

        debug!(
            source = %source.display(),
            dest = %dest.display(),
            pending = scan_result.jobs.len(),
            skipped = scan_result.skipped,
            "同步扫描完成"
        );

        let semaphore = Arc::new(Semaphore::new(options.threads.max(1)));
        let mut tasks = JoinSet::new();
        for job in scan_result.jobs {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
            let retries = options.retries;
            let retry_wait = options.retry_wait;
            tasks.spawn(async move {
                let _permit = permit;
                copy_with_retry(job, retries, retry_wait, copy_file).await
            });
        }

        let mut copied = 0u64;
        let mut bytes = 0u64;
        let mut failed = scan_result.failed;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(n)) => {
                    copied += 1;
                    bytes += n;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "文件复制失败");
                    failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "复制任务异常退出");
                    failed += 1;
                }
            }
        }

        let outcome = SyncOutcome::from_counts(copied, bytes, scan_result.skipped, failed);
        info!(
            source = %source.display(),
            dest = %dest.display(),
            copied = outcome.files_copied,
            bytes = outcome.bytes_copied,
            failed = outcome.files_failed,
            exit_code = outcome.exit_code,
            "目录同步完成"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &str, age_days: u64) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_days * 86_400);
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    fn options() -> SyncOptions {
        SyncOptions {
            threads: 2,
            retries: 0,
            retry_wait: Duration::from_millis(0),
            ..SyncOptions::default()
        }
    }

    #[tokio::test]
    async fn test_sync_copies_missing_files_recursively() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_file(&src.path().join("A1/file1.cab"), "one", 1);
        write_file(&src.path().join("B2/C3/file2.cab"), "two!", 2);

        let outcome = LocalFileSync::new()
            .sync(src.path(), dst.path(), &options())
            .await
            .unwrap();

        assert_eq!(outcome.files_copied, 2);
        assert_eq!(outcome.bytes_copied, 7);
        assert_eq!(outcome.exit_code, 1);
        assert!(dst.path().join("B2/C3/file2.cab").exists());
    }

    #[tokio::test]
    async fn test_second_run_copies_nothing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_file(&src.path().join("f.cab"), "payload", 3);

        let sync = LocalFileSync::new();
        sync.sync(src.path(), dst.path(), &options()).await.unwrap();
        let again = sync.sync(src.path(), dst.path(), &options()).await.unwrap();

        assert_eq!(again.files_copied, 0);
        assert_eq!(again.files_skipped, 1);
        assert_eq!(again.exit_code, 0);
    }

    #[tokio::test]
    async fn test_destination_only_files_are_kept() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_file(&src.path().join("new.cab"), "n", 0);
        write_file(&dst.path().join("old-only.cab"), "o", 30);

        LocalFileSync::new()
            .sync(src.path(), dst.path(), &options())
            .await
            .unwrap();

        assert!(dst.path().join("old-only.cab").exists());
        assert!(dst.path().join("new.cab").exists());
    }

    #[tokio::test]
    async fn test_max_age_and_patterns() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_file(&src.path().join("recent.cab"), "r", 2);
        write_file(&src.path().join("stale.cab"), "s", 10);
        write_file(&src.path().join("scratch.tmp"), "t", 1);

        let opts = SyncOptions {
            max_age_days: Some(7),
            exclude_patterns: vec!["*.tmp".to_string()],
            ..options()
        };
        let outcome = LocalFileSync::new()
            .sync(src.path(), dst.path(), &opts)
            .await
            .unwrap();

        assert_eq!(outcome.files_copied, 1);
        assert!(dst.path().join("recent.cab").exists());
        assert!(!dst.path().join("stale.cab").exists());
        assert!(!dst.path().join("scratch.tmp").exists());
    }

    #[tokio::test]
    async fn test_non_recursive_include_filter() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_file(&src.path().join("SUSDB_20261017.bak"), "bak", 0);
        write_file(&src.path().join("SUSDB_20261016.bak"), "old", 1);
        write_file(&src.path().join("nested/SUSDB_20261017.bak"), "x", 0);

        let opts = SyncOptions {
            recurse: false,
            include_patterns: vec!["SUSDB_20261017.bak".to_string()],
            ..options()
        };
        let outcome = LocalFileSync::new()
            .sync(src.path(), dst.path(), &opts)
            .await
            .unwrap();

        assert_eq!(outcome.files_copied, 1);
        assert!(!dst.path().join("nested").exists());
        assert!(!dst.path().join("SUSDB_20261016.bak").exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_error() {
        let dst = TempDir::new().unwrap();
        let missing = dst.path().join("does-not-exist");
        let result = LocalFileSync::new()
            .sync(&missing, dst.path(), &options())
            .await;
        assert!(matches!(result, Err(AppError::Sync(_))));
    }

    #[tokio::test]
    async fn test_failed_copy_removes_partial_file() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_file(&src.path().join("x.cab"), "payload", 0);
        // 目标位置是非空目录，最终改名必然失败
        write_file(&dst.path().join("x.cab/inner.cab"), "i", 0);

        let opts = SyncOptions {
            exclude_older: false,
            ..options()
        };
        let outcome = LocalFileSync::new()
            .sync(src.path(), dst.path(), &opts)
            .await
            .unwrap();

        assert_eq!(outcome.files_failed, 1);
        assert!(!outcome.is_success());
        assert!(!dst.path().join("x.cab.partial").exists());
        assert!(dst.path().join("x.cab/inner.cab").exists());
    }

    fn job(dir: &TempDir) -> CopyJob {
        CopyJob {
            src: dir.path().join("a.cab"),
            dst: dir.path().join("out/a.cab"),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let dir = TempDir::new().unwrap();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let flaky = move |_: &CopyJob| -> std::io::Result<u64> {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "share busy"))
            } else {
                Ok(42)
            }
        };

        let bytes = copy_with_retry(job(&dir), 3, Duration::from_millis(4), flaky)
            .await
            .unwrap();

        assert_eq!(bytes, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_stop_when_exhausted_or_permanent() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let dir = TempDir::new().unwrap();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let busy = move |_: &CopyJob| -> std::io::Result<u64> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "share busy"))
        };
        let result = copy_with_retry(job(&dir), 2, Duration::ZERO, busy).await;
        assert!(matches!(result, Err(AppError::Sync(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let missing = move |_: &CopyJob| -> std::io::Result<u64> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
        };
        let result = copy_with_retry(job(&dir), 5, Duration::ZERO, missing).await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
