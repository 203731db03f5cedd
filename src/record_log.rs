use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error};

use crate::types::LogRecord;

#[derive(Debug, Error)]
pub enum RecordLogError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open log file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write log file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// 追加一行 JSON；目录/文件不存在时创建
pub fn append_record(path: &Path, record: &LogRecord) -> Result<(), RecordLogError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        dir_builder()
            .create(dir)
            .map_err(|source| RecordLogError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
    }

    // 整行一次写入，O_APPEND 保证落在文件末尾
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut file = open_append(path).map_err(|source| RecordLogError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    file.write_all(&line)
        .map_err(|source| RecordLogError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    // file 在此处 drop，所有路径上都会关闭
    Ok(())
}

/// 尽力而为：失败只打日志，不向调用方传播
pub fn log_to_file(path: &Path, record: &LogRecord) {
    match append_record(path, record) {
        Ok(()) => debug!(path = %path.display(), endpoint = %record.endpoint, "record appended"),
        Err(e) => error!(error = %e, "request log write failed"),
    }
}

#[cfg(unix)]
fn dir_builder() -> DirBuilder {
    use std::os::unix::fs::DirBuilderExt;

    let mut builder = DirBuilder::new();
    builder.recursive(true).mode(0o750);
    builder
}

#[cfg(not(unix))]
fn dir_builder() -> DirBuilder {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    builder
}

fn open_append(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o640);
    }

    options.open(path)
}

/// 所有请求共享的日志写入端，写入经同一把锁串行化
#[derive(Debug, Clone)]
pub struct RecordLog {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl RecordLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: LogRecord) {
        let path = Arc::clone(&self.path);
        let lock = Arc::clone(&self.lock);

        let joined = tokio::task::spawn_blocking(move || {
            let _guard = lock.lock();
            log_to_file(&path, &record);
        })
        .await;

        if let Err(e) = joined {
            error!(error = %e, "request log task failed");
        }
    }

    pub async fn log_prompt(&self, endpoint: &str, prompt: &str) {
        self.append(LogRecord::prompt(endpoint, prompt)).await;
    }

    pub async fn log_response(&self, endpoint: &str, response: &str) {
        self.append(LogRecord::response(endpoint, response)).await;
    }
}

/// 测试辅助：按行读取并解析日志文件
#[cfg(test)]
pub fn read_records(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/log.jsonl");

        append_record(&path, &LogRecord::prompt("/generate", "hello")).unwrap();

        let records = read_records(&path);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["prompt"], "hello");
    }

    #[test]
    fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        log_to_file(&path, &LogRecord::prompt("/generate", "multi\nline"));
        log_to_file(&path, &LogRecord::response("/generate", "ok"));

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.ends_with('\n'));

        let records = read_records(&path);
        assert_eq!(records[0]["prompt"], "multi\nline");
        assert_eq!(records[1]["response"], "ok");
    }

    #[test]
    fn failure_does_not_escape_log_to_file() {
        let dir = tempfile::tempdir().unwrap();
        // 父路径是普通文件，目录无法创建
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let path = blocker.join("log.jsonl");

        assert!(append_record(&path, &LogRecord::prompt("/generate", "p")).is_err());
        log_to_file(&path, &LogRecord::prompt("/generate", "p"));
    }

    #[cfg(unix)]
    #[test]
    fn restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let path = log_dir.join("log.jsonl");

        append_record(&path, &LogRecord::prompt("/generate", "p")).unwrap();

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        let dir_mode = fs::metadata(&log_dir).unwrap().permissions().mode() & 0o777;
        // umask 只会收紧权限
        assert_eq!(file_mode & !0o640, 0);
        assert_eq!(dir_mode & !0o750, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_keep_lines_intact() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecordLog::new(dir.path().join("log.jsonl"));

        let mut handles = Vec::new();
        for i in 0..32 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.log_prompt("/generate", &"x".repeat(4096 + i)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let records = read_records(log.path());
        assert_eq!(records.len(), 32);
        assert!(records.iter().all(|r| r["endpoint"] == "/generate"));
    }
}
