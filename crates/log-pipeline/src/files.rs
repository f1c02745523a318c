//! 출처별 로그 파일
//!
//! alias마다 `<alias>.stdout.log`, `<alias>.stderr.log` 두 파일을 유지합니다.
//! 파일은 생성 시점에 비워지며(truncate), 엔트리는 수신 순서대로 즉시 기록됩니다.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use gauntlet_core::types::LogEntry;

use crate::error::LogPipelineError;

/// 파일 하나를 가리키는 키 (alias, stderr 여부)
pub type FileKey = (String, bool);

struct FilePair {
    stdout: File,
    stderr: File,
}

impl FilePair {
    fn get_mut(&mut self, is_error: bool) -> &mut File {
        if is_error {
            &mut self.stderr
        } else {
            &mut self.stdout
        }
    }
}

/// 출처별 로그 파일 집합
pub struct LogFileSet {
    dir: PathBuf,
    files: HashMap<String, FilePair>,
}

impl LogFileSet {
    /// 모든 alias의 파일 쌍을 생성합니다. 하나라도 실패하면 전체가 실패합니다.
    pub async fn create<I, S>(dir: impl Into<PathBuf>, aliases: I) -> Result<Self, LogPipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LogPipelineError::FileCreate {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut set = Self {
            dir,
            files: HashMap::new(),
        };
        for alias in aliases {
            set.open_pair(alias.into()).await?;
        }
        Ok(set)
    }

    /// alias의 파일 경로
    pub fn path_for(dir: &Path, alias: &str, is_error: bool) -> PathBuf {
        let suffix = if is_error { "stderr" } else { "stdout" };
        dir.join(format!("{alias}.{suffix}.log"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn aliases(&self) -> BTreeSet<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    async fn open_pair(&mut self, alias: String) -> Result<(), LogPipelineError> {
        if self.files.contains_key(&alias) {
            return Ok(());
        }
        let stdout = open_truncated(&Self::path_for(&self.dir, &alias, false)).await?;
        let stderr = open_truncated(&Self::path_for(&self.dir, &alias, true)).await?;
        self.files.insert(alias, FilePair { stdout, stderr });
        Ok(())
    }

    /// 엔트리를 해당 파일에 기록하고 파일 키를 반환합니다.
    ///
    /// 생성 시 알려지지 않은 alias는 그 자리에서 파일 쌍을 만듭니다.
    pub async fn write(&mut self, entry: &LogEntry) -> Result<FileKey, LogPipelineError> {
        let alias = entry.file_alias();
        if !self.files.contains_key(alias) {
            debug!(alias, "creating log files for unregistered origin");
            self.open_pair(alias.to_owned()).await?;
        }

        let is_error = entry.is_error();
        let path = Self::path_for(&self.dir, alias, is_error);
        let write_error = |e: std::io::Error| LogPipelineError::FileWrite {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let file = self
            .files
            .get_mut(alias)
            .ok_or_else(|| LogPipelineError::FileWrite {
                path: path.display().to_string(),
                reason: "file pair missing".to_owned(),
            })?
            .get_mut(is_error);
        file.write_all(&entry.line()).await.map_err(write_error)?;
        file.flush().await.map_err(write_error)?;

        Ok((alias.to_owned(), is_error))
    }

    /// 주어진 파일들을 디스크에 동기화합니다. 실패는 로그로만 남깁니다.
    pub async fn sync(&mut self, keys: &BTreeSet<FileKey>) {
        for (alias, is_error) in keys {
            let Some(pair) = self.files.get_mut(alias) else {
                continue;
            };
            if let Err(e) = pair.get_mut(*is_error).sync_data().await {
                warn!(alias = %alias, is_error, error = %e, "failed to sync log file");
            }
        }
    }
}

async fn open_truncated(path: &Path) -> Result<File, LogPipelineError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|e| LogPipelineError::FileCreate {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}
