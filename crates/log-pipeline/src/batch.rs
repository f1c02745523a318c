//! flush 주기 사이에 모인 엔트리

use std::collections::BTreeSet;

use gauntlet_core::error::WorkerStderrError;
use gauntlet_core::types::LogEntry;
use gauntlet_storage::Document;

use crate::files::FileKey;

/// 다음 flush를 기다리는 엔트리와 그 사이 기록된 파일
#[derive(Debug, Default)]
pub struct Batch {
    entries: Vec<LogEntry>,
    touched: BTreeSet<FileKey>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// 이번 주기에 쓰인 파일을 기록합니다.
    pub fn touch(&mut self, key: FileKey) {
        self.touched.insert(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn touched(&self) -> &BTreeSet<FileKey> {
        &self.touched
    }

    /// 저장할 문서 목록 (수신 순서)
    pub fn documents(&self) -> Vec<Document> {
        self.entries.iter().map(LogEntry::to_document).collect()
    }

    /// 배치에서 처음 나오는 워커 stderr 엔트리
    pub fn first_worker_stderr(&self) -> Option<WorkerStderrError> {
        self.entries
            .iter()
            .find(|e| e.is_worker() && e.is_error())
            .map(|e| WorkerStderrError::new(e.origin(), String::from_utf8_lossy(e.msg())))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.touched.clear();
    }
}
