//! 프로세스 내 문서 저장소
//!
//! 컬렉션별로 삽입 순서를 보존하는 벡터를 유지합니다.
//! 같은 `MemoryStore`를 복제한 핸들은 모두 같은 데이터를 봅니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};

use gauntlet_core::error::StorageError;

use crate::Document;
use crate::filter;

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, Vec<Document>>,
    indexes: HashMap<String, Vec<String>>,
    /// 컬렉션별 insert_many 호출마다 넘어온 문서 수
    insert_calls: HashMap<String, Vec<usize>>,
}

/// 메모리 저장소
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    fail_inserts: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후의 삽입을 모두 실패시키거나 다시 허용합니다.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 문서들을 한 번에 삽입합니다.
    pub fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<(), StorageError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Insert(format!(
                "memory store rejects inserts into {collection}"
            )));
        }
        let mut inner = self.lock();
        inner
            .insert_calls
            .entry(collection.to_owned())
            .or_default()
            .push(docs.len());
        inner
            .collections
            .entry(collection.to_owned())
            .or_default()
            .extend(docs);
        Ok(())
    }

    /// 필터를 만족하는 가장 최근 문서를 찾습니다.
    pub fn find_latest(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Document>, StorageError> {
        let inner = self.lock();
        let Some(docs) = inner.collections.get(collection) else {
            return Ok(None);
        };
        for doc in docs.iter().rev() {
            if filter::matches(doc, filter)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    /// 인덱스 키를 기록합니다. 이미 있는 키는 무시합니다.
    pub fn ensure_indexes(&self, collection: &str, keys: &[&str]) {
        let mut inner = self.lock();
        let existing = inner.indexes.entry(collection.to_owned()).or_default();
        for key in keys {
            if !existing.iter().any(|k| k == key) {
                existing.push((*key).to_owned());
            }
        }
    }

    /// 컬렉션의 모든 문서 (삽입 순서)
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// 컬렉션에 대한 insert_many 호출별 문서 수
    pub fn insert_calls(&self, collection: &str) -> Vec<usize> {
        self.lock()
            .insert_calls
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn indexes(&self, collection: &str) -> Vec<String> {
        self.lock()
            .indexes
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}
