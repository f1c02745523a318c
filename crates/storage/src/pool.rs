//! URI별 저장소 연결 캐시
//!
//! 같은 URI를 참조하는 조건들은 하나의 연결을 공유합니다.
//! 풀 자체는 동기화하지 않으며, 소유자(시나리오 감시기)의 락 아래에서 사용합니다.

use std::collections::HashMap;
use std::time::Duration;

use gauntlet_core::error::StorageError;
use gauntlet_core::uri::StorageUri;

use crate::Storage;

/// 저장소 연결 풀
#[derive(Debug)]
pub struct StoragePool {
    connections: HashMap<String, Storage>,
    connect_timeout: Duration,
}

impl StoragePool {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connections: HashMap::new(),
            connect_timeout,
        }
    }

    /// 이미 열려 있는 연결을 URI에 등록합니다.
    pub fn insert(&mut self, uri: &StorageUri, storage: Storage) {
        self.connections.insert(uri.as_str().to_owned(), storage);
    }

    /// 캐시된 연결을 반환하거나 새로 연결합니다.
    pub async fn get_or_connect(&mut self, uri: &str) -> Result<Storage, StorageError> {
        let uri = StorageUri::parse(uri)?;
        if let Some(storage) = self.connections.get(uri.as_str()) {
            return Ok(storage.clone());
        }

        tracing::debug!(uri = %uri, "opening storage connection");
        let storage = Storage::connect(&uri, self.connect_timeout).await?;
        self.connections
            .insert(uri.as_str().to_owned(), storage.clone());
        Ok(storage)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// 모든 연결을 닫습니다. 실패는 로그로만 남깁니다.
    pub async fn close_all(&mut self) {
        for (uri, storage) in self.connections.drain() {
            if let Err(e) = storage.close().await {
                tracing::warn!(uri = %uri, error = %e, "failed to close storage connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn same_uri_shares_one_connection() {
        let mut pool = StoragePool::new(Duration::from_secs(1));
        let a = pool.get_or_connect("memory://local/a").await.unwrap();
        let b = pool.get_or_connect("memory://local/a").await.unwrap();
        assert_eq!(pool.len(), 1);

        let doc = json!({"k": 1}).as_object().cloned().unwrap();
        a.insert_many("log", vec![doc.clone()]).await.unwrap();
        assert!(b.find_latest("log", &doc).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn different_uris_get_different_connections() {
        let mut pool = StoragePool::new(Duration::from_secs(1));
        pool.get_or_connect("memory://local/a").await.unwrap();
        pool.get_or_connect("memory://local/b").await.unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn seeded_connection_is_reused() {
        let memory = MemoryStore::new();
        let uri = StorageUri::parse("memory://local/run").unwrap();
        let mut pool = StoragePool::new(Duration::from_secs(1));
        pool.insert(&uri, Storage::Memory(memory.clone()));

        let storage = pool.get_or_connect(" memory://local/run ").await.unwrap();
        storage
            .insert_many("log", vec![json!({"a": 1}).as_object().cloned().unwrap()])
            .await
            .unwrap();
        assert_eq!(memory.documents("log").len(), 1);
    }

    #[tokio::test]
    async fn invalid_uri_is_an_error() {
        let mut pool = StoragePool::new(Duration::from_secs(1));
        assert!(pool.get_or_connect("memory://local/").await.is_err());
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn close_all_empties_the_pool() {
        let mut pool = StoragePool::new(Duration::from_secs(1));
        pool.get_or_connect("memory://local/a").await.unwrap();
        pool.close_all().await;
        assert!(pool.is_empty());
    }
}
