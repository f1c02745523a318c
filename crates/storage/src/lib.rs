#![doc = include_str!("../README.md")]

pub mod filter;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod pool;

use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use ulid::{Generator, Ulid};

use gauntlet_core::error::StorageError;
use gauntlet_core::uri::StorageUri;

pub use memory::MemoryStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;
pub use pool::StoragePool;

/// 저장소가 주고받는 문서
pub type Document = Map<String, Value>;

/// 문서 id 필드
pub const ID_FIELD: &str = "_id";

static ID_GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// 단조 증가하는 문서 id를 생성합니다.
///
/// 같은 밀리초 안에서도 증가하므로 `_id` 내림차순이 삽입 역순과 같습니다.
pub fn next_id() -> String {
    let mut generator = ID_GENERATOR.lock().unwrap_or_else(PoisonError::into_inner);
    generator
        .generate()
        .unwrap_or_else(|_| Ulid::new())
        .to_string()
}

/// 문서 저장소 백엔드
#[derive(Debug, Clone)]
pub enum Storage {
    /// `memory://` URI
    Memory(MemoryStore),
    /// `mongodb://`, `mongodb+srv://` URI
    #[cfg(feature = "mongodb")]
    Mongo(MongoStore),
}

impl Storage {
    /// URI 스킴에 맞는 백엔드로 연결합니다.
    ///
    /// `memory://` 는 매번 새 저장소를 만듭니다. 같은 메모리 저장소를 공유하려면
    /// [`StoragePool::insert`]로 미리 등록합니다.
    pub async fn connect(uri: &StorageUri, timeout: Duration) -> Result<Self, StorageError> {
        match uri.scheme() {
            "memory" => Ok(Self::Memory(MemoryStore::new())),
            #[cfg(feature = "mongodb")]
            "mongodb" | "mongodb+srv" => Ok(Self::Mongo(MongoStore::connect(uri, timeout).await?)),
            #[cfg(not(feature = "mongodb"))]
            "mongodb" | "mongodb+srv" => {
                let _ = timeout;
                Err(StorageError::Connection(
                    "mongodb support is not enabled in this build".to_owned(),
                ))
            }
            other => Err(StorageError::InvalidUri {
                uri: uri.to_string(),
                reason: format!("unsupported scheme {other:?}"),
            }),
        }
    }

    /// 문서들을 한 번의 호출로 삽입합니다. `_id`가 없는 문서에는 새 id를 붙입니다.
    pub async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<(), StorageError> {
        let docs = docs
            .into_iter()
            .map(|mut doc| {
                if !doc.contains_key(ID_FIELD) {
                    doc.insert(ID_FIELD.to_owned(), Value::String(next_id()));
                }
                doc
            })
            .collect();
        match self {
            Self::Memory(store) => store.insert_many(collection, docs),
            #[cfg(feature = "mongodb")]
            Self::Mongo(store) => store.insert_many(collection, docs).await,
        }
    }

    /// 필터를 만족하는 문서 중 `_id`가 가장 큰(가장 최근) 문서를 반환합니다.
    pub async fn find_latest(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Document>, StorageError> {
        match self {
            Self::Memory(store) => store.find_latest(collection, filter),
            #[cfg(feature = "mongodb")]
            Self::Mongo(store) => store.find_latest(collection, filter).await,
        }
    }

    /// 컬렉션에 단일 필드 오름차순 인덱스를 만듭니다.
    pub async fn ensure_indexes(&self, collection: &str, keys: &[&str]) -> Result<(), StorageError> {
        match self {
            Self::Memory(store) => {
                store.ensure_indexes(collection, keys);
                Ok(())
            }
            #[cfg(feature = "mongodb")]
            Self::Mongo(store) => store.ensure_indexes(collection, keys).await,
        }
    }

    pub async fn close(&self) -> Result<(), StorageError> {
        match self {
            Self::Memory(_) => Ok(()),
            #[cfg(feature = "mongodb")]
            Self::Mongo(store) => {
                store.close().await;
                Ok(())
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            #[cfg(feature = "mongodb")]
            Self::Mongo(_) => "mongodb",
        }
    }
}
