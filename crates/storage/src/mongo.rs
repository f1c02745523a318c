//! MongoDB 백엔드
//!
//! 문서는 `serde_json` 객체로 주고받고, 경계에서 BSON으로 변환합니다.
//! 조회 결과는 relaxed extended JSON으로 돌려줍니다.

use std::time::Duration;

use mongodb::bson::{self, Bson, Document as BsonDocument, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database, IndexModel};
use serde_json::{Map, Value};

use gauntlet_core::error::StorageError;
use gauntlet_core::uri::StorageUri;

use crate::Document;

/// MongoDB 연결 핸들
///
/// `Client`가 내부적으로 연결 풀을 공유하므로 복제 비용이 작습니다.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// URI로 연결하고 ping으로 연결을 확인합니다.
    pub async fn connect(uri: &StorageUri, timeout: Duration) -> Result<Self, StorageError> {
        let mut options = ClientOptions::parse(uri.as_str())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client =
            Client::with_options(options).map_err(|e| StorageError::Connection(e.to_string()))?;
        let db = client.database(uri.database());
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        tracing::debug!(database = uri.database(), "connected to mongodb");
        Ok(Self { client, db })
    }

    pub async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<(), StorageError> {
        if docs.is_empty() {
            return Ok(());
        }
        let docs = docs
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<BsonDocument>, _>>()
            .map_err(|e| StorageError::Insert(e.to_string()))?;
        self.db
            .collection::<BsonDocument>(collection)
            .insert_many(docs)
            .await
            .map_err(|e| StorageError::Insert(e.to_string()))?;
        Ok(())
    }

    pub async fn find_latest(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Document>, StorageError> {
        let filter = bson::to_document(filter).map_err(|e| StorageError::Query(e.to_string()))?;
        let found = self
            .db
            .collection::<BsonDocument>(collection)
            .find_one(filter)
            .sort(doc! { "_id": -1 })
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(found.and_then(|d| match Bson::Document(d).into_relaxed_extjson() {
            Value::Object(map) => Some(map),
            _ => None,
        }))
    }

    pub async fn ensure_indexes(&self, collection: &str, keys: &[&str]) -> Result<(), StorageError> {
        let models = keys.iter().map(|key| {
            let mut spec = BsonDocument::new();
            spec.insert(*key, 1);
            IndexModel::builder().keys(spec).build()
        });
        self.db
            .collection::<BsonDocument>(collection)
            .create_indexes(models)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}
