//! 조건 평가기
//!
//! [`Condition`]은 쿼리 템플릿, 스토리지 URI(템플릿 가능), 대상 컬렉션으로 구성됩니다.
//! 평가할 때마다 변수 저장소로 쿼리를 확장하고 가장 최근의 매칭 레코드를 조회합니다.
//!
//! 템플릿이 없는 쿼리만 파싱 결과를 캐시합니다. 템플릿 쿼리는 등록된 변수가
//! 바뀔 수 있으므로 매번 다시 확장합니다. 스토리지는 첫 평가에서 연결한 핸들을
//! 이후 평가에서도 그대로 사용합니다.

use std::sync::OnceLock;

use serde_json::{Map, Value};

use gauntlet_core::design::{ConditionSpec, parse_filter};
use gauntlet_core::template;
use gauntlet_core::uri::StorageUri;
use gauntlet_core::vars::Vars;
use gauntlet_storage::{Document, Storage, StoragePool};

use crate::error::ScenarioError;

/// 컴파일된 조건
#[derive(Debug)]
pub struct Condition {
    query: String,
    storage: String,
    col: String,
    /// 템플릿이 없는 쿼리의 파싱 결과
    cached: OnceLock<Map<String, Value>>,
    /// 첫 평가에서 연결한 스토리지
    bound: OnceLock<Storage>,
}

impl Condition {
    /// 설계 문서의 조건으로 생성합니다. 스토리지가 비어 있으면 `default_storage`를 사용합니다.
    pub fn new(spec: &ConditionSpec, default_storage: &StorageUri) -> Self {
        let storage = if spec.storage.is_empty() {
            default_storage.as_str().to_owned()
        } else {
            spec.storage.clone()
        };
        Self {
            query: spec.query.clone(),
            storage,
            col: spec.col.clone(),
            cached: OnceLock::new(),
            bound: OnceLock::new(),
        }
    }

    /// 확장 전 쿼리 템플릿
    pub fn query_string(&self) -> &str {
        &self.query
    }

    pub fn collection(&self) -> &str {
        &self.col
    }

    /// 쿼리를 확장하고 필터 문서로 파싱합니다.
    ///
    /// 정의되지 않은 변수가 남으면 `Template`, 파싱에 실패하면 `Query` 에러입니다.
    pub fn compiled_query(&self, vars: &Vars) -> Result<Map<String, Value>, ScenarioError> {
        if let Some(cached) = self.cached.get() {
            return Ok(cached.clone());
        }
        if !template::is_templated(&self.query) {
            let parsed = parse_filter(&self.query)?;
            return Ok(self.cached.get_or_init(|| parsed).clone());
        }

        let expanded = vars.expand_template(&self.query)?;
        Ok(parse_filter(&expanded)?)
    }

    /// 확장된 스토리지 URI
    pub fn storage_uri(&self, vars: &Vars) -> Result<String, ScenarioError> {
        if template::is_templated(&self.storage) {
            Ok(vars.expand_template(&self.storage)?)
        } else {
            Ok(self.storage.clone())
        }
    }

    /// 조건을 평가합니다.
    ///
    /// 매칭되는 레코드가 없으면 `Ok(None)`입니다. 연결은 `pool`에 캐시되어
    /// 같은 URI를 쓰는 다른 조건과 공유됩니다. 스토리지 URI는 첫 평가에서만
    /// 확장하며, 이후 변수가 바뀌어도 처음 연결한 핸들을 사용합니다.
    pub async fn check(
        &self,
        vars: &Vars,
        pool: &mut StoragePool,
    ) -> Result<Option<Document>, ScenarioError> {
        let storage = self.bind_storage(vars, pool).await?;
        let filter = self.compiled_query(vars)?;
        Ok(storage.find_latest(&self.col, &filter).await?)
    }

    async fn bind_storage(
        &self,
        vars: &Vars,
        pool: &mut StoragePool,
    ) -> Result<Storage, ScenarioError> {
        if let Some(storage) = self.bound.get() {
            return Ok(storage.clone());
        }
        let uri = self.storage_uri(vars)?;
        let storage = pool.get_or_connect(&uri).await?;
        Ok(self.bound.get_or_init(|| storage).clone())
    }
}
