//! 시나리오 에러 타입
//!
//! [`ScenarioError`]는 시퀀스 로딩과 조건 평가에서 발생하는 에러를 표현합니다.
//! `From<ScenarioError> for GauntletError` 변환으로 종료 채널까지 그대로 전파됩니다.

use gauntlet_core::error::{
    ActionError, ConfigError, GauntletError, QueryError, StorageError, TemplateError,
};

/// 시나리오 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// 확장된 쿼리가 올바른 필터 문서가 아님
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// 쿼리 또는 스토리지 URI 템플릿 확장 실패
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// 저장소 연결/조회 실패
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 액션 로딩 실패
    #[error("action error: {0}")]
    Action(#[from] ActionError),

    /// 시퀀스 정의 오류
    #[error("invalid sequence '{field}': {reason}")]
    InvalidSequence {
        /// 설계 문서 필드 경로
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<ScenarioError> for GauntletError {
    fn from(err: ScenarioError) -> Self {
        match err {
            ScenarioError::Query(e) => GauntletError::Query(e),
            ScenarioError::Template(e) => GauntletError::Template(e),
            ScenarioError::Storage(e) => GauntletError::Storage(e),
            ScenarioError::Action(e) => GauntletError::Action(e),
            ScenarioError::InvalidSequence { field, reason } => {
                GauntletError::Config(ConfigError::invalid(field, reason))
            }
        }
    }
}
