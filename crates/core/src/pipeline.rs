//! 생명주기 trait — 장기 실행 컴포넌트의 공통 인터페이스
//!
//! 로그 수집 파이프라인과 시나리오 감시기는 모두 [`Pipeline`]을 구현하여
//! 데몬에서 동일한 start/stop/health_check 생명주기로 관리됩니다.

use std::future::Future;
use std::pin::Pin;

use crate::error::GauntletError;

/// dyn 호환 trait에서 사용하는 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 컴포넌트 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하 또는 부분 장애
    Degraded(String),
    /// 동작하지 않음
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 백그라운드 태스크를 소유하는 컴포넌트의 생명주기 trait
///
/// 이미 실행 중일 때 `start`를 호출하면 [`PipelineError::AlreadyRunning`],
/// 실행 중이 아닐 때 `stop`을 호출하면 [`PipelineError::NotRunning`]을 반환해야 합니다.
///
/// [`PipelineError::AlreadyRunning`]: crate::error::PipelineError::AlreadyRunning
/// [`PipelineError::NotRunning`]: crate::error::PipelineError::NotRunning
pub trait Pipeline: Send {
    /// 백그라운드 태스크를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), GauntletError>> + Send;

    /// 백그라운드 태스크를 정지하고 남은 작업을 정리합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), GauntletError>> + Send;

    /// 현재 헬스 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Degraded("slow".to_owned()).is_healthy());
        assert!(HealthStatus::Unhealthy("stopped".to_owned()).is_unhealthy());
        assert!(!HealthStatus::Degraded("slow".to_owned()).is_unhealthy());
    }
}
