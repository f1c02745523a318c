//! 병렬 fan-out — 단위 작업마다 태스크 하나
//!
//! 모든 태스크가 끝날 때까지 기다린 뒤, 가장 먼저 보고된 에러 하나만 반환합니다.
//! 여러 개가 실패해도 나머지는 로그로만 남기고 집계하지 않습니다.

use std::future::Future;

use tokio::task::JoinSet;

use crate::error::{ActionError, GauntletError};

/// `items`의 각 원소에 대해 `f`를 별도 태스크로 실행합니다.
pub async fn run_all<T, F, Fut>(items: impl IntoIterator<Item = T>, f: F) -> Result<(), GauntletError>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), GauntletError>> + Send + 'static,
{
    let mut set = JoinSet::new();
    for item in items {
        set.spawn(f(item));
    }

    let mut first: Option<GauntletError> = None;
    while let Some(joined) = set.join_next().await {
        let outcome = joined.unwrap_or_else(|e| {
            Err(ActionError::Execution {
                action: "fan-out".to_owned(),
                reason: format!("task failed to complete: {e}"),
            }
            .into())
        });
        if let Err(e) = outcome {
            if first.is_none() {
                first = Some(e);
            } else {
                tracing::debug!(error = %e, "additional fan-out failure");
            }
        }
    }

    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
