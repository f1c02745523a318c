//! 에러 타입 — 도메인별 에러 정의
//!
//! 실행 중 발생하는 모든 에러는 최종적으로 [`GauntletError`]로 수렴합니다.
//! 각 크레이트의 도메인 에러는 `From` 변환을 구현하여 `?`로 전파됩니다.

use std::fmt;

/// Gauntlet 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum GauntletError {
    /// 설계 문서 또는 러너 설정 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 템플릿 확장 실패
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// 조건 쿼리 파싱 실패
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// 스토리지 연결/쿼리 실패
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 액션 실행 실패
    #[error("action error: {0}")]
    Action(#[from] ActionError),

    /// 워커 stderr 감지 (exit-on-error)
    #[error("{0}")]
    WorkerStderr(#[from] WorkerStderrError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GauntletError {
    /// stderr 트립와이어 신호인지 확인합니다.
    pub fn as_worker_stderr(&self) -> Option<&WorkerStderrError> {
        match self {
            Self::WorkerStderr(e) => Some(e),
            _ => None,
        }
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// `InvalidValue` 생성 헬퍼
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 템플릿 확장 에러
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// 참조한 변수가 정의되지 않음
    #[error("variable '{key}' is not defined (line {line})")]
    UndefinedVariable { key: String, line: usize },

    /// 값을 문자열로 렌더링할 수 없음
    #[error("failed to render variable '{key}': {reason}")]
    Render { key: String, reason: String },
}

/// 조건 쿼리 에러
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// 빈 쿼리
    #[error("empty query")]
    Empty,

    /// 필터 문서로 해석할 수 없는 쿼리
    #[error("malformed query {query:?}: {reason}")]
    Malformed { query: String, reason: String },
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 삽입 실패
    #[error("insert failed: {0}")]
    Insert(String),

    /// 유효하지 않은 URI
    #[error("invalid storage uri {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },
}

/// 액션 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// 등록되지 않은 액션 이름
    #[error("unknown action: {0}")]
    Unknown(String),

    /// 액션 인자 오류
    #[error("invalid arguments for action '{action}': {reason}")]
    InvalidArgs { action: String, reason: String },

    /// 실행 실패
    #[error("action '{action}' failed: {reason}")]
    Execution { action: String, reason: String },

    /// 시간 초과
    #[error("action '{action}' timed out after {secs}s")]
    Timeout { action: String, secs: u64 },

    /// kill 액션이 전달한 에러
    #[error("killed: {0}")]
    Killed(String),
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("not running")]
    NotRunning,

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 유효하지 않은 로그 엔트리
    #[error("invalid log entry: {0}")]
    InvalidEntry(String),
}

/// 워커가 stderr에 출력했음을 알리는 트립와이어 신호
///
/// 기술적 장애가 아니라 `exit-on-error`가 켜진 실행을 즉시 중단시키기 위한 신호입니다.
/// `Display`는 메시지를 50자로 자르고, [`render`](Self::render)는 전체 블록을 출력합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStderrError {
    /// 워커 alias
    pub worker: String,
    /// stderr 원문
    pub message: String,
}

const STDERR_PREVIEW_CHARS: usize = 50;

impl WorkerStderrError {
    pub fn new(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            message: message.into(),
        }
    }

    /// 운영자에게 보여줄 전체 stderr 블록을 렌더링합니다.
    pub fn render(&self) -> String {
        let rule = "=".repeat(80);
        format!(
            "worker {:?} wrote to stderr:\n{rule}\n{}\n{rule}",
            self.worker, self.message
        )
    }
}

impl fmt::Display for WorkerStderrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.message.chars().take(STDERR_PREVIEW_CHARS).collect();
        if preview.len() < self.message.len() {
            write!(f, "worker {:?} wrote to stderr: {preview} ...", self.worker)
        } else {
            write!(f, "worker {:?} wrote to stderr: {preview}", self.worker)
        }
    }
}

impl std::error::Error for WorkerStderrError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_gauntlet_error() {
        let err: GauntletError = ConfigError::invalid("storage", "empty database name").into();
        assert!(matches!(err, GauntletError::Config(_)));
        assert!(err.to_string().contains("storage"));
        assert!(err.to_string().contains("empty database name"));
    }

    #[test]
    fn worker_stderr_display_is_truncated() {
        let long = "x".repeat(120);
        let err = WorkerStderrError::new("n0", long.clone());
        let msg = err.to_string();
        assert!(msg.contains("n0"));
        assert!(msg.ends_with(" ..."));
        assert!(!msg.contains(&long));
    }

    #[test]
    fn worker_stderr_display_short_message_untouched() {
        let err = WorkerStderrError::new("n0", "panic: boom");
        assert_eq!(err.to_string(), "worker \"n0\" wrote to stderr: panic: boom");
    }

    #[test]
    fn worker_stderr_render_contains_full_block() {
        let long = "y".repeat(120);
        let err = WorkerStderrError::new("n1", long.clone());
        let block = err.render();
        assert!(block.contains(&long));
        assert_eq!(block.matches(&"=".repeat(80)).count(), 2);
    }

    #[test]
    fn as_worker_stderr_only_matches_tripwire() {
        let err: GauntletError = WorkerStderrError::new("n0", "e").into();
        assert!(err.as_worker_stderr().is_some());
        let err: GauntletError = QueryError::Empty.into();
        assert!(err.as_worker_stderr().is_none());
    }
}
