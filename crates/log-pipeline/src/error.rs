//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 수집 파이프라인 내부에서 발생하는 에러를 표현합니다.
//! `From<LogPipelineError> for GauntletError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use gauntlet_core::error::{GauntletError, PipelineError, StorageError};

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 로그 파일 생성 실패
    #[error("failed to create log file {path}: {reason}")]
    FileCreate {
        /// 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 로그 파일 쓰기/동기화 실패
    #[error("failed to write log file {path}: {reason}")]
    FileWrite {
        /// 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LogPipelineError> for GauntletError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Storage(e) => GauntletError::Storage(e),
            LogPipelineError::Channel(reason) => {
                GauntletError::Pipeline(PipelineError::ChannelSend(reason))
            }
            other => GauntletError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
