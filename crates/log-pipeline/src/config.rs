//! 수집 파이프라인 설정
//!
//! [`IngestConfig`]는 core의 [`PipelineConfig`](gauntlet_core::config::PipelineConfig)에
//! 설계 문서의 `exit-on-error` 값을 더한 것입니다.
//!
//! # 사용 예시
//! ```ignore
//! use gauntlet_core::config::GauntletConfig;
//! use gauntlet_log_pipeline::config::IngestConfig;
//!
//! let core_config = GauntletConfig::default();
//! let config = IngestConfig::from_core(&core_config.pipeline, design.exit_on_error);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use gauntlet_core::design::DEFAULT_COLLECTION;

use crate::error::LogPipelineError;

/// 수집 파이프라인 설정
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// 출처별 로그 파일 디렉토리
    pub log_dir: PathBuf,
    /// 배치 flush 간격
    pub flush_interval: Duration,
    /// 엔트리 채널 용량
    pub channel_capacity: usize,
    /// 문서가 저장될 컬렉션
    pub collection: String,
    /// 워커 stderr 출력 시 실행 중단 신호를 보낼지 여부
    pub exit_on_error: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./gauntlet-logs"),
            flush_interval: Duration::from_millis(50),
            channel_capacity: 100,
            collection: DEFAULT_COLLECTION.to_owned(),
            exit_on_error: true,
        }
    }
}

impl IngestConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &gauntlet_core::config::PipelineConfig, exit_on_error: bool) -> Self {
        Self {
            log_dir: PathBuf::from(&core.log_dir),
            flush_interval: core.flush_interval(),
            channel_capacity: core.channel_capacity,
            collection: core.collection.clone(),
            exit_on_error,
        }
    }

    pub fn validate(&self) -> Result<(), LogPipelineError> {
        if self.log_dir.as_os_str().is_empty() {
            return Err(LogPipelineError::Config {
                field: "log_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.flush_interval.is_zero() {
            return Err(LogPipelineError::Config {
                field: "flush_interval".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(LogPipelineError::Config {
                field: "channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.collection.is_empty() {
            return Err(LogPipelineError::Config {
                field: "collection".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

/// [`IngestConfig`] 빌더
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.config.collection = collection.into();
        self
    }

    pub fn exit_on_error(mut self, enabled: bool) -> Self {
        self.config.exit_on_error = enabled;
        self
    }

    /// 검증을 거쳐 설정을 만듭니다.
    pub fn build(self) -> Result<IngestConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
