//! 러너 설정 — gauntlet.toml 파싱 및 런타임 설정
//!
//! [`GauntletConfig`]는 러너 프로세스 자체의 동작(로그, 수집 주기, 감시 주기, 컨테이너 런타임)을
//! 담습니다. 시나리오 내용은 [`Design`](crate::design::Design)이 따로 담당합니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`GAUNTLET_PIPELINE_FLUSH_INTERVAL_MS=100` 형식)
//! 3. 설정 파일 (`gauntlet.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), gauntlet_core::error::GauntletError> {
//! use gauntlet_core::config::GauntletConfig;
//!
//! let config = GauntletConfig::load("gauntlet.toml").await?;
//! let config = GauntletConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, GauntletError};

/// Gauntlet 러너 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GauntletConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 로그 수집 파이프라인 설정
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// 시나리오 감시기 설정
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// 컨테이너 런타임 설정
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl GauntletConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, GauntletError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GauntletError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                GauntletError::Io(e)
            }
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일이 없으면 기본값에 환경변수 오버라이드만 적용합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, GauntletError> {
        match Self::load(path).await {
            Err(GauntletError::Config(ConfigError::FileNotFound { path })) => {
                tracing::debug!(path = %path, "config file not found, using defaults");
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, GauntletError> {
        toml::from_str(toml_str).map_err(|e| {
            GauntletError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `GAUNTLET_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "GAUNTLET_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "GAUNTLET_GENERAL_LOG_FORMAT");

        override_string(&mut self.pipeline.log_dir, "GAUNTLET_PIPELINE_LOG_DIR");
        override_u64(
            &mut self.pipeline.flush_interval_ms,
            "GAUNTLET_PIPELINE_FLUSH_INTERVAL_MS",
        );
        override_usize(
            &mut self.pipeline.channel_capacity,
            "GAUNTLET_PIPELINE_CHANNEL_CAPACITY",
        );
        override_string(&mut self.pipeline.collection, "GAUNTLET_PIPELINE_COLLECTION");

        override_u64(
            &mut self.watcher.poll_interval_ms,
            "GAUNTLET_WATCHER_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.watcher.connect_timeout_secs,
            "GAUNTLET_WATCHER_CONNECT_TIMEOUT_SECS",
        );

        override_string(&mut self.runtime.docker_socket, "GAUNTLET_RUNTIME_DOCKER_SOCKET");
        override_u16(
            &mut self.runtime.remote_docker_port,
            "GAUNTLET_RUNTIME_REMOTE_DOCKER_PORT",
        );
        override_string(&mut self.runtime.image, "GAUNTLET_RUNTIME_IMAGE");
        override_string(&mut self.runtime.runner_path, "GAUNTLET_RUNTIME_RUNNER_PATH");
        override_string(&mut self.runtime.base_dir, "GAUNTLET_RUNTIME_BASE_DIR");
        override_u64(
            &mut self.runtime.host_command_timeout_secs,
            "GAUNTLET_RUNTIME_HOST_COMMAND_TIMEOUT_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), GauntletError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            )
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            )
            .into());
        }

        if self.pipeline.log_dir.is_empty() {
            return Err(ConfigError::invalid("pipeline.log_dir", "must not be empty").into());
        }
        if self.pipeline.flush_interval_ms == 0 {
            return Err(
                ConfigError::invalid("pipeline.flush_interval_ms", "must be greater than 0").into(),
            );
        }
        if self.pipeline.channel_capacity == 0 {
            return Err(
                ConfigError::invalid("pipeline.channel_capacity", "must be greater than 0").into(),
            );
        }
        if self.pipeline.collection.is_empty() {
            return Err(ConfigError::invalid("pipeline.collection", "must not be empty").into());
        }

        if self.watcher.poll_interval_ms == 0 {
            return Err(
                ConfigError::invalid("watcher.poll_interval_ms", "must be greater than 0").into(),
            );
        }

        if self.runtime.image.is_empty() {
            return Err(ConfigError::invalid("runtime.image", "must not be empty").into());
        }
        if self.runtime.base_dir.is_empty() {
            return Err(ConfigError::invalid("runtime.base_dir", "must not be empty").into());
        }
        if self.runtime.host_command_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "runtime.host_command_timeout_secs",
                "must be greater than 0",
            )
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 로그 수집 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 워커별 로그 파일 디렉토리
    pub log_dir: String,
    /// 배치 flush 간격 (밀리초)
    pub flush_interval_ms: u64,
    /// 엔트리 채널 용량
    pub channel_capacity: usize,
    /// 로그 문서가 저장될 컬렉션
    pub collection: String,
}

impl PipelineConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_dir: "./gauntlet-logs".to_owned(),
            flush_interval_ms: 50,
            channel_capacity: 100,
            collection: "log".to_owned(),
        }
    }
}

/// 시나리오 감시기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// 조건 평가 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 스토리지 연결 시간 제한 (초)
    pub connect_timeout_secs: u64,
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            connect_timeout_secs: 3,
        }
    }
}

/// 컨테이너 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 로컬 Docker 소켓 경로 (비어 있으면 플랫폼 기본값)
    pub docker_socket: String,
    /// 원격 호스트 Docker API 포트
    pub remote_docker_port: u16,
    /// 워커 컨테이너 이미지
    pub image: String,
    /// 워커 컨테이너에 마운트할 runner 바이너리 경로
    pub runner_path: String,
    /// 워커 설정/데이터 디렉토리
    pub base_dir: String,
    /// host-command 액션 시간 제한 (초)
    pub host_command_timeout_secs: u64,
}

impl RuntimeConfig {
    pub fn host_command_timeout(&self) -> Duration {
        Duration::from_secs(self.host_command_timeout_secs)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_socket: String::new(),
            remote_docker_port: 2375,
            image: "debian:testing-slim".to_owned(),
            runner_path: "./runner".to_owned(),
            base_dir: "/tmp/gauntlet".to_owned(),
            host_command_timeout_secs: 30,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, kind: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                kind,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}
