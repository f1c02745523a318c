#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`ingestor`]: 수집 루프 (Pipeline trait 구현) 및 송신 핸들
//! - [`collector`]: `AsyncRead` 출력을 줄 단위 엔트리로 변환
//! - [`files`]: 출처별 stdout/stderr 로그 파일
//! - [`batch`]: flush 주기 사이에 모인 엔트리
//! - [`config`]: 파이프라인 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Fleet log streams / host commands / daemon
//!                  |
//!             IngestSender
//!                  |
//!            LogIngestor ---> files (즉시)
//!                  |
//!                Batch ---> Storage::insert_many (flush 주기마다)
//!                  |
//!           exit channel (워커 stderr, exit_on_error)
//! ```

pub mod batch;
pub mod collector;
pub mod config;
pub mod error;
pub mod files;
pub mod ingestor;

// --- 주요 타입 re-export ---

pub use collector::pump_lines;
pub use config::{IngestConfig, IngestConfigBuilder};
pub use error::LogPipelineError;
pub use files::LogFileSet;
pub use ingestor::{IngestSender, IngestStats, LogIngestor, LogIngestorBuilder};
