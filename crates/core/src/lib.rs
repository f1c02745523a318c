#![doc = include_str!("../README.md")]

pub mod config;
pub mod design;
pub mod distribute;
pub mod error;
pub mod exit;
pub mod fanout;
pub mod metrics;
pub mod pipeline;
pub mod template;
pub mod types;
pub mod uri;
pub mod value;
pub mod vars;
pub mod worker;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{
    ActionError, ConfigError, GauntletError, PipelineError, QueryError, StorageError,
    TemplateError, WorkerStderrError,
};

// 설정
pub use config::GauntletConfig;
pub use design::{ActionSpec, ConditionSpec, Design, DesignHost, RegisterSpec, SequenceSpec};

// 생명주기
pub use exit::{ExitReceiver, ExitSender, ExitSignal, emit_exit, exit_channel};
pub use pipeline::{BoxFuture, HealthStatus, Pipeline};

// 도메인 타입
pub use distribute::{Placement, place, spread};
pub use types::{LogEntry, SYSTEM_ALIAS};
pub use uri::StorageUri;
pub use vars::Vars;
pub use worker::{WorkerCommand, WorkerControl};
