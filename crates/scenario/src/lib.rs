//! # gauntlet-scenario
//!
//! 시나리오 실행 엔진: 조건 평가, 시퀀스 상태 머신, 액션.
//!
//! # 모듈 구성
//! - [`condition`]: 쿼리 템플릿 확장과 최신 레코드 조회
//! - [`sequence`]: 조건/액션/등록 규칙 묶음과 설계 문서 로딩
//! - [`action`]: 닫힌 액션 집합과 이름 기반 레지스트리
//! - [`watcher`]: 폴링 기반 상태 머신 ([`Pipeline`](gauntlet_core::pipeline::Pipeline) 구현)
//! - [`error`]: 시나리오 에러 타입

pub mod action;
pub mod condition;
pub mod error;
pub mod sequence;
pub mod watcher;

pub use action::{Action, ActionRegistry};
pub use condition::Condition;
pub use error::ScenarioError;
pub use sequence::{Sequence, load_sequences};
pub use watcher::{ScenarioStatus, ScenarioWatcher, ScenarioWatcherBuilder};
