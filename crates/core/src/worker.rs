//! 워커 생명주기 제어 인터페이스
//!
//! 시나리오 액션은 컨테이너 런타임을 직접 알지 못하고 [`WorkerControl`]만 호출합니다.
//! 실제 구현은 `gauntlet-container`의 `Fleet`이 제공합니다.
//!
//! `Pipeline`과 달리 `Arc<dyn WorkerControl>`로 공유해야 하므로
//! [`BoxFuture`]를 반환하는 dyn 호환 형태로 정의합니다.

use std::fmt;

use crate::error::GauntletError;
use crate::pipeline::BoxFuture;

/// 워커 생명주기 명령
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerCommand {
    /// 초기화 컨테이너를 끝날 때까지 실행
    Init,
    /// 실행 컨테이너를 백그라운드로 시작
    Start,
    /// 사용자 인자로 러너를 끝날 때까지 실행
    Custom,
    /// 실행 중인 컨테이너 정지
    Stop,
}

impl WorkerCommand {
    pub const ALL: [WorkerCommand; 4] = [Self::Init, Self::Start, Self::Custom, Self::Stop];

    /// 설계 문서의 액션 이름에 해당하는 명령
    ///
    /// `*-nodes` 이름도 같은 명령으로 받아들입니다.
    pub fn from_action_name(name: &str) -> Option<Self> {
        let kind = name
            .strip_suffix("-workers")
            .or_else(|| name.strip_suffix("-nodes"))?;
        match kind {
            "init" => Some(Self::Init),
            "start" => Some(Self::Start),
            "custom" => Some(Self::Custom),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            Self::Init => "init-workers",
            Self::Start => "start-workers",
            Self::Custom => "custom-workers",
            Self::Stop => "stop-workers",
        }
    }

    /// 인자를 받는 명령인지
    pub fn takes_args(&self) -> bool {
        matches!(self, Self::Start | Self::Custom)
    }
}

impl fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_name())
    }
}

/// 워커 집합에 생명주기 명령을 내리는 dyn 호환 trait
pub trait WorkerControl: Send + Sync {
    /// 관리 중인 워커 alias 목록 (정렬됨)
    fn workers(&self) -> Vec<String>;

    /// `workers`에 명령을 실행합니다. 비어 있으면 모든 워커가 대상입니다.
    ///
    /// `args`는 이미 템플릿 확장이 끝난 값입니다.
    fn execute(
        &self,
        command: WorkerCommand,
        workers: Vec<String>,
        args: Vec<String>,
    ) -> BoxFuture<'_, Result<(), GauntletError>>;
}
