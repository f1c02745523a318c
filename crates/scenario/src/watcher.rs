//! 시나리오 감시기 -- 시퀀스 상태 머신
//!
//! [`ScenarioWatcher`]는 core의 [`Pipeline`] trait을 구현합니다.
//! 고정 주기 tick마다 현재 커서의 조건 하나만 평가하고, 매칭되면 커서를 전진시킨 뒤
//! 액션을 실행합니다.
//!
//! # 상태 전이
//! ```text
//! Running(0) --match--> Running(1) --match--> ... --match--> Completed
//!      |                     |
//!      `---- error ----------+------------------------------> Failed(e)
//! ```
//!
//! 커서와 연결 풀은 하나의 락 아래 있습니다. 한 tick은 액션 실행까지 끝난 뒤에
//! 락을 놓으므로 액션이 다음 조건 평가와 겹치지 않습니다.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gauntlet_core::config::WatcherConfig;
use gauntlet_core::error::{GauntletError, PipelineError};
use gauntlet_core::exit::{ExitSender, emit_exit};
use gauntlet_core::metrics as m;
use gauntlet_core::pipeline::{HealthStatus, Pipeline};
use gauntlet_core::vars::{LAST_MATCH_KEY, Vars};
use gauntlet_storage::StoragePool;
use serde_json::Value;

use crate::sequence::Sequence;

/// 시나리오 진행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioStatus {
    /// 현재 커서
    Running(usize),
    /// 모든 시퀀스 완료
    Completed,
    /// 조건 평가 또는 액션 실패
    Failed(String),
}

impl ScenarioStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running(_))
    }
}

/// 감시기 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherState {
    Initialized,
    Running,
    Stopped,
}

/// 락 아래에서만 접근하는 시나리오 상태
struct Scenario {
    cursor: usize,
    sequences: Vec<Sequence>,
    pool: StoragePool,
}

struct WatcherCore {
    scenario: Mutex<Scenario>,
    vars: Vars,
    exit_tx: ExitSender,
    status: watch::Sender<ScenarioStatus>,
}

impl WatcherCore {
    /// 현재 커서의 조건을 한 번 평가합니다.
    async fn tick(&self) {
        if self.status.borrow().is_terminal() {
            return;
        }

        let mut guard = self.scenario.lock().await;
        let scenario = &mut *guard;
        let total = scenario.sequences.len();
        if scenario.cursor >= total {
            return;
        }

        let index = scenario.cursor;
        let sequence = &scenario.sequences[index];
        let matched = match sequence.condition().check(&self.vars, &mut scenario.pool).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                error!(cursor = index, error = %e, "condition check failed");
                self.fail(e.into());
                return;
            }
        };

        info!(
            cursor = index,
            query = sequence.condition().query_string(),
            "condition matched"
        );
        metrics::counter!(m::SCENARIO_CONDITIONS_MATCHED_TOTAL).increment(1);

        self.vars.set(LAST_MATCH_KEY, Value::Object(matched.clone()));
        sequence.apply_register(&self.vars, &matched);

        scenario.cursor += 1;
        let cursor = scenario.cursor;
        metrics::gauge!(m::SCENARIO_CURSOR).set(cursor as f64);

        let action = sequence.action();
        if !action.is_noop() {
            debug!(cursor = index, action = action.name(), "running action");
            let outcome = action.run(&self.vars).await;
            let result = if outcome.is_ok() { "success" } else { "failure" };
            metrics::counter!(
                m::SCENARIO_ACTIONS_TOTAL,
                m::LABEL_ACTION => action.name().to_owned(),
                m::LABEL_RESULT => result
            )
            .increment(1);

            if let Err(e) = outcome {
                error!(cursor = index, action = action.name(), error = %e, "action failed");
                self.fail(e);
                return;
            }
        }

        if cursor == total {
            info!(sequences = total, "scenario completed");
            self.status.send_replace(ScenarioStatus::Completed);
            emit_exit(&self.exit_tx, Ok(()));
        } else {
            self.status.send_replace(ScenarioStatus::Running(cursor));
        }
    }

    fn fail(&self, err: GauntletError) {
        self.status.send_replace(ScenarioStatus::Failed(err.to_string()));
        emit_exit(&self.exit_tx, Err(err));
    }

    async fn run(self: Arc<Self>, config: WatcherConfig, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("scenario watcher cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                    if self.status.borrow().is_terminal() {
                        break;
                    }
                }
            }
        }
    }
}

/// 시나리오 감시기
///
/// # 사용 예시
/// ```ignore
/// let sequences = load_sequences(&design, &registry)?;
/// let mut watcher = ScenarioWatcherBuilder::new()
///     .config(config.watcher.clone())
///     .sequences(sequences)
///     .vars(vars.clone())
///     .exit_sender(exit_tx.clone())
///     .build()?;
///
/// watcher.start().await?;
/// ```
pub struct ScenarioWatcher {
    config: WatcherConfig,
    state: WatcherState,
    core: Arc<WatcherCore>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ScenarioWatcher {
    pub fn state_name(&self) -> &str {
        match self.state {
            WatcherState::Initialized => "initialized",
            WatcherState::Running => "running",
            WatcherState::Stopped => "stopped",
        }
    }

    /// 현재 시나리오 상태
    pub fn status(&self) -> ScenarioStatus {
        self.core.status.borrow().clone()
    }

    /// 상태 변화를 구독합니다.
    pub fn subscribe(&self) -> watch::Receiver<ScenarioStatus> {
        self.core.status.subscribe()
    }

    /// 현재 커서. 진행 중인 tick이 끝날 때까지 기다립니다.
    pub async fn cursor(&self) -> usize {
        self.core.scenario.lock().await.cursor
    }

    pub fn vars(&self) -> &Vars {
        &self.core.vars
    }

    /// 폴링 루프 없이 한 tick을 직접 평가합니다.
    pub async fn tick(&self) {
        self.core.tick().await;
    }
}

impl Pipeline for ScenarioWatcher {
    async fn start(&mut self) -> Result<(), GauntletError> {
        match self.state {
            WatcherState::Running => return Err(PipelineError::AlreadyRunning.into()),
            WatcherState::Stopped => {
                return Err(PipelineError::InitFailed(
                    "scenario watcher cannot be restarted after stop".to_owned(),
                )
                .into());
            }
            WatcherState::Initialized => {}
        }

        let sequences = self.core.scenario.lock().await.sequences.len();
        info!(
            sequences = sequences,
            poll_interval_ms = self.config.poll_interval_ms,
            "starting scenario watcher"
        );
        let core = Arc::clone(&self.core);
        self.tasks.push(tokio::spawn(
            core.run(self.config.clone(), self.cancel.clone()),
        ));
        self.state = WatcherState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), GauntletError> {
        if self.state != WatcherState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping scenario watcher");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "scenario watcher task ended abnormally");
            }
        }
        self.core.scenario.lock().await.pool.close_all().await;

        self.state = WatcherState::Stopped;
        info!(status = ?self.status(), "scenario watcher stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match (self.state, self.status()) {
            (_, ScenarioStatus::Failed(reason)) => HealthStatus::Unhealthy(reason),
            (WatcherState::Running, _) => HealthStatus::Healthy,
            (WatcherState::Initialized, _) => HealthStatus::Unhealthy("not started".to_owned()),
            (WatcherState::Stopped, _) => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 시나리오 감시기 빌더
pub struct ScenarioWatcherBuilder {
    config: WatcherConfig,
    sequences: Vec<Sequence>,
    vars: Option<Vars>,
    exit_tx: Option<ExitSender>,
    pool: Option<StoragePool>,
}

impl ScenarioWatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: WatcherConfig::default(),
            sequences: Vec::new(),
            vars: None,
            exit_tx: None,
            pool: None,
        }
    }

    pub fn config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sequences(mut self, sequences: Vec<Sequence>) -> Self {
        self.sequences = sequences;
        self
    }

    /// 조건 확장과 등록에 사용할 변수 저장소. 생략하면 빈 저장소입니다.
    pub fn vars(mut self, vars: Vars) -> Self {
        self.vars = Some(vars);
        self
    }

    pub fn exit_sender(mut self, tx: ExitSender) -> Self {
        self.exit_tx = Some(tx);
        self
    }

    /// 미리 연결을 등록해 둔 풀. 생략하면 빈 풀입니다.
    pub fn pool(mut self, pool: StoragePool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> Result<ScenarioWatcher, PipelineError> {
        if self.sequences.is_empty() {
            return Err(PipelineError::InitFailed(
                "a scenario needs at least one sequence".to_owned(),
            ));
        }
        if self.config.poll_interval_ms == 0 {
            return Err(PipelineError::InitFailed(
                "poll interval must be greater than 0".to_owned(),
            ));
        }
        let exit_tx = self
            .exit_tx
            .ok_or_else(|| PipelineError::InitFailed("an exit sender is required".to_owned()))?;
        let pool = self
            .pool
            .unwrap_or_else(|| StoragePool::new(self.config.connect_timeout()));

        let (status, _) = watch::channel(ScenarioStatus::Running(0));
        let core = WatcherCore {
            scenario: Mutex::new(Scenario {
                cursor: 0,
                sequences: self.sequences,
                pool,
            }),
            vars: self.vars.unwrap_or_default(),
            exit_tx,
            status,
        };

        Ok(ScenarioWatcher {
            config: self.config,
            state: WatcherState::Initialized,
            core: Arc::new(core),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }
}

impl Default for ScenarioWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
