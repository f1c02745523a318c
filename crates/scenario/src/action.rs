//! 시퀀스 액션
//!
//! 액션은 닫힌 집합입니다. 설계 문서의 이름은 [`ActionRegistry`]가 로드 시점에
//! [`Action`]으로 변환하며, 알 수 없는 이름이나 잘못된 대상 워커는 그때 거부됩니다.
//!
//! | 이름 | 변형 |
//! |---|---|
//! | (빈 이름) | [`Action::NoOp`] |
//! | `host-command` | [`Action::HostCommand`] |
//! | `init-workers`, `start-workers`, `custom-workers`, `stop-workers` | [`Action::WorkerLifecycle`] |
//! | `kill` | [`Action::Kill`] |

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use gauntlet_core::design::ActionSpec;
use gauntlet_core::error::{ActionError, GauntletError};
use gauntlet_core::exit::{ExitSender, emit_exit};
use gauntlet_core::types::LogEntry;
use gauntlet_core::vars::Vars;
use gauntlet_core::worker::{WorkerCommand, WorkerControl};
use gauntlet_log_pipeline::{IngestSender, LogPipelineError, pump_lines};

use crate::error::ScenarioError;

/// 호스트 명령 액션 이름
pub const HOST_COMMAND: &str = "host-command";

/// 종료 신호 액션 이름
pub const KILL: &str = "kill";

/// 호스트 명령 기본 시간 제한
pub const DEFAULT_HOST_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// 시퀀스가 매칭되었을 때 실행할 액션
#[derive(Debug)]
pub enum Action {
    /// 아무것도 하지 않음
    NoOp,
    /// 로컬 호스트에서 셸 명령 실행
    HostCommand(HostCommand),
    /// 워커 생명주기 명령
    WorkerLifecycle(WorkerLifecycle),
    /// 종료 채널로 신호 전송
    Kill(Kill),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Self::NoOp => "",
            Self::HostCommand(_) => HOST_COMMAND,
            Self::WorkerLifecycle(a) => a.command.action_name(),
            Self::Kill(_) => KILL,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    /// 액션을 실행합니다. 인자의 템플릿은 실행 시점의 `vars`로 확장됩니다.
    pub async fn run(&self, vars: &Vars) -> Result<(), GauntletError> {
        match self {
            Self::NoOp => Ok(()),
            Self::HostCommand(a) => a.run(vars).await,
            Self::WorkerLifecycle(a) => a.run(vars).await,
            Self::Kill(a) => {
                a.run();
                Ok(())
            }
        }
    }
}

/// `/bin/sh -c`로 실행하는 호스트 명령
///
/// stdout/stderr는 연결된 수집기가 있으면 시스템 로그 엔트리로 보냅니다.
/// 0이 아닌 종료 코드는 stderr를 담은 실행 에러입니다.
#[derive(Debug)]
pub struct HostCommand {
    command: String,
    timeout: Duration,
    sender: Option<IngestSender>,
}

impl HostCommand {
    pub fn new(command: impl Into<String>, timeout: Duration, sender: Option<IngestSender>) -> Self {
        Self {
            command: command.into(),
            timeout,
            sender,
        }
    }

    /// 확장 전 명령 템플릿
    pub fn command(&self) -> &str {
        &self.command
    }

    async fn run(&self, vars: &Vars) -> Result<(), GauntletError> {
        let compiled = vars.expand_template(&self.command)?;
        debug!(command = %compiled, "running host command");

        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&compiled)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| execution_error(format!("failed to spawn shell: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let forward_stdout = async {
            let Some(mut stdout) = stdout else {
                return Ok(());
            };
            match &self.sender {
                Some(sender) => pump_lines(stdout, "", false, sender).await.map(drop),
                None => tokio::io::copy(&mut stdout, &mut tokio::io::sink())
                    .await
                    .map(drop)
                    .map_err(LogPipelineError::from),
            }
        };
        let collect_stderr = async {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };

        let joined = tokio::time::timeout(self.timeout, async {
            tokio::join!(forward_stdout, collect_stderr, child.wait())
        })
        .await;
        let Ok((forwarded, stderr, status)) = joined else {
            error!(timeout_secs = self.timeout.as_secs(), "host command timed out");
            return Err(ActionError::Timeout {
                action: HOST_COMMAND.to_owned(),
                secs: self.timeout.as_secs(),
            }
            .into());
        };

        if let Err(e) = forwarded {
            warn!(error = %e, "failed to forward host command output");
        }
        let stderr = String::from_utf8_lossy(&stderr?).trim().to_owned();
        if let Some(sender) = &self.sender {
            for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
                if let Err(e) = sender.submit(LogEntry::system(line, true)).await {
                    warn!(error = %e, "failed to forward host command stderr");
                    break;
                }
            }
        }

        let status = status.map_err(|e| execution_error(format!("failed to wait: {e}")))?;
        if !status.success() {
            error!(exit_code = ?status.code(), stderr = %stderr, "host command failed");
            return Err(execution_error(format!(
                "failed to run command ({status}), {stderr:?}"
            )));
        }

        debug!("host command finished");
        Ok(())
    }
}

fn execution_error(reason: String) -> GauntletError {
    ActionError::Execution {
        action: HOST_COMMAND.to_owned(),
        reason,
    }
    .into()
}

/// 워커 집합에 대한 생명주기 명령
pub struct WorkerLifecycle {
    command: WorkerCommand,
    workers: Vec<String>,
    args: Vec<String>,
    control: Arc<dyn WorkerControl>,
}

impl fmt::Debug for WorkerLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLifecycle")
            .field("command", &self.command)
            .field("workers", &self.workers)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl WorkerLifecycle {
    pub fn command(&self) -> WorkerCommand {
        self.command
    }

    /// 대상 워커. 비어 있으면 전체입니다.
    pub fn workers(&self) -> &[String] {
        &self.workers
    }

    async fn run(&self, vars: &Vars) -> Result<(), GauntletError> {
        let args = self
            .args
            .iter()
            .map(|arg| vars.expand_template(arg))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            action = self.command.action_name(),
            workers = ?self.workers,
            "running worker command"
        );
        self.control
            .execute(self.command, self.workers.clone(), args)
            .await
    }
}

/// 종료 채널로 신호를 보내는 액션
#[derive(Debug)]
pub struct Kill {
    exit_tx: ExitSender,
    error: Option<String>,
}

impl Kill {
    /// 설정된 에러가 있으면 실패 신호를, 없으면 정상 종료 신호를 보냅니다.
    fn run(&self) {
        let signal = match &self.error {
            Some(reason) => Err(ActionError::Killed(reason.clone()).into()),
            None => Ok(()),
        };
        info!(error = ?self.error, "kill action emitting exit signal");
        emit_exit(&self.exit_tx, signal);
    }
}

/// 액션 이름 → [`Action`] 변환기
///
/// 전역 상태 없이 시작 시점에 만들어 시퀀스 로딩에 전달합니다.
///
/// # 사용 예시
/// ```ignore
/// let registry = ActionRegistry::new(exit_tx)
///     .worker_control(Arc::new(fleet.clone()))
///     .host_command_timeout(Duration::from_secs(30))
///     .ingest_sender(sender.clone());
/// let action = registry.build(&spec.action)?;
/// ```
pub struct ActionRegistry {
    exit_tx: ExitSender,
    control: Option<Arc<dyn WorkerControl>>,
    host_command_timeout: Duration,
    sender: Option<IngestSender>,
}

impl ActionRegistry {
    pub fn new(exit_tx: ExitSender) -> Self {
        Self {
            exit_tx,
            control: None,
            host_command_timeout: DEFAULT_HOST_COMMAND_TIMEOUT,
            sender: None,
        }
    }

    /// 워커 생명주기 액션이 사용할 대상
    pub fn worker_control(mut self, control: Arc<dyn WorkerControl>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn host_command_timeout(mut self, timeout: Duration) -> Self {
        self.host_command_timeout = timeout;
        self
    }

    /// 호스트 명령 출력을 보낼 수집기
    pub fn ingest_sender(mut self, sender: IngestSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// 사용할 수 있는 액션 이름
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = vec![HOST_COMMAND, KILL];
        if self.control.is_some() {
            names.extend(WorkerCommand::ALL.iter().map(WorkerCommand::action_name));
        }
        names
    }

    /// 설계 문서의 액션을 검증하고 변환합니다.
    pub fn build(&self, spec: &ActionSpec) -> Result<Action, ScenarioError> {
        if spec.is_noop() {
            return Ok(Action::NoOp);
        }

        let invalid = |reason: &str| {
            ScenarioError::Action(ActionError::InvalidArgs {
                action: spec.name.clone(),
                reason: reason.to_owned(),
            })
        };

        match spec.name.as_str() {
            HOST_COMMAND => {
                let Some(command) = spec.args.first().filter(|c| !c.is_empty()) else {
                    return Err(invalid("empty command"));
                };
                Ok(Action::HostCommand(HostCommand::new(
                    command.clone(),
                    self.host_command_timeout,
                    self.sender.clone(),
                )))
            }
            KILL => Ok(Action::Kill(Kill {
                exit_tx: self.exit_tx.clone(),
                error: spec.error.clone().filter(|e| !e.is_empty()),
            })),
            name => {
                let command = WorkerCommand::from_action_name(name)
                    .ok_or_else(|| ScenarioError::Action(ActionError::Unknown(name.to_owned())))?;
                let Some(control) = &self.control else {
                    return Err(invalid("no workers are managed by this run"));
                };
                if !command.takes_args() && !spec.args.is_empty() {
                    return Err(invalid("takes no args"));
                }

                let known = control.workers();
                let mut workers: Vec<String> = Vec::with_capacity(spec.workers.len());
                for alias in &spec.workers {
                    if !known.contains(alias) {
                        return Err(invalid(&format!("unknown worker, {alias:?}")));
                    }
                    if workers.contains(alias) {
                        return Err(invalid(&format!("duplicated worker, {alias:?}")));
                    }
                    workers.push(alias.clone());
                }

                Ok(Action::WorkerLifecycle(WorkerLifecycle {
                    command,
                    workers,
                    args: spec.args.clone(),
                    control: Arc::clone(control),
                }))
            }
        }
    }
}
