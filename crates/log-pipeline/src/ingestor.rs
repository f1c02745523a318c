//! 로그 수집기 -- 엔트리를 파일과 문서 저장소에 기록합니다.
//!
//! [`LogIngestor`]는 core의 [`Pipeline`](gauntlet_core::pipeline::Pipeline) trait을 구현하여
//! 데몬에서 시나리오 감시기와 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! pump_lines / Fleet / daemon -> IngestSender -> mpsc -> consume loop
//!                                                          |-> <alias>.{stdout,stderr}.log (즉시)
//!                                                          |-> Batch -> insert_many (tick마다)
//!                                                          `-> WorkerStderrError -> exit channel
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gauntlet_core::error::{GauntletError, PipelineError};
use gauntlet_core::exit::{ExitSender, emit_exit};
use gauntlet_core::metrics as m;
use gauntlet_core::pipeline::{HealthStatus, Pipeline};
use gauntlet_core::types::{LogEntry, SYSTEM_ALIAS};
use gauntlet_storage::Storage;

use crate::batch::Batch;
use crate::config::IngestConfig;
use crate::error::LogPipelineError;
use crate::files::LogFileSet;

/// 수집기 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestorState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 수집 통계
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    persisted: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
    /// 마지막 성공 이후 연속 실패 횟수
    consecutive_failures: AtomicU64,
    pending: AtomicU64,
}

impl IngestStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    /// 성공한 flush 횟수
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

/// 수집기로 엔트리를 보내는 핸들
///
/// 여러 생산자 태스크가 복제해서 사용합니다.
#[derive(Debug, Clone)]
pub struct IngestSender {
    tx: mpsc::Sender<LogEntry>,
}

impl IngestSender {
    /// 엔트리를 큐에 넣습니다. 큐가 가득 차면 자리가 날 때까지 기다립니다.
    pub async fn submit(&self, entry: LogEntry) -> Result<(), LogPipelineError> {
        self.tx
            .send(entry)
            .await
            .map_err(|e| LogPipelineError::Channel(format!("ingestor closed: {e}")))
    }

    /// 기다리지 않고 큐에 넣습니다. 큐가 가득 차 있으면 에러입니다.
    pub fn try_submit(&self, entry: LogEntry) -> Result<(), LogPipelineError> {
        self.tx
            .try_send(entry)
            .map_err(|e| LogPipelineError::Channel(e.to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 로그 수집기
///
/// # 사용 예시
/// ```ignore
/// use gauntlet_log_pipeline::LogIngestorBuilder;
///
/// let (mut ingestor, sender) = LogIngestorBuilder::new()
///     .config(config)
///     .storage(storage)
///     .exit_sender(exit_tx)
///     .workers(["n0", "n1"])
///     .build()
///     .await?;
///
/// ingestor.start().await?;
/// sender.submit(LogEntry::system("gauntlet ready", false)).await?;
/// ```
pub struct LogIngestor {
    config: IngestConfig,
    state: IngestorState,
    storage: Storage,
    exit_tx: Option<ExitSender>,
    files: Option<LogFileSet>,
    rx: Option<mpsc::Receiver<LogEntry>>,
    stats: Arc<IngestStats>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl LogIngestor {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            IngestorState::Initialized => "initialized",
            IngestorState::Running => "running",
            IngestorState::Stopped => "stopped",
        }
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }
}

impl Pipeline for LogIngestor {
    async fn start(&mut self) -> Result<(), GauntletError> {
        if self.state == IngestorState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let (Some(rx), Some(files)) = (self.rx.take(), self.files.take()) else {
            return Err(PipelineError::InitFailed(
                "log ingestor cannot be restarted after stop".to_owned(),
            )
            .into());
        };

        info!(
            log_dir = %self.config.log_dir.display(),
            collection = %self.config.collection,
            exit_on_error = self.config.exit_on_error,
            "starting log ingestor"
        );

        let consumer = Consumer {
            rx,
            files,
            storage: self.storage.clone(),
            collection: self.config.collection.clone(),
            exit_tx: if self.config.exit_on_error {
                self.exit_tx.clone()
            } else {
                None
            },
            tripped: false,
            batch: Batch::new(),
            stats: Arc::clone(&self.stats),
        };
        let interval = self.config.flush_interval;
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(consumer.run(interval, cancel)));

        self.state = IngestorState::Running;
        info!("log ingestor started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), GauntletError> {
        if self.state != IngestorState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping log ingestor");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "log ingestor task ended abnormally");
            }
        }

        self.state = IngestorState::Stopped;
        info!(
            received = self.stats.received(),
            persisted = self.stats.persisted(),
            "log ingestor stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            IngestorState::Running => {
                let failures = self.stats.consecutive_failures();
                if failures > 0 {
                    HealthStatus::Degraded(format!(
                        "{failures} consecutive flush failures, {} entries pending",
                        self.stats.pending()
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            IngestorState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            IngestorState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 소비 루프가 소유하는 상태
struct Consumer {
    rx: mpsc::Receiver<LogEntry>,
    files: LogFileSet,
    storage: Storage,
    collection: String,
    /// `exit_on_error`가 꺼져 있으면 None
    exit_tx: Option<ExitSender>,
    /// stderr 신호를 이미 보냈는지
    tripped: bool,
    batch: Batch,
    stats: Arc<IngestStats>,
}

impl Consumer {
    async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.rx.close();
                    while let Ok(entry) = self.rx.try_recv() {
                        self.accept(entry).await;
                    }
                    debug!(pending = self.batch.len(), "final flush before shutdown");
                    self.flush().await;
                    break;
                }
                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.flush().await;
                    }
                }
                maybe = self.rx.recv() => match maybe {
                    Some(entry) => self.accept(entry).await,
                    None => {
                        debug!("all ingest senders dropped");
                        self.flush().await;
                        break;
                    }
                },
            }
        }
    }

    /// 엔트리를 파일에 쓰고 배치에 추가합니다.
    async fn accept(&mut self, entry: LogEntry) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::INGEST_ENTRIES_TOTAL).increment(1);

        match self.files.write(&entry).await {
            Ok(key) => self.batch.touch(key),
            Err(e) => warn!(origin = entry.file_alias(), error = %e, "failed to mirror entry to file"),
        }
        self.batch.push(entry);
        self.stats
            .pending
            .store(self.batch.len() as u64, Ordering::Relaxed);
    }

    /// 배치를 저장합니다. 실패하면 배치를 그대로 두고 다음 tick에 다시 시도합니다.
    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let count = self.batch.len();
        if let Err(e) = self
            .storage
            .insert_many(&self.collection, self.batch.documents())
            .await
        {
            self.stats.flush_failures.fetch_add(1, Ordering::Relaxed);
            self.stats
                .consecutive_failures
                .fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::INGEST_FLUSH_FAILURES_TOTAL).increment(1);
            warn!(pending = count, error = %e, "failed to persist log batch, will retry");
            return;
        }

        self.files.sync(self.batch.touched()).await;
        self.trip_on_stderr();

        self.batch.clear();
        self.stats.consecutive_failures.store(0, Ordering::Relaxed);
        self.stats.pending.store(0, Ordering::Relaxed);
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);
        self.stats.persisted.fetch_add(count as u64, Ordering::Relaxed);
        metrics::counter!(m::INGEST_PERSISTED_TOTAL).increment(count as u64);
        metrics::gauge!(m::INGEST_PENDING_ENTRIES).set(0.0);
        debug!(count, "persisted log batch");
    }

    fn trip_on_stderr(&mut self) {
        if self.tripped {
            return;
        }
        let Some(exit_tx) = self.exit_tx.as_ref() else {
            return;
        };
        if let Some(err) = self.batch.first_worker_stderr() {
            warn!(worker = %err.worker, "worker wrote to stderr, requesting exit");
            self.tripped = true;
            emit_exit(exit_tx, Err(err.into()));
        }
    }
}

/// 로그 수집기 빌더
///
/// 출처별 파일을 미리 만들고 엔트리 채널을 생성합니다.
pub struct LogIngestorBuilder {
    config: IngestConfig,
    storage: Option<Storage>,
    exit_tx: Option<ExitSender>,
    workers: Vec<String>,
}

impl LogIngestorBuilder {
    pub fn new() -> Self {
        Self {
            config: IngestConfig::default(),
            storage: None,
            exit_tx: None,
            workers: Vec::new(),
        }
    }

    pub fn config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    /// 문서 저장소를 지정합니다.
    pub fn storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// stderr 트립와이어가 사용할 종료 채널을 지정합니다.
    pub fn exit_sender(mut self, tx: ExitSender) -> Self {
        self.exit_tx = Some(tx);
        self
    }

    /// 로그 파일을 미리 만들 워커 alias 목록
    pub fn workers<I, S>(mut self, workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workers = workers.into_iter().map(Into::into).collect();
        self
    }

    /// 수집기를 빌드합니다.
    ///
    /// 워커와 `system`의 파일 쌍을 모두 만든 뒤에만 성공합니다.
    ///
    /// # Returns
    /// - `LogIngestor`: 수집기 인스턴스
    /// - `IngestSender`: 엔트리 송신 핸들
    pub async fn build(self) -> Result<(LogIngestor, IngestSender), LogPipelineError> {
        self.config.validate()?;
        let storage = self.storage.ok_or_else(|| LogPipelineError::Config {
            field: "storage".to_owned(),
            reason: "a storage backend is required".to_owned(),
        })?;
        if self.config.exit_on_error && self.exit_tx.is_none() {
            return Err(LogPipelineError::Config {
                field: "exit_on_error".to_owned(),
                reason: "an exit sender is required when exit_on_error is set".to_owned(),
            });
        }

        let aliases = self
            .workers
            .into_iter()
            .chain(std::iter::once(SYSTEM_ALIAS.to_owned()));
        let files = LogFileSet::create(&self.config.log_dir, aliases).await?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let ingestor = LogIngestor {
            config: self.config,
            state: IngestorState::Initialized,
            storage,
            exit_tx: self.exit_tx,
            files: Some(files),
            rx: Some(rx),
            stats: Arc::new(IngestStats::default()),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        };
        Ok((ingestor, IngestSender { tx }))
    }
}

impl Default for LogIngestorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfigBuilder;
    use gauntlet_core::exit::exit_channel;
    use gauntlet_storage::MemoryStore;

    fn config(dir: &std::path::Path, exit_on_error: bool) -> IngestConfig {
        IngestConfigBuilder::new()
            .log_dir(dir)
            .flush_interval(Duration::from_millis(10))
            .exit_on_error(exit_on_error)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn builder_requires_storage() {
        let dir = tempfile::tempdir().unwrap();
        let result = LogIngestorBuilder::new()
            .config(config(dir.path(), false))
            .build()
            .await;
        assert!(matches!(result, Err(LogPipelineError::Config { .. })));
    }

    #[tokio::test]
    async fn builder_requires_exit_sender_when_exit_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = LogIngestorBuilder::new()
            .config(config(dir.path(), true))
            .storage(Storage::Memory(MemoryStore::new()))
            .build()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ingestor, _sender) = LogIngestorBuilder::new()
            .config(config(dir.path(), false))
            .storage(Storage::Memory(MemoryStore::new()))
            .build()
            .await
            .unwrap();

        assert_eq!(ingestor.state_name(), "initialized");
        assert!(ingestor.health_check().await.is_unhealthy());
        assert!(ingestor.stop().await.is_err());

        ingestor.start().await.unwrap();
        assert_eq!(ingestor.state_name(), "running");
        assert!(ingestor.health_check().await.is_healthy());
        assert!(ingestor.start().await.is_err());

        ingestor.stop().await.unwrap();
        assert_eq!(ingestor.state_name(), "stopped");
        assert!(ingestor.start().await.is_err());
    }

    #[tokio::test]
    async fn stop_flushes_pending_entries() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::new();
        let cfg = IngestConfigBuilder::new()
            .log_dir(dir.path())
            .flush_interval(Duration::from_secs(3600))
            .exit_on_error(false)
            .build()
            .unwrap();
        let (mut ingestor, sender) = LogIngestorBuilder::new()
            .config(cfg)
            .storage(Storage::Memory(memory.clone()))
            .workers(["n0"])
            .build()
            .await
            .unwrap();
        ingestor.start().await.unwrap();

        for i in 0..5 {
            sender
                .submit(LogEntry::worker("n0", format!("line {i}"), false).unwrap())
                .await
                .unwrap();
        }
        ingestor.stop().await.unwrap();

        assert_eq!(memory.documents("log").len(), 5);
        assert_eq!(ingestor.stats().persisted(), 5);
    }

    #[tokio::test]
    async fn stderr_is_ignored_without_exit_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let (exit_tx, mut exit_rx) = exit_channel();
        let (mut ingestor, sender) = LogIngestorBuilder::new()
            .config(config(dir.path(), false))
            .storage(Storage::Memory(MemoryStore::new()))
            .exit_sender(exit_tx)
            .workers(["n0"])
            .build()
            .await
            .unwrap();
        ingestor.start().await.unwrap();
        sender
            .submit(LogEntry::worker("n0", "boom", true).unwrap())
            .await
            .unwrap();
        ingestor.stop().await.unwrap();
        tokio::task::yield_now().await;

        assert!(exit_rx.try_recv().is_err());
    }
}
