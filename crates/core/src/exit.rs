//! 종료 채널 — 실행 전체의 종료를 결정하는 공유 신호
//!
//! 시나리오 감시기, 수집 파이프라인, kill 액션이 종료 신호를 보냅니다.
//! 성공은 `Ok(())`, 실패는 해당 에러입니다. 먼저 읽힌 신호가 실행 결과를 결정합니다.

use tokio::sync::mpsc;

use crate::error::GauntletError;

/// 종료 신호
pub type ExitSignal = Result<(), GauntletError>;

/// 종료 신호 송신측
pub type ExitSender = mpsc::Sender<ExitSignal>;

/// 종료 신호 수신측
pub type ExitReceiver = mpsc::Receiver<ExitSignal>;

/// 종료 채널 용량
pub const EXIT_CHANNEL_CAPACITY: usize = 16;

/// 종료 채널을 생성합니다.
pub fn exit_channel() -> (ExitSender, ExitReceiver) {
    mpsc::channel(EXIT_CHANNEL_CAPACITY)
}

/// 종료 신호를 비동기로 보냅니다.
///
/// 호출자는 수신측이 읽을 때까지 기다리지 않습니다.
/// 수신측이 이미 닫혀 있으면 신호는 버려집니다.
pub fn emit_exit(tx: &ExitSender, signal: ExitSignal) {
    let tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tx.send(signal).await {
            tracing::debug!(signal = ?e.0, "exit channel closed, dropping exit signal");
        }
    });
}
