//! 바이트 스트림을 줄 단위 로그 엔트리로 변환합니다.
//!
//! 호스트 명령의 stdout/stderr처럼 `AsyncRead`로 주어지는 출력을 읽어
//! 한 줄마다 [`LogEntry`] 하나를 [`IngestSender`]로 보냅니다.

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use gauntlet_core::types::LogEntry;

use crate::error::LogPipelineError;
use crate::ingestor::IngestSender;

/// 줄 끝의 `\n`, `\r\n`을 제거합니다.
pub fn trim_line_ending(mut line: &[u8]) -> &[u8] {
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
    }
    if let Some(rest) = line.strip_suffix(b"\r") {
        line = rest;
    }
    line
}

/// 스트림이 끝날 때까지 줄을 읽어 수집기로 보냅니다.
///
/// `origin`이 비어 있으면 시스템 엔트리로, 아니면 해당 워커의 엔트리로 보냅니다.
/// 빈 줄은 건너뜁니다. 보낸 엔트리 수를 반환합니다.
pub async fn pump_lines<R>(
    reader: R,
    origin: &str,
    is_error: bool,
    sender: &IngestSender,
) -> Result<usize, LogPipelineError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut sent = 0;

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }

        let line = trim_line_ending(&buf);
        if line.is_empty() {
            continue;
        }

        let entry = if origin.is_empty() {
            LogEntry::system(line, is_error)
        } else {
            LogEntry::worker(origin, Bytes::copy_from_slice(line), is_error)
                .map_err(|e| LogPipelineError::Channel(e.to_string()))?
        };
        sender.submit(entry).await?;
        sent += 1;
    }

    Ok(sent)
}
