//! 도메인 타입 — 로그 엔트리
//!
//! [`LogEntry`]는 워커 또는 러너 자신이 출력한 한 줄(또는 한 덩어리)의 로그입니다.
//! 생성 시점 이후로는 변경되지 않으며, 수집 파이프라인이 정확히 한 번 소비합니다.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PipelineError;

/// 러너 자신의 로그에 예약된 alias
pub const SYSTEM_ALIAS: &str = "system";

/// 로그 엔트리
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    /// 워커 컨테이너의 stdout/stderr 출력
    Worker(WorkerLogEntry),
    /// 러너 자신이 남기는 로그
    System(SystemLogEntry),
}

/// 워커 로그 엔트리
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerLogEntry {
    alias: String,
    msg: Bytes,
    is_error: bool,
    is_json: bool,
    at: DateTime<Utc>,
}

/// 시스템 로그 엔트리
#[derive(Debug, Clone, PartialEq)]
pub struct SystemLogEntry {
    msg: Bytes,
    is_error: bool,
    is_json: bool,
    at: DateTime<Utc>,
}

/// 앞뒤 공백을 제거한 메시지가 `{`로 시작하고 `}`로 끝나면 JSON으로 간주합니다.
pub fn looks_like_json(msg: &[u8]) -> bool {
    let trimmed = msg.trim_ascii();
    trimmed.first() == Some(&b'{') && trimmed.last() == Some(&b'}')
}

impl LogEntry {
    /// 워커 로그 엔트리를 생성합니다. alias가 비어 있으면 에러입니다.
    pub fn worker(
        alias: impl Into<String>,
        msg: impl Into<Bytes>,
        is_error: bool,
    ) -> Result<Self, PipelineError> {
        let alias = alias.into();
        if alias.is_empty() {
            return Err(PipelineError::InvalidEntry(
                "worker entry requires a non-empty alias".to_owned(),
            ));
        }
        let msg = msg.into();
        let is_json = looks_like_json(&msg);
        Ok(Self::Worker(WorkerLogEntry {
            alias,
            msg,
            is_error,
            is_json,
            at: Utc::now(),
        }))
    }

    /// 값을 JSON으로 직렬화하여 워커 로그 엔트리를 생성합니다.
    pub fn worker_json<T: Serialize>(
        alias: impl Into<String>,
        value: &T,
        is_error: bool,
    ) -> Result<Self, PipelineError> {
        let body = serde_json::to_vec(value)
            .map_err(|e| PipelineError::InvalidEntry(format!("serialize entry body: {e}")))?;
        Self::worker(alias, body, is_error)
    }

    /// 시스템 로그 엔트리를 생성합니다. 메시지 앞뒤 공백은 제거됩니다.
    pub fn system(msg: impl AsRef<[u8]>, is_error: bool) -> Self {
        let trimmed = Bytes::copy_from_slice(msg.as_ref().trim_ascii());
        let is_json = looks_like_json(&trimmed);
        Self::System(SystemLogEntry {
            msg: trimmed,
            is_error,
            is_json,
            at: Utc::now(),
        })
    }

    /// 출처 식별자. 시스템 엔트리는 빈 문자열입니다.
    pub fn origin(&self) -> &str {
        match self {
            Self::Worker(e) => &e.alias,
            Self::System(_) => "",
        }
    }

    /// 로그 파일을 고를 때 쓰는 alias (시스템 엔트리는 [`SYSTEM_ALIAS`])
    pub fn file_alias(&self) -> &str {
        match self {
            Self::Worker(e) => &e.alias,
            Self::System(_) => SYSTEM_ALIAS,
        }
    }

    pub fn msg(&self) -> &Bytes {
        match self {
            Self::Worker(e) => &e.msg,
            Self::System(e) => &e.msg,
        }
    }

    pub fn is_error(&self) -> bool {
        match self {
            Self::Worker(e) => e.is_error,
            Self::System(e) => e.is_error,
        }
    }

    pub fn is_json(&self) -> bool {
        match self {
            Self::Worker(e) => e.is_json,
            Self::System(e) => e.is_json,
        }
    }

    pub fn is_worker(&self) -> bool {
        matches!(self, Self::Worker(_))
    }

    /// 파일에 기록할 한 줄 (메시지 + 개행)
    pub fn line(&self) -> Vec<u8> {
        let msg = self.msg();
        let mut line = Vec::with_capacity(msg.len() + 1);
        line.extend_from_slice(msg);
        line.push(b'\n');
        line
    }

    /// 스토리지에 저장할 문서로 변환합니다.
    ///
    /// - 워커: `{worker, x, is_error, t}`
    /// - 시스템: `{m, is_error, t}`
    ///
    /// JSON으로 감지된 메시지는 파싱된 객체로, 그 외(파싱 실패 포함)에는 문자열로 저장됩니다.
    pub fn to_document(&self) -> Map<String, Value> {
        let text = || Value::String(String::from_utf8_lossy(self.msg()).into_owned());
        let body = if self.is_json() {
            serde_json::from_slice(self.msg()).unwrap_or_else(|_| text())
        } else {
            text()
        };

        let mut doc = Map::new();
        match self {
            Self::Worker(e) => {
                doc.insert("worker".to_owned(), Value::String(e.alias.clone()));
                doc.insert("x".to_owned(), body);
            }
            Self::System(_) => {
                doc.insert("m".to_owned(), body);
            }
        }
        doc.insert("is_error".to_owned(), Value::Bool(self.is_error()));
        doc.insert("t".to_owned(), Value::String(self.timestamp_string()));
        doc
    }

    fn timestamp_string(&self) -> String {
        let at = match self {
            Self::Worker(e) => e.at,
            Self::System(e) => e.at,
        };
        at.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_entry_requires_alias() {
        assert!(LogEntry::worker("", "hello", false).is_err());
        let entry = LogEntry::worker("n0", "hello", false).unwrap();
        assert_eq!(entry.origin(), "n0");
        assert!(entry.is_worker());
    }

    #[test]
    fn json_detection_uses_trimmed_message() {
        let entry = LogEntry::worker("n0", "  {\"a\": 1}\n", false).unwrap();
        assert!(entry.is_json());
        let entry = LogEntry::worker("n0", "{\"a\": 1} trailing", false).unwrap();
        assert!(!entry.is_json());
    }

    #[test]
    fn system_entry_is_trimmed_and_has_empty_origin() {
        let entry = LogEntry::system("  ready \n", false);
        assert_eq!(entry.origin(), "");
        assert_eq!(entry.file_alias(), SYSTEM_ALIAS);
        assert_eq!(entry.msg().as_ref(), b"ready");
        assert_eq!(entry.line(), b"ready\n");
    }

    #[test]
    fn worker_document_parses_json_body() {
        let entry = LogEntry::worker("n1", r#"{"height": 3}"#, true).unwrap();
        let doc = entry.to_document();
        assert_eq!(doc["worker"], "n1");
        assert_eq!(doc["x"]["height"], 3);
        assert_eq!(doc["is_error"], true);
        assert!(doc.contains_key("t"));
    }

    #[test]
    fn worker_document_keeps_plain_text() {
        let entry = LogEntry::worker("n1", "plain line", false).unwrap();
        let doc = entry.to_document();
        assert_eq!(doc["x"], "plain line");
    }

    #[test]
    fn system_document_uses_m_field() {
        let entry = LogEntry::system("gauntlet ready", false);
        let doc = entry.to_document();
        assert_eq!(doc["m"], "gauntlet ready");
        assert!(!doc.contains_key("worker"));
    }

    #[test]
    fn broken_json_body_is_stored_as_text() {
        let entry = LogEntry::worker("n1", "{not json}", false).unwrap();
        assert_eq!(entry.to_document()["x"], "{not json}");
    }

    #[test]
    fn worker_json_serializes_value() {
        let entry =
            LogEntry::worker_json("n2", &serde_json::json!({"exit_code": 1}), true).unwrap();
        assert!(entry.is_json());
        assert!(entry.is_error());
    }
}
