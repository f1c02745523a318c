//! 템플릿 확장
//!
//! 플레이스홀더 문법은 `{{ .A.B.C }}` 입니다 (앞의 점은 생략 가능).
//! 문자열 값은 그대로, 그 외 값은 compact JSON으로 렌더링합니다.
//! 정의되지 않은 변수를 참조하면 조용히 넘어가지 않고 에러를 반환합니다.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::TemplateError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    // 리터럴 패턴
    Regex::new(r"\{\{\s*\.?([A-Za-z0-9_][A-Za-z0-9_.]*)\s*\}\}").expect("valid placeholder regex")
});

/// 문자열에 플레이스홀더가 있는지 확인합니다.
pub fn is_templated(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}

/// 모든 플레이스홀더를 `1`로 치환합니다.
///
/// 실제 변수 없이 쿼리 문법만 검증할 때 사용합니다.
pub fn stub_placeholders(text: &str) -> String {
    PLACEHOLDER.replace_all(text, "1").into_owned()
}

/// 템플릿에서 참조하는 변수 키 목록
pub fn referenced_keys(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_owned()))
        .collect()
}

/// `lookup`으로 변수를 찾아 템플릿을 확장합니다.
pub fn expand<F>(text: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<Value>,
{
    let mut failure: Option<TemplateError> = None;

    let rendered = PLACEHOLDER.replace_all(text, |caps: &Captures<'_>| {
        if failure.is_some() {
            return String::new();
        }
        let whole = caps.get(0).map(|m| m.start()).unwrap_or_default();
        let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        match lookup(key) {
            Some(value) => match render_value(key, &value) {
                Ok(s) => s,
                Err(e) => {
                    failure = Some(e);
                    String::new()
                }
            },
            None => {
                failure = Some(TemplateError::UndefinedVariable {
                    key: key.to_owned(),
                    line: line_of(text, whole),
                });
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(rendered.into_owned()),
    }
}

fn render_value(key: &str, value: &Value) -> Result<String, TemplateError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => serde_json::to_string(other).map_err(|e| TemplateError::Render {
            key: key.to_owned(),
            reason: e.to_string(),
        }),
    }
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}
