//! 변수 저장소 — 계층형 키/값 네임스페이스
//!
//! [`Vars`]는 `serde_json` 객체를 공유 핸들로 감싼 것입니다.
//! 점으로 구분된 키(`Register.last_match`)로 읽고 쓰며, 쓰기 시 중간 객체를 생성합니다.
//! 조건 쿼리와 워커 설정 조각의 템플릿 확장에 사용됩니다.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::error::TemplateError;
use crate::template;

/// 마지막으로 매칭된 레코드가 기록되는 키
pub const LAST_MATCH_KEY: &str = "Register.last_match";

/// 등록(register)된 값이 기록되는 네임스페이스
pub const REGISTER_PREFIX: &str = "Register";

/// 공유 변수 저장소
///
/// `Clone`은 같은 저장소를 가리키는 핸들을 복제합니다.
/// 독립된 사본이 필요하면 [`Vars::clone_with`]를 사용합니다.
#[derive(Debug, Clone, Default)]
pub struct Vars {
    inner: Arc<RwLock<Map<String, Value>>>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// 주어진 객체로 저장소를 생성합니다.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// 점 구분 키로 값을 조회합니다.
    pub fn get(&self, key: &str) -> Option<Value> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        lookup(&map, key).cloned()
    }

    pub fn exists(&self, key: &str) -> bool {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        lookup(&map, key).is_some()
    }

    /// 점 구분 키에 값을 기록합니다. 없는 중간 경로는 객체로 생성됩니다.
    pub fn set(&self, key: &str, value: Value) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        assign(&mut map, key, value);
    }

    /// 현재 내용의 스냅샷
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 깊은 복사본을 만들고 `overrides`를 적용합니다.
    ///
    /// 반환된 저장소는 원본과 상태를 공유하지 않습니다.
    pub fn clone_with<I, K>(&self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let copy = Self::from_map(self.snapshot());
        for (key, value) in overrides {
            copy.set(key.as_ref(), value);
        }
        copy
    }

    /// 저장소의 변수로 템플릿을 확장합니다.
    ///
    /// 확장 후 남는 플레이스홀더(정의되지 않은 변수)가 있으면 에러입니다.
    pub fn expand_template(&self, text: &str) -> Result<String, TemplateError> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        template::expand(text, |key| lookup(&map, key).cloned())
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let first = parts.next()?;
    let mut current = map.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn assign(map: &mut Map<String, Value>, key: &str, value: Value) {
    let mut parts: Vec<&str> = key.split('.').collect();
    let Some(last) = parts.pop() else {
        return;
    };

    let mut current = map;
    for part in parts {
        let slot = current
            .entry(part.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert(last.to_owned(), value);
}

const TRANSLATED_WORDS: [(&str, &str); 4] =
    [("ssh", "SSH"), ("id", "ID"), ("url", "URL"), ("uri", "URI")];

/// 설정 키를 변수 키 형식으로 정규화합니다.
///
/// `-`, `_`, `.`을 단어 구분자로 보고 각 단어를 대문자로 시작하게 이어 붙입니다.
/// 약어(`ssh`, `id`, `url`, `uri`)는 전부 대문자로 바꿉니다.
///
/// ```
/// use gauntlet_core::vars::normalize_key;
/// assert_eq!(normalize_key("ssh-host"), "SSHHost");
/// assert_eq!(normalize_key("node_id"), "NodeID");
/// ```
pub fn normalize_key(key: &str) -> String {
    key.split(|c: char| c == '-' || c == '_' || c == '.' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            if let Some((_, upper)) = TRANSLATED_WORDS.iter().find(|(w, _)| *w == lower) {
                return (*upper).to_owned();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// 값 안의 모든 객체 키를 [`normalize_key`]로 정규화합니다.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (normalize_key(&k), normalize_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}
