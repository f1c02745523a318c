//! JSON 값 병합
//!
//! 워커 설정 조각(common + 워커별)을 합칠 때 사용합니다.
//! 객체는 키 단위로 재귀 병합하고, 배열과 스칼라는 덮어쓰는 쪽 값으로 통째로 교체합니다.

use serde_json::{Map, Value};

/// `base`에 `overlay`를 병합한 새 값을 반환합니다.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(a), Value::Object(b)) => Value::Object(merge_objects(a, b)),
        _ => overlay.clone(),
    }
}

/// 두 객체를 병합합니다. 같은 키는 [`merge`] 규칙을 따릅니다.
pub fn merge_objects(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        let next = match merged.get(key) {
            Some(existing) => merge(existing, value),
            None => value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}
