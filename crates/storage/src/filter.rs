//! 필터 문서 매칭
//!
//! MongoDB 쿼리 문법의 부분집합을 메모리 문서에 적용합니다.
//! 필드 경로는 점으로 구분되며(`x.height`), 경로 중간의 배열은 원소 중 하나라도
//! 조건을 만족하면 매칭으로 봅니다.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Value};

use gauntlet_core::error::StorageError;

/// 문서가 필터를 만족하는지 확인합니다.
///
/// 지원하지 않는 연산자는 에러입니다.
pub fn matches(doc: &Map<String, Value>, filter: &Map<String, Value>) -> Result<bool, StorageError> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => all_of(doc, condition)?,
            "$or" => any_of(doc, condition)?,
            "$nor" => !any_of(doc, condition)?,
            op if op.starts_with('$') => {
                return Err(unsupported(op));
            }
            path => field_matches(&resolve(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters(condition: &Value) -> Result<Vec<&Map<String, Value>>, StorageError> {
    let Value::Array(items) = condition else {
        return Err(StorageError::Query("logical operator expects an array".to_owned()));
    };
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| StorageError::Query("logical operator expects objects".to_owned()))
        })
        .collect()
}

fn all_of(doc: &Map<String, Value>, condition: &Value) -> Result<bool, StorageError> {
    for f in sub_filters(condition)? {
        if !matches(doc, f)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(doc: &Map<String, Value>, condition: &Value) -> Result<bool, StorageError> {
    for f in sub_filters(condition)? {
        if matches(doc, f)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// 점 경로로 값을 찾습니다. 배열을 지나면 각 원소로 펼칩니다.
fn resolve<'a>(doc: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let mut current: Vec<&Value> = Vec::new();
    let mut parts = path.split('.');
    let Some(first) = parts.next() else {
        return current;
    };
    if let Some(v) = doc.get(first) {
        current.push(v);
    }

    for part in parts {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(v) = map.get(part) {
                        next.push(v);
                    }
                }
                Value::Array(items) => {
                    if let Ok(index) = part.parse::<usize>() {
                        if let Some(v) = items.get(index) {
                            next.push(v);
                        }
                    } else {
                        next.extend(
                            items
                                .iter()
                                .filter_map(|item| item.as_object().and_then(|m| m.get(part))),
                        );
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

fn is_operator_object(condition: &Value) -> bool {
    match condition {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn field_matches(values: &[&Value], condition: &Value) -> Result<bool, StorageError> {
    if !is_operator_object(condition) {
        return Ok(values.iter().any(|v| equals_or_contains(v, condition)));
    }

    let Value::Object(ops) = condition else {
        return Ok(false);
    };
    let options = ops.get("$options").and_then(Value::as_str).unwrap_or_default();
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => values.iter().any(|v| equals_or_contains(v, operand)),
            "$ne" => !values.iter().any(|v| equals_or_contains(v, operand)),
            "$gt" => any_ordering(values, operand, |o| o == Ordering::Greater),
            "$gte" => any_ordering(values, operand, |o| o != Ordering::Less),
            "$lt" => any_ordering(values, operand, |o| o == Ordering::Less),
            "$lte" => any_ordering(values, operand, |o| o != Ordering::Greater),
            "$in" => {
                let candidates = operand_array(op, operand)?;
                candidates
                    .iter()
                    .any(|c| values.iter().any(|v| equals_or_contains(v, c)))
            }
            "$nin" => {
                let candidates = operand_array(op, operand)?;
                !candidates
                    .iter()
                    .any(|c| values.iter().any(|v| equals_or_contains(v, c)))
            }
            "$exists" => {
                let want = match operand {
                    Value::Bool(b) => *b,
                    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                    _ => true,
                };
                values.is_empty() != want
            }
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| StorageError::Query("$regex expects a string".to_owned()))?;
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(options.contains('i'))
                    .multi_line(options.contains('m'))
                    .dot_matches_new_line(options.contains('s'))
                    .build()
                    .map_err(|e| StorageError::Query(format!("bad $regex: {e}")))?;
                values.iter().any(|v| match v {
                    Value::String(s) => re.is_match(s),
                    Value::Array(items) => items
                        .iter()
                        .any(|i| i.as_str().is_some_and(|s| re.is_match(s))),
                    _ => false,
                })
            }
            "$options" => true,
            "$not" => !field_matches(values, operand)?,
            other => return Err(unsupported(other)),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn operand_array<'a>(op: &str, operand: &'a Value) -> Result<&'a Vec<Value>, StorageError> {
    operand
        .as_array()
        .ok_or_else(|| StorageError::Query(format!("{op} expects an array")))
}

fn unsupported(op: &str) -> StorageError {
    StorageError::Query(format!("unsupported operator {op}"))
}

fn equals_or_contains(value: &Value, expected: &Value) -> bool {
    if json_eq(value, expected) {
        return true;
    }
    match value {
        Value::Array(items) if !expected.is_array() => items.iter().any(|i| json_eq(i, expected)),
        _ => false,
    }
}

/// 숫자는 정수/실수 구분 없이 값으로 비교합니다.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| json_eq(p, q))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_eq(v, other)))
        }
        _ => a == b,
    }
}

fn any_ordering(values: &[&Value], operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    values.iter().any(|v| {
        let candidates: Vec<&Value> = match v {
            Value::Array(items) => items.iter().collect(),
            other => vec![*other],
        };
        candidates
            .into_iter()
            .any(|c| compare(c, operand).is_some_and(&accept))
    })
}

/// 같은 종류의 값끼리만 비교합니다 (숫자, 문자열, 불리언).
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
