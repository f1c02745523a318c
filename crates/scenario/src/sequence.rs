//! 시퀀스 — 조건, 액션, 등록 규칙의 묶음

use serde_json::Value;

use gauntlet_core::design::{Design, RegisterSpec};
use gauntlet_core::vars::{REGISTER_PREFIX, Vars};
use gauntlet_storage::Document;

use crate::action::{Action, ActionRegistry};
use crate::condition::Condition;
use crate::error::ScenarioError;

/// 시나리오의 한 단계
#[derive(Debug)]
pub struct Sequence {
    condition: Condition,
    action: Action,
    register: Option<RegisterSpec>,
}

impl Sequence {
    pub fn new(condition: Condition, action: Action, register: Option<RegisterSpec>) -> Self {
        Self {
            condition,
            action,
            register,
        }
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn register(&self) -> Option<&RegisterSpec> {
        self.register.as_ref()
    }

    /// 등록 규칙이 있으면 매칭된 레코드를 `Register.<to>`에 기록합니다.
    pub fn apply_register(&self, vars: &Vars, matched: &Document) {
        let Some(register) = &self.register else {
            return;
        };
        let key = format!("{REGISTER_PREFIX}.{}", register.to);
        tracing::debug!(key = %key, "registering matched record");
        vars.set(&key, Value::Object(matched.clone()));
    }
}

/// 설계 문서의 시퀀스를 모두 로드합니다.
///
/// 액션 변환에 실패하면 해당 시퀀스의 필드 경로를 담은 에러를 반환합니다.
pub fn load_sequences(
    design: &Design,
    registry: &ActionRegistry,
) -> Result<Vec<Sequence>, ScenarioError> {
    if design.sequences.is_empty() {
        return Err(ScenarioError::InvalidSequence {
            field: "sequences".to_owned(),
            reason: "a scenario needs at least one sequence".to_owned(),
        });
    }

    design
        .sequences
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let action = registry
                .build(&spec.action)
                .map_err(|e| ScenarioError::InvalidSequence {
                    field: format!("sequences[{i}].action"),
                    reason: e.to_string(),
                })?;
            let condition = Condition::new(&spec.condition, &design.storage);
            Ok(Sequence::new(condition, action, spec.register.clone()))
        })
        .collect()
}
