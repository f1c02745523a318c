//! 메트릭 상수 및 설명 등록
//!
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`를 호출합니다.
//! exporter는 설치하지 않으며, 필요한 쪽에서 recorder를 붙여 사용합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `gauntlet_`
//! - 모듈명: `ingest_`, `scenario_`, `worker_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 액션 이름 레이블 키
pub const LABEL_ACTION: &str = "action";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Log Ingestion 메트릭 ──────────────────────────────────────────

/// 수신한 로그 엔트리 수 (counter)
pub const INGEST_ENTRIES_TOTAL: &str = "gauntlet_ingest_entries_total";

/// 스토리지에 저장된 엔트리 수 (counter)
pub const INGEST_PERSISTED_TOTAL: &str = "gauntlet_ingest_persisted_total";

/// 배치 flush 실패 횟수 (counter)
pub const INGEST_FLUSH_FAILURES_TOTAL: &str = "gauntlet_ingest_flush_failures_total";

/// 현재 flush 대기 중인 엔트리 수 (gauge)
pub const INGEST_PENDING_ENTRIES: &str = "gauntlet_ingest_pending_entries";

// ─── Scenario 메트릭 ───────────────────────────────────────────────

/// 매칭된 조건 수 (counter)
pub const SCENARIO_CONDITIONS_MATCHED_TOTAL: &str = "gauntlet_scenario_conditions_matched_total";

/// 실행된 액션 수 (counter, label: action, result)
pub const SCENARIO_ACTIONS_TOTAL: &str = "gauntlet_scenario_actions_total";

/// 현재 시퀀스 커서 (gauge)
pub const SCENARIO_CURSOR: &str = "gauntlet_scenario_cursor";

// ─── Worker 메트릭 ─────────────────────────────────────────────────

/// 실행된 워커 컨테이너 수 (counter)
pub const WORKER_RUNS_TOTAL: &str = "gauntlet_worker_runs_total";

/// 0이 아닌 종료 코드로 끝난 워커 실행 수 (counter)
pub const WORKER_FAILURES_TOTAL: &str = "gauntlet_worker_failures_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// recorder를 설치한 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(INGEST_ENTRIES_TOTAL, "Log entries received by the ingestor");
    describe_counter!(
        INGEST_PERSISTED_TOTAL,
        "Log entries persisted to the document store"
    );
    describe_counter!(INGEST_FLUSH_FAILURES_TOTAL, "Failed batch flushes");
    describe_gauge!(INGEST_PENDING_ENTRIES, "Entries waiting for the next flush");

    describe_counter!(
        SCENARIO_CONDITIONS_MATCHED_TOTAL,
        "Scenario conditions that matched"
    );
    describe_counter!(SCENARIO_ACTIONS_TOTAL, "Scenario actions executed");
    describe_gauge!(SCENARIO_CURSOR, "Index of the sequence being evaluated");

    describe_counter!(WORKER_RUNS_TOTAL, "Worker container runs");
    describe_counter!(WORKER_FAILURES_TOTAL, "Worker runs with a non-zero exit code");
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        INGEST_ENTRIES_TOTAL,
        INGEST_PERSISTED_TOTAL,
        INGEST_FLUSH_FAILURES_TOTAL,
        INGEST_PENDING_ENTRIES,
        SCENARIO_CONDITIONS_MATCHED_TOTAL,
        SCENARIO_ACTIONS_TOTAL,
        SCENARIO_CURSOR,
        WORKER_RUNS_TOTAL,
        WORKER_FAILURES_TOTAL,
    ];

    #[test]
    fn all_metrics_start_with_gauntlet_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(name.starts_with("gauntlet_"), "bad prefix: {name}");
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_without_recorder_is_noop() {
        describe_all();
    }
}
