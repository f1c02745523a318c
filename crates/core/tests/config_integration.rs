//! gauntlet.toml 통합 설정 테스트
//!
//! - gauntlet.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 잘못된 형식 에러 테스트

use gauntlet_core::config::GauntletConfig;
use gauntlet_core::error::{ConfigError, GauntletError};

const EXAMPLE: &str = include_str!("../../../gauntlet.toml.example");

// =============================================================================
// gauntlet.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = GauntletConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.pipeline.log_dir, "/var/log/gauntlet");
    assert_eq!(config.runtime.base_dir, "/var/lib/gauntlet");
}

#[test]
fn example_config_passes_validation() {
    let config = GauntletConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults_for_timing() {
    let config = GauntletConfig::parse(EXAMPLE).expect("should parse");
    let defaults = GauntletConfig::default();

    assert_eq!(
        config.pipeline.flush_interval_ms,
        defaults.pipeline.flush_interval_ms
    );
    assert_eq!(
        config.pipeline.channel_capacity,
        defaults.pipeline.channel_capacity
    );
    assert_eq!(config.pipeline.collection, defaults.pipeline.collection);
    assert_eq!(
        config.watcher.poll_interval_ms,
        defaults.watcher.poll_interval_ms
    );
    assert_eq!(
        config.watcher.connect_timeout_secs,
        defaults.watcher.connect_timeout_secs
    );
    assert_eq!(config.runtime.image, defaults.runtime.image);
    assert_eq!(
        config.runtime.host_command_timeout_secs,
        defaults.runtime.host_command_timeout_secs
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_watcher_only() {
    let toml = r#"
[watcher]
poll_interval_ms = 250
"#;
    let config = GauntletConfig::parse(toml).expect("should parse");
    assert_eq!(config.watcher.poll_interval_ms, 250);
    assert_eq!(config.watcher.connect_timeout_secs, 3);
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.pipeline.flush_interval_ms, 50);
}

#[test]
fn partial_config_two_sections() {
    let toml = r#"
[general]
log_format = "json"

[runtime]
docker_socket = "/run/user/1000/docker.sock"
"#;
    let config = GauntletConfig::parse(toml).expect("should parse");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.runtime.docker_socket, "/run/user/1000/docker.sock");
    assert_eq!(config.runtime.image, "debian:testing-slim");
    config.validate().expect("should validate");
}

#[test]
fn unknown_log_format_fails_validation() {
    let toml = r#"
[general]
log_format = "xml"
"#;
    let config = GauntletConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        GauntletError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "general.log_format"
    ));
}

#[test]
fn wrong_value_type_fails_parsing() {
    let toml = r#"
[pipeline]
flush_interval_ms = "fast"
"#;
    let err = GauntletConfig::parse(toml).unwrap_err();
    assert!(matches!(
        err,
        GauntletError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: 테스트는 serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var(key, value);
    }

    let result = f();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;
    let level = with_env("GAUNTLET_GENERAL_LOG_LEVEL", "error", || {
        let mut config = GauntletConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.general.log_level
    });
    assert_eq!(level, "error");
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let interval = with_env("GAUNTLET_WATCHER_POLL_INTERVAL_MS", "75", || {
        let mut config = GauntletConfig::default();
        config.apply_env_overrides();
        config.watcher.poll_interval_ms
    });
    assert_eq!(interval, 75);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_number_keeps_toml_value() {
    let toml = r#"
[pipeline]
channel_capacity = 64
"#;
    let capacity = with_env("GAUNTLET_PIPELINE_CHANNEL_CAPACITY", "many", || {
        let mut config = GauntletConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.pipeline.channel_capacity
    });
    assert_eq!(capacity, 64);
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
#[serial_test::serial]
async fn load_config_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gauntlet.toml");
    tokio::fs::write(&path, EXAMPLE).await.expect("write");

    let config = GauntletConfig::load(&path).await.expect("should load");
    assert_eq!(config.runtime.remote_docker_port, 2375);
}

#[tokio::test]
async fn load_invalid_file_reports_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    tokio::fs::write(&path, "[general\nlog_level=").await.expect("write");

    let err = GauntletConfig::load(&path).await.unwrap_err();
    assert!(matches!(
        err,
        GauntletError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn example_config_serialize_roundtrip() {
    let config = GauntletConfig::parse(EXAMPLE).expect("should parse");
    let serialized = toml::to_string_pretty(&config).expect("should serialize");
    let reparsed = GauntletConfig::parse(&serialized).expect("should reparse");
    reparsed.validate().expect("should validate");

    assert_eq!(config.runtime.runner_path, reparsed.runtime.runner_path);
    assert_eq!(config.pipeline.log_dir, reparsed.pipeline.log_dir);
}
