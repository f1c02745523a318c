//! Orchestrator integration tests.
//!
//! Runs whole scenarios without workers against an in-memory store, so no
//! Docker daemon is needed, and checks placement and exit handling.

use std::future::pending;
use std::path::Path;
use std::time::Duration;

use gauntlet_core::config::GauntletConfig;
use gauntlet_core::design::Design;
use gauntlet_core::error::{ActionError, GauntletError};
use gauntlet_core::exit::{emit_exit, exit_channel};
use gauntlet_daemon::orchestrator::{
    Orchestrator, RunEnd, RunOptions, plan_hosts, wait_for_end,
};
use gauntlet_log_pipeline::LogFileSet;

fn test_config(log_dir: &Path) -> GauntletConfig {
    let mut config = GauntletConfig::default();
    config.pipeline.log_dir = log_dir.display().to_string();
    config.pipeline.flush_interval_ms = 5;
    config.watcher.poll_interval_ms = 5;
    config.runtime.host_command_timeout_secs = 5;
    config
}

fn options(exit_after: Duration) -> RunOptions {
    RunOptions {
        exit_after: Some(exit_after),
        ..RunOptions::default()
    }
}

async fn run(yaml: &str, log_dir: &Path, options: RunOptions) -> anyhow::Result<()> {
    let design = Design::parse(yaml).expect("design should parse");
    Orchestrator::new(test_config(log_dir), design, options)
        .run()
        .await
}

#[tokio::test]
async fn host_only_scenario_completes() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
storage: memory://local/gauntlet
sequences:
  - condition: '{"m": "gauntlet ready"}'
    action:
      name: host-command
      args: ["echo hello from host"]
  - condition: '{"m": "hello from host"}'
"#;

    run(yaml, dir.path(), options(Duration::from_secs(10)))
        .await
        .expect("scenario should complete");

    let system = std::fs::read_to_string(LogFileSet::path_for(dir.path(), "system", false))
        .unwrap();
    assert!(system.contains("gauntlet ready"));
    assert!(system.contains("hello from host"));
}

#[tokio::test]
async fn failing_action_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
storage: memory://local/gauntlet
sequences:
  - condition: '{"m": "gauntlet ready"}'
    action:
      name: host-command
      args: ["exit 4"]
"#;

    let err = run(yaml, dir.path(), options(Duration::from_secs(10)))
        .await
        .expect_err("run should fail");
    assert!(matches!(
        err.downcast_ref::<GauntletError>(),
        Some(GauntletError::Action(ActionError::Execution { .. }))
    ));
}

#[tokio::test]
async fn kill_action_carries_its_error() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
storage: memory://local/gauntlet
sequences:
  - condition: '{"m": "gauntlet ready"}'
    action:
      name: kill
      error: stop here
  - condition: '{"m": "never"}'
"#;

    let err = run(yaml, dir.path(), options(Duration::from_secs(10)))
        .await
        .expect_err("run should fail");
    match err.downcast_ref::<GauntletError>() {
        Some(GauntletError::Action(ActionError::Killed(reason))) => {
            assert_eq!(reason, "stop here");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn time_budget_expires() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
storage: memory://local/gauntlet
sequences:
  - condition: '{"m": "never"}'
"#;

    let err = run(yaml, dir.path(), options(Duration::from_millis(100)))
        .await
        .expect_err("run should expire");
    assert!(err.to_string().contains("exit-after"));
}

#[tokio::test]
async fn config_only_returns_before_the_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
storage: memory://local/gauntlet
sequences:
  - condition: '{"m": "never"}'
"#;
    let options = RunOptions {
        config_only: true,
        ..RunOptions::default()
    };

    run(yaml, dir.path(), options).await.expect("config only run");
}

#[tokio::test]
async fn unknown_action_fails_before_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
storage: memory://local/gauntlet
sequences:
  - condition: '{"m": "gauntlet ready"}'
    action:
      name: start-workers
"#;

    // no workers, so worker actions cannot be built
    let err = run(yaml, dir.path(), RunOptions::default())
        .await
        .expect_err("loading should fail");
    assert!(err.to_string().contains("sequences[0].action"));
}

#[test]
fn placement_prefers_heavier_hosts() {
    let design = Design::parse(
        r#"
hosts:
  - weight: 1
    local: true
  - weight: 3
    ssh:
      host: "10.0.0.2:22"
      user: gauntlet
  - weight: 0
    local: true
    host: 127.0.0.1
worker-config:
  n3: ""
  n0: ""
  n2: ""
  n1: ""
sequences:
  - condition: '{}'
"#,
    )
    .unwrap();

    let plans = plan_hosts(&design);

    assert_eq!(plans[0].host.host, "10.0.0.2");
    assert!(plans.iter().all(|p| p.host.weight > 0));
    let placed: Vec<String> = plans.iter().flat_map(|p| p.workers.clone()).collect();
    assert_eq!(placed, ["n0", "n1", "n2", "n3"]);
}

#[test]
fn no_workers_means_no_hosts() {
    let design = Design::parse("sequences:\n  - condition: '{}'\n").unwrap();
    assert!(plan_hosts(&design).is_empty());
}

#[tokio::test]
async fn exit_signal_ends_the_wait() {
    let (tx, mut rx) = exit_channel();
    emit_exit(&tx, Ok(()));

    let end = wait_for_end(&mut rx, None, pending()).await.unwrap();
    assert!(matches!(end, RunEnd::Exit(Ok(()))));
    assert!(end.into_result().is_ok());
}

#[tokio::test]
async fn interrupt_is_a_failed_run() {
    let (_tx, mut rx) = exit_channel();

    let end = wait_for_end(&mut rx, None, async { Ok("SIGINT") })
        .await
        .unwrap();
    assert!(matches!(end, RunEnd::Interrupted("SIGINT")));
    assert!(end.into_result().unwrap_err().to_string().contains("SIGINT"));
}

#[tokio::test]
async fn budget_is_a_failed_run() {
    let (_tx, mut rx) = exit_channel();

    let end = wait_for_end(&mut rx, Some(Duration::from_millis(10)), pending())
        .await
        .unwrap();
    assert!(matches!(end, RunEnd::Expired(_)));
    assert!(end.into_result().is_err());
}
