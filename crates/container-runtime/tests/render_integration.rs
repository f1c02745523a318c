//! Worker config rendering through the public API.

use serde_json::{Value, json};

use gauntlet_container::render::{config_path, worker_dir};
use gauntlet_container::{ContainerError, render_worker_config, write_worker_config};
use gauntlet_core::design::Design;
use gauntlet_core::vars::Vars;

const DESIGN: &str = r#"
worker-config:
  common: |
    network: "{{ .Network }}"
    storage:
      uri: "{{ .Self.Storage.URI }}"
      pool: 4
    peers: [a, b]
  n0: |
    storage:
      pool: 16
    peers: [c]
    _rpc: "{{ .Self.Alias }}:54320"
  n1:
sequences:
  - condition: '{"m": "gauntlet ready"}'
"#;

fn worker_vars(alias: &str) -> Vars {
    let vars = Vars::new();
    vars.set("Network", json!("devnet"));
    vars.set(
        "Self",
        json!({"Alias": alias, "Host": "localhost", "Storage": {"URI": "memory://local/w"}}),
    );
    vars
}

#[test]
fn design_fragments_merge_per_worker() {
    let design = Design::parse(DESIGN).unwrap();

    let n0 = render_worker_config(
        "n0",
        &design.common_config,
        &design.worker_config["n0"],
        &worker_vars("n0"),
    )
    .unwrap();
    assert_eq!(
        Value::Object(n0.config),
        json!({
            "network": "devnet",
            "storage": {"uri": "memory://local/w", "pool": 16},
            "peers": ["c"],
        })
    );
    assert_eq!(Value::Object(n0.shared), json!({"rpc": "n0:54320"}));

    let n1 = render_worker_config(
        "n1",
        &design.common_config,
        &design.worker_config["n1"],
        &worker_vars("n1"),
    )
    .unwrap();
    assert_eq!(n1.config["storage"]["pool"], json!(4));
    assert!(n1.shared.is_empty());
}

#[test]
fn missing_variable_is_reported() {
    let design = Design::parse(DESIGN).unwrap();
    let vars = Vars::new();
    let err = render_worker_config("n0", &design.common_config, "", &vars).unwrap_err();
    assert!(matches!(err, ContainerError::Template(_)));
}

#[tokio::test]
async fn written_config_round_trips_as_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let design = Design::parse(DESIGN).unwrap();
    let rendered = render_worker_config(
        "n0",
        &design.common_config,
        &design.worker_config["n0"],
        &worker_vars("n0"),
    )
    .unwrap();

    write_worker_config(dir.path(), &rendered).await.unwrap();

    let text = std::fs::read_to_string(config_path(dir.path(), "n0")).unwrap();
    let parsed: Value = serde_yaml::from_str(&text).unwrap();
    assert_eq!(parsed, Value::Object(rendered.config));
    assert!(worker_dir(dir.path(), "n0").join("data").is_dir());
}
