//! Worker config rendering.
//!
//! Each worker's config is the common fragment merged with the worker's own
//! fragment, both template-expanded against the worker's variables first.
//! Top-level keys starting with `_` are not written to the file; they are
//! returned as shared values so other workers can reference them through
//! `Design.Shared.<key>.<alias>`.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use gauntlet_core::value;
use gauntlet_core::vars::Vars;

use crate::error::ContainerError;

/// File name of the rendered config inside the worker directory.
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Rendered config for one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedConfig {
    pub alias: String,
    /// Merged config without `_` keys
    pub config: Map<String, Value>,
    /// `_` keys with the prefix stripped
    pub shared: Map<String, Value>,
}

impl RenderedConfig {
    /// YAML text written to the config file.
    pub fn to_yaml(&self) -> Result<String, ContainerError> {
        serde_yaml::to_string(&self.config).map_err(|e| ContainerError::Render {
            alias: self.alias.clone(),
            reason: format!("failed to serialize config: {e}"),
        })
    }
}

/// Directory holding a worker's config and data.
pub fn worker_dir(base_dir: &Path, alias: &str) -> PathBuf {
    base_dir.join(alias)
}

pub fn config_path(base_dir: &Path, alias: &str) -> PathBuf {
    worker_dir(base_dir, alias).join(CONFIG_FILE_NAME)
}

/// Expands and merges the common and worker fragments.
pub fn render_worker_config(
    alias: &str,
    common: &str,
    fragment: &str,
    vars: &Vars,
) -> Result<RenderedConfig, ContainerError> {
    let common = parse_fragment(alias, common, vars)?;
    let own = parse_fragment(alias, fragment, vars)?;
    let merged = value::merge_objects(&common, &own);

    let mut config = Map::new();
    let mut shared = Map::new();
    for (key, value) in merged {
        match key.strip_prefix('_') {
            Some(name) if !name.is_empty() => {
                shared.insert(name.to_owned(), value);
            }
            _ => {
                config.insert(key, value);
            }
        }
    }

    Ok(RenderedConfig {
        alias: alias.to_owned(),
        config,
        shared,
    })
}

fn parse_fragment(alias: &str, text: &str, vars: &Vars) -> Result<Map<String, Value>, ContainerError> {
    let expanded = vars.expand_template(text)?;
    if expanded.trim().is_empty() {
        return Ok(Map::new());
    }

    let parsed: Value = serde_yaml::from_str(&expanded).map_err(|e| ContainerError::Render {
        alias: alias.to_owned(),
        reason: format!("invalid yaml: {e}"),
    })?;
    match parsed {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ContainerError::Render {
            alias: alias.to_owned(),
            reason: format!("config must be a mapping, got {other}"),
        }),
    }
}

/// Writes `<base>/<alias>/config.yml` and creates `<base>/<alias>/data`.
pub async fn write_worker_config(
    base_dir: &Path,
    rendered: &RenderedConfig,
) -> Result<PathBuf, ContainerError> {
    let dir = worker_dir(base_dir, &rendered.alias);
    tokio::fs::create_dir_all(dir.join("data")).await?;

    let path = dir.join(CONFIG_FILE_NAME);
    tokio::fs::write(&path, rendered.to_yaml()?).await?;
    tracing::debug!(alias = %rendered.alias, path = %path.display(), "worker config written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Vars {
        let vars = Vars::new();
        vars.set(
            "Self",
            json!({"Alias": "n0", "Host": "localhost", "Storage": {"URI": "mongodb://db:27017/n0"}}),
        );
        vars
    }

    #[test]
    fn worker_fragment_overrides_common() {
        let common = "network: devnet\nstorage:\n  uri: \"{{ .Self.Storage.URI }}\"\n  pool: 4\n";
        let own = "storage:\n  pool: 8\nthreshold: 67\n";
        let rendered = render_worker_config("n0", common, own, &vars()).unwrap();

        assert_eq!(
            Value::Object(rendered.config),
            json!({
                "network": "devnet",
                "storage": {"uri": "mongodb://db:27017/n0", "pool": 8},
                "threshold": 67,
            })
        );
    }

    #[test]
    fn underscore_keys_are_shared_not_written() {
        let own = "_address: \"{{ .Self.Alias }}:4320\"\nport: 4320\n";
        let rendered = render_worker_config("n0", "", own, &vars()).unwrap();
        assert_eq!(rendered.shared.get("address"), Some(&json!("n0:4320")));
        assert!(!rendered.config.contains_key("_address"));
        assert_eq!(rendered.config.get("port"), Some(&json!(4320)));
    }

    #[test]
    fn undefined_variable_fails() {
        let err = render_worker_config("n0", "", "a: {{ .Nope }}", &vars()).unwrap_err();
        assert!(matches!(err, ContainerError::Template(_)));
    }

    #[test]
    fn non_mapping_fragment_fails() {
        let err = render_worker_config("n0", "", "- a\n- b\n", &vars()).unwrap_err();
        assert!(matches!(err, ContainerError::Render { .. }));
    }

    #[test]
    fn empty_fragments_render_empty_config() {
        let rendered = render_worker_config("n0", "", "  \n", &vars()).unwrap();
        assert!(rendered.config.is_empty());
        assert!(rendered.shared.is_empty());
    }

    #[tokio::test]
    async fn write_creates_config_and_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let rendered = render_worker_config("n0", "a: 1", "", &vars()).unwrap();
        let path = write_worker_config(dir.path(), &rendered).await.unwrap();

        assert_eq!(path, config_path(dir.path(), "n0"));
        assert!(worker_dir(dir.path(), "n0").join("data").is_dir());
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("a: 1"));
    }
}
