//! CLI argument definitions for the `gauntlet` binary.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Run a scenario against a fleet of worker containers.
///
/// Places the design's workers on its hosts, streams their output into the
/// document store and walks the scenario's sequences until it completes,
/// fails or is interrupted.
#[derive(Parser, Debug)]
#[command(name = "gauntlet")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to the design document (YAML).
    pub design: PathBuf,

    /// Path to gauntlet.toml. Defaults are used when the file does not exist.
    #[arg(short, long, default_value = "gauntlet.toml")]
    pub config: PathBuf,

    /// Override the per-worker log directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Give up after this many seconds. The run then exits with an error.
    #[arg(long, value_name = "SECS")]
    pub exit_after: Option<u64>,

    /// Validate, place workers and write their configs, then exit.
    #[arg(long)]
    pub config_only: bool,

    /// Stop worker containers still running from an earlier run.
    #[arg(long)]
    pub force: bool,

    /// Remove worker containers after a successful run.
    #[arg(long)]
    pub clean_after: bool,
}

impl DaemonCli {
    /// Time budget for the whole run, if one was given.
    pub fn exit_after(&self) -> Option<Duration> {
        self.exit_after
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn design_is_required() {
        assert!(DaemonCli::try_parse_from(["gauntlet"]).is_err());
    }

    #[test]
    fn defaults() {
        let cli = DaemonCli::try_parse_from(["gauntlet", "design.yml"]).unwrap();
        assert_eq!(cli.design, PathBuf::from("design.yml"));
        assert_eq!(cli.config, PathBuf::from("gauntlet.toml"));
        assert!(cli.exit_after().is_none());
        assert!(!cli.config_only);
        assert!(!cli.force);
    }

    #[test]
    fn exit_after_zero_means_no_budget() {
        let cli =
            DaemonCli::try_parse_from(["gauntlet", "d.yml", "--exit-after", "0"]).unwrap();
        assert!(cli.exit_after().is_none());

        let cli =
            DaemonCli::try_parse_from(["gauntlet", "d.yml", "--exit-after", "90"]).unwrap();
        assert_eq!(cli.exit_after(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn overrides_are_parsed() {
        let cli = DaemonCli::try_parse_from([
            "gauntlet",
            "d.yml",
            "-c",
            "/etc/gauntlet.toml",
            "--log-dir",
            "/tmp/logs",
            "--log-format",
            "pretty",
            "--config-only",
            "--force",
            "--clean-after",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/gauntlet.toml"));
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(cli.log_format.as_deref(), Some("pretty"));
        assert!(cli.config_only && cli.force && cli.clean_after);
    }
}
