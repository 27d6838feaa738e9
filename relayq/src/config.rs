//! Locating and reading the daemon configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::controller::Relayq;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "RELAYQ_CONFIG";

fn default_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./relayq.config.ron"),
        PathBuf::from("/etc/relayq/relayq.config.ron"),
    ]
}

/// Find the configuration file using the following precedence:
/// 1. `explicit` (the `--config` flag)
/// 2. `env` (the `RELAYQ_CONFIG` environment variable)
/// 3. ./relayq.config.ron (current working directory)
/// 4. /etc/relayq/relayq.config.ron (system-wide config)
///
/// # Errors
///
/// Fails if an explicitly named file does not exist, or if none of the
/// default locations has one.
pub fn find_config_file(explicit: Option<&Path>, env: Option<&str>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Some(env_path) = env {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = default_paths();
    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config flag\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

/// Reads and parses the RON configuration at `path`.
///
/// # Errors
///
/// Fails if the file cannot be read or is not a valid configuration.
pub fn load(path: &Path) -> anyhow::Result<Relayq> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    ron::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))
}
