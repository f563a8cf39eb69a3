//! Configuration loading and types

use std::path::{Path, PathBuf};

use eyre::{WrapErr, eyre};
use kubespector_core::Config as ClusterConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "KUBESPECTOR_CONFIG";

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,
    /// SSH settings and node groups
    #[serde(flatten)]
    pub cluster: ClusterConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load from `explicit`, `$KUBESPECTOR_CONFIG`, or the first default
    /// path that exists
    ///
    /// # Errors
    /// Returns error if no file is found or it cannot be parsed
    pub fn load_default(explicit: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        let paths = default_paths();
        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(eyre!(
            "no config file found, searched: {}",
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("kubespector.toml"),
        PathBuf::from("/etc/kubespector/kubespector.toml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("kubespector/kubespector.toml"));
    }
    paths
}
