//! Configuration loader with tier-based merging.
//!
//! Tiers, lowest to highest precedence: built-in defaults, the project file
//! `./crowd-scheduler/config.yaml`, the user file
//! `~/.crowd-scheduler/config.yaml`, then environment variables. An explicit
//! config file replaces the two file tiers.

use super::merge::merge_tiers;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ENV_CONFIG_PATH: &str = "CROWD_SCHED_CONFIG_PATH";
pub const ENV_DB_PATH: &str = "CROWD_SCHED_DB_PATH";
pub const ENV_PORT: &str = "CROWD_SCHED_PORT";
pub const ENV_CANDIDATE_WINDOW: &str = "CROWD_SCHED_CANDIDATE_WINDOW";
pub const ENV_USER_DIR: &str = "CROWD_SCHED_USER_DIR";
pub const ENV_PROJECT_DIR: &str = "CROWD_SCHED_PROJECT_DIR";

const CONFIG_FILE: &str = "config.yaml";

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover directories from the environment and the home directory.
    pub fn discover() -> Self {
        let project_dir = std::env::var(ENV_PROJECT_DIR)
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("crowd-scheduler")));
        let user_dir = std::env::var(ENV_USER_DIR)
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".crowd-scheduler")));

        Self { project_dir, user_dir }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self { project_dir, user_dir }
    }
}

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    sources: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Load from discovered paths, honoring `CROWD_SCHED_CONFIG_PATH` and the
    /// `explicit` file passed on the command line (which wins).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from));
        let mut loader = Self::load_files(ConfigPaths::discover(), explicit.as_deref())?;
        apply_env_overrides(&mut loader.config, |key| std::env::var(key).ok());
        Ok(loader)
    }

    /// Merge defaults with the config files only (no environment tier).
    pub fn load_files(paths: ConfigPaths, explicit: Option<&Path>) -> Result<Self> {
        let mut tiers: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut sources = Vec::new();

        match explicit {
            Some(path) => {
                tiers.push(read_yaml(path)?);
                sources.push(path.to_path_buf());
            }
            None => {
                let candidates = [paths.project_dir.as_ref(), paths.user_dir.as_ref()];
                for dir in candidates.into_iter().flatten() {
                    let file = dir.join(CONFIG_FILE);
                    if !file.exists() {
                        continue;
                    }
                    match read_yaml(&file) {
                        Ok(value) => {
                            tiers.push(value);
                            sources.push(file);
                        }
                        Err(e) => warn!(path = %file.display(), error = %e, "Ignoring unreadable config file"),
                    }
                }
            }
        }

        let config: Config = serde_json::from_value(merge_tiers(tiers))
            .context("invalid configuration")?;
        debug!(sources = ?sources, "Configuration loaded");

        Ok(Self { paths, config, sources })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Files that contributed to the configuration, lowest tier first.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

fn read_yaml(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(db_path) = lookup(ENV_DB_PATH) {
        config.server.db_path = PathBuf::from(db_path);
    }

    if let Some(port) = lookup(ENV_PORT) {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!(value = %port, "Ignoring invalid {}", ENV_PORT),
        }
    }

    if let Some(window) = lookup(ENV_CANDIDATE_WINDOW) {
        match window.parse::<usize>() {
            Ok(window) if window > 0 => config.scheduler.candidate_window = window,
            _ => warn!(value = %window, "Ignoring invalid {}", ENV_CANDIDATE_WINDOW),
        }
    }
}
