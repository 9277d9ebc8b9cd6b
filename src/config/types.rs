//! Configuration types.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::sched::CANDIDATE_WINDOW;
use crate::types::{DEFAULT_N_ANSWERS, FALLBACK_IP};

/// Default port for the HTTP API.
pub const DEFAULT_PORT: u16 = 31995;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Load a single YAML file without tier merging.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Storage and HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address the HTTP API binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".crowd-scheduler/crowd.db")
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Candidate tasks fetched per decision; also the largest usable offset + 1.
    #[serde(default = "default_candidate_window")]
    pub candidate_window: usize,

    /// Redundancy for tasks created without an explicit `n_answers`.
    #[serde(default = "default_n_answers")]
    pub default_n_answers: i64,

    /// Address assumed for anonymous requesters that send none.
    #[serde(default = "default_anonymous_ip")]
    pub anonymous_ip: String,

    /// Reserve handed-out tasks for this many seconds. Unset keeps the
    /// unreserved behavior where concurrent requesters may get the same task.
    #[serde(default)]
    pub lease_seconds: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            candidate_window: default_candidate_window(),
            default_n_answers: default_n_answers(),
            anonymous_ip: default_anonymous_ip(),
            lease_seconds: None,
        }
    }
}

fn default_candidate_window() -> usize {
    CANDIDATE_WINDOW
}

fn default_n_answers() -> i64 {
    DEFAULT_N_ANSWERS
}

fn default_anonymous_ip() -> String {
    FALLBACK_IP.to_string()
}
