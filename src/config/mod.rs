//! Configuration.
//!
//! Built-in defaults are merged field-by-field with
//! `./crowd-scheduler/config.yaml` and `~/.crowd-scheduler/config.yaml`, then
//! environment variables are applied.
//!
//! ## Environment Variables
//! - `CROWD_SCHED_CONFIG_PATH` - Explicit config file (replaces the file tiers)
//! - `CROWD_SCHED_DB_PATH` - Database path
//! - `CROWD_SCHED_PORT` - HTTP port
//! - `CROWD_SCHED_CANDIDATE_WINDOW` - Scheduler candidate window
//! - `CROWD_SCHED_USER_DIR` - User config dir (default: `~/.crowd-scheduler`)
//! - `CROWD_SCHED_PROJECT_DIR` - Project config dir (default: `./crowd-scheduler`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, apply_env_overrides};
pub use merge::{merge_into, merge_tiers};
pub use types::*;
