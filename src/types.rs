//! Core types for the crowdsourcing scheduler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default number of answers a task needs before it is completed.
pub const DEFAULT_N_ANSWERS: i64 = 30;

/// Placeholder address used for anonymous requesters with no known IP.
pub const FALLBACK_IP: &str = "127.0.0.1";

/// A crowdsourcing project (campaign) that owns tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub short_name: String,
    pub name: String,
    pub allow_anonymous_contributors: bool,
    /// Free-form configuration. `info.sched` selects the scheduling policy.
    pub info: Value,
    pub created_at: i64,
}

/// Input for creating a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub short_name: String,
    /// Display name; blank means the short name.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub allow_anonymous_contributors: bool,
    #[serde(default)]
    pub info: Option<Value>,
}

fn default_true() -> bool {
    true
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Ongoing,
    Completed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Ongoing => "ongoing",
            TaskState::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ongoing" => Some(TaskState::Ongoing),
            "completed" => Some(TaskState::Completed),
            _ => None,
        }
    }
}

/// A unit of work inside a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub state: TaskState,
    /// Redundancy: answers required before the task is completed.
    pub n_answers: i64,
    /// Higher values are scheduled sooner by the depth-first policy.
    pub priority_0: f64,
    pub info: Value,
    pub created_at: i64,
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub n_answers: Option<i64>,
    pub priority_0: Option<f64>,
    pub info: Option<Value>,
}

/// One requester's answer for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: i64,
    pub task_id: i64,
    pub project_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ip: Option<String>,
    pub finish_time: i64,
    pub info: Value,
}

/// Input for recording an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTaskRun {
    pub project_id: i64,
    pub task_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_ip: Option<String>,
    #[serde(default)]
    pub info: Value,
}

/// Identity of whoever is asking for work.
///
/// Registered users are matched on `user_id` only, anonymous requesters on
/// their IP address only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requester {
    User(i64),
    Anonymous(String),
}

impl Requester {
    /// Resolve the identity channel: a user id wins, then the given IP,
    /// then [`FALLBACK_IP`].
    pub fn resolve(user_id: Option<i64>, user_ip: Option<&str>) -> Self {
        Self::resolve_with_fallback(user_id, user_ip, FALLBACK_IP)
    }

    /// Like [`Requester::resolve`] with a caller-supplied fallback address.
    pub fn resolve_with_fallback(user_id: Option<i64>, user_ip: Option<&str>, fallback: &str) -> Self {
        match (user_id, user_ip) {
            (Some(id), _) => Requester::User(id),
            (None, Some(ip)) if !ip.trim().is_empty() => Requester::Anonymous(ip.trim().to_string()),
            (None, _) => Requester::Anonymous(fallback.to_string()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Requester::Anonymous(_))
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Requester::User(id) => Some(*id),
            Requester::Anonymous(_) => None,
        }
    }

    pub fn user_ip(&self) -> Option<&str> {
        match self {
            Requester::User(_) => None,
            Requester::Anonymous(ip) => Some(ip),
        }
    }
}

impl std::fmt::Display for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Requester::User(id) => write!(f, "user:{}", id),
            Requester::Anonymous(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// Aggregate statistics for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStats {
    pub project_id: i64,
    pub n_tasks: i64,
    pub n_completed_tasks: i64,
    pub n_task_runs: i64,
    pub n_registered_contributors: i64,
    pub n_anonymous_contributors: i64,
    /// Percentage of tasks completed, 0-100.
    pub overall_progress: f64,
}

/// How far one requester got through a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub done: i64,
    pub total: i64,
}
