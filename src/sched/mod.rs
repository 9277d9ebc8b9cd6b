//! Task assignment scheduler.
//!
//! [`Scheduler::new_task`] picks the next task a requester should work on in a
//! project. The project's `info.sched` value selects a [`SchedulingPolicy`].
//! Every call re-reads candidates from the database; the scheduler holds no
//! per-project state and never writes task state.
//!
//! Candidate windows are capped at [`CANDIDATE_WINDOW`] tasks by default. The
//! cap bounds both query cost and how far a client can prefetch with `offset`:
//! an offset at or past the window yields [`Assignment::Exhausted`], exactly
//! like a project with no eligible task left.

pub mod lease;
mod policies;

use crate::db::Database;
use crate::error::ApiError;
use crate::types::{FALLBACK_IP, NewTaskRun, Project, Requester, Task, TaskRun};
use lease::{NoLease, TaskLeaseStrategy};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Default number of candidate tasks fetched per scheduling decision.
pub const CANDIDATE_WINDOW: usize = 10;

/// Error text carried by [`Assignment::AnonymousNotAllowed`] in its legacy
/// JSON rendering.
pub const ANONYMOUS_NOT_ALLOWED_MESSAGE: &str = "This application does not allow anonymous contributors";

/// Task selection strategy configured per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Same behavior as [`SchedulingPolicy::DepthFirst`].
    #[default]
    Default,
    BreadthFirst,
    DepthFirst,
    Random,
    Incremental,
}

impl SchedulingPolicy {
    pub const ALL: [SchedulingPolicy; 5] = [
        SchedulingPolicy::Default,
        SchedulingPolicy::BreadthFirst,
        SchedulingPolicy::DepthFirst,
        SchedulingPolicy::Random,
        SchedulingPolicy::Incremental,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingPolicy::Default => "default",
            SchedulingPolicy::BreadthFirst => "breadth_first",
            SchedulingPolicy::DepthFirst => "depth_first",
            SchedulingPolicy::Random => "random",
            SchedulingPolicy::Incremental => "incremental",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// Resolve a configured value; missing or unknown values mean `Default`.
    pub fn resolve(value: Option<&str>) -> Self {
        match value {
            None => SchedulingPolicy::Default,
            Some(s) => Self::parse(s).unwrap_or_else(|| {
                warn!(sched = %s, "Unknown scheduling policy, using default");
                SchedulingPolicy::Default
            }),
        }
    }

    /// Policy stored in a project's `info.sched`.
    pub fn for_project(project: &Project) -> Self {
        Self::resolve(project.info.get("sched").and_then(Value::as_str))
    }
}

impl std::fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a scheduling request.
#[derive(Debug, Clone)]
pub enum Assignment {
    /// The task to present.
    Task(Task),
    /// No eligible task at the requested offset.
    Exhausted,
    /// The project refuses requesters without a user id.
    AnonymousNotAllowed,
}

impl Assignment {
    pub fn task(&self) -> Option<&Task> {
        match self {
            Assignment::Task(task) => Some(task),
            _ => None,
        }
    }

    pub fn into_task(self) -> Option<Task> {
        match self {
            Assignment::Task(task) => Some(task),
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Assignment::Exhausted)
    }

    /// Render in the shape web clients expect: the task itself, `{}` when
    /// exhausted, or an id-less task whose info carries the error message.
    pub fn to_legacy_json(&self) -> Value {
        match self {
            Assignment::Task(task) => serde_json::to_value(task).unwrap_or_else(|_| json!({})),
            Assignment::Exhausted => json!({}),
            Assignment::AnonymousNotAllowed => json!({
                "id": null,
                "project_id": null,
                "info": { "error": ANONYMOUS_NOT_ALLOWED_MESSAGE },
            }),
        }
    }
}

/// Errors that abort a scheduling request.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("project not found: {0}")]
    ProjectNotFound(i64),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::ProjectNotFound(id) => ApiError::project_not_found(id),
            SchedulerError::Storage(err) => ApiError::from(err),
        }
    }
}

/// Chooses tasks for requesters.
pub struct Scheduler {
    db: Arc<Database>,
    window: usize,
    fallback_ip: String,
    lease: Arc<dyn TaskLeaseStrategy>,
    rng: Mutex<StdRng>,
}

impl Scheduler {
    /// Scheduler with the default window, no leasing and an OS-seeded RNG.
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_rng(db, StdRng::from_os_rng())
    }

    /// Scheduler with a deterministic RNG for the random and incremental policies.
    pub fn with_seed(db: Arc<Database>, seed: u64) -> Self {
        Self::with_rng(db, StdRng::seed_from_u64(seed))
    }

    fn with_rng(db: Arc<Database>, rng: StdRng) -> Self {
        Self {
            db,
            window: CANDIDATE_WINDOW,
            fallback_ip: FALLBACK_IP.to_string(),
            lease: Arc::new(NoLease),
            rng: Mutex::new(rng),
        }
    }

    /// Override the candidate window (at least 1).
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Address assumed for anonymous requesters that supply none.
    pub fn with_fallback_ip(mut self, ip: impl Into<String>) -> Self {
        self.fallback_ip = ip.into();
        self
    }

    pub fn with_lease_strategy(mut self, lease: Arc<dyn TaskLeaseStrategy>) -> Self {
        self.lease = lease;
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn lease_strategy(&self) -> &dyn TaskLeaseStrategy {
        self.lease.as_ref()
    }

    /// Pick the next task for a requester.
    ///
    /// `user_id` identifies a registered requester; otherwise `user_ip` (or the
    /// fallback address) identifies an anonymous one. `offset` selects the
    /// n-th eligible task for prefetching and is ignored by the random and
    /// incremental policies.
    pub fn new_task(
        &self,
        project_id: i64,
        user_id: Option<i64>,
        user_ip: Option<&str>,
        offset: usize,
    ) -> Result<Assignment, SchedulerError> {
        let project = self
            .db
            .get_project(project_id)?
            .ok_or(SchedulerError::ProjectNotFound(project_id))?;

        if !project.allow_anonymous_contributors && user_id.is_none() {
            debug!(project_id, "Anonymous requester refused");
            return Ok(Assignment::AnonymousNotAllowed);
        }

        let requester = Requester::resolve_with_fallback(user_id, user_ip, &self.fallback_ip);
        let policy = SchedulingPolicy::for_project(&project);
        let lease = self.lease.as_ref();

        let task = match policy {
            SchedulingPolicy::Default | SchedulingPolicy::DepthFirst => {
                policies::depth_first(&self.db, lease, project_id, &requester, offset, self.window)?
            }
            SchedulingPolicy::BreadthFirst => {
                policies::breadth_first(&self.db, lease, project_id, &requester, offset, self.window)?
            }
            SchedulingPolicy::Random => {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                policies::random(&self.db, project_id, &mut *rng)?
            }
            SchedulingPolicy::Incremental => {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                policies::incremental(&self.db, lease, project_id, &requester, self.window, &mut *rng)?
            }
        };

        match task {
            Some(task) => {
                // Random picks bypass the lease filter, so they reserve nothing.
                if policy != SchedulingPolicy::Random {
                    lease.on_handout(&requester, &task);
                }
                debug!(
                    project_id,
                    task_id = task.id,
                    requester = %requester,
                    policy = %policy,
                    offset,
                    "Task assigned"
                );
                Ok(Assignment::Task(task))
            }
            None => {
                debug!(project_id, requester = %requester, policy = %policy, offset, "No eligible task");
                Ok(Assignment::Exhausted)
            }
        }
    }

    /// Record an answer and release the answering requester's lease on it.
    pub fn submit_task_run(&self, input: NewTaskRun) -> anyhow::Result<TaskRun> {
        let run = self.db.submit_task_run(input)?;
        let requester = Requester::resolve(run.user_id, run.user_ip.as_deref());
        self.lease.release(&requester, run.task_id);
        Ok(run)
    }
}
