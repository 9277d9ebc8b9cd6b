//! Task selection policies.
//!
//! Each policy reads a fresh candidate set from the database; nothing is cached
//! between calls.

use super::lease::TaskLeaseStrategy;
use crate::db::Database;
use crate::types::{Requester, Task};
use anyhow::Result;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde_json::{Map, Value};

/// Highest `priority_0` first, oldest first on ties; returns the task at
/// `offset` within the window.
pub(crate) fn depth_first(
    db: &Database,
    lease: &dyn TaskLeaseStrategy,
    project_id: i64,
    requester: &Requester,
    offset: usize,
    window: usize,
) -> Result<Option<Task>> {
    let candidates = db.candidate_tasks(project_id, requester, window)?;
    Ok(lease.admit(requester, candidates).into_iter().nth(offset))
}

/// Fewest answers first, oldest first on ties; returns the task at `offset`
/// within the window.
///
/// Answer counts are not compared against `n_answers`, so a task may collect a
/// few answers beyond its quota under concurrent load.
pub(crate) fn breadth_first(
    db: &Database,
    lease: &dyn TaskLeaseStrategy,
    project_id: i64,
    requester: &Requester,
    offset: usize,
    window: usize,
) -> Result<Option<Task>> {
    let candidates = db
        .breadth_first_candidates(project_id, requester, window)?
        .into_iter()
        .map(|(task, _answers)| task)
        .collect();
    Ok(lease.admit(requester, candidates).into_iter().nth(offset))
}

/// Any task of the project, uniformly at random.
///
/// Ignores completion, prior answers by the requester and the offset.
pub(crate) fn random<R: Rng + ?Sized>(
    db: &Database,
    project_id: i64,
    rng: &mut R,
) -> Result<Option<Task>> {
    let tasks = db.all_project_tasks(project_id)?;
    Ok(tasks.choose(rng).cloned())
}

/// A random task from the depth-first window, carrying the latest answer any
/// requester gave for it under `info.last_answer`.
///
/// The annotation lives only on the returned value and is never written back.
pub(crate) fn incremental<R: Rng + ?Sized>(
    db: &Database,
    lease: &dyn TaskLeaseStrategy,
    project_id: i64,
    requester: &Requester,
    window: usize,
    rng: &mut R,
) -> Result<Option<Task>> {
    let candidates = lease.admit(requester, db.candidate_tasks(project_id, requester, window)?);
    let Some(mut task) = candidates.choose(rng).cloned() else {
        return Ok(None);
    };

    if let Some(run) = db.latest_task_run(task.id)? {
        attach_last_answer(&mut task, run.info);
    }
    Ok(Some(task))
}

fn attach_last_answer(task: &mut Task, answer: Value) {
    match &mut task.info {
        Value::Object(map) => {
            map.insert("last_answer".to_string(), answer);
        }
        other => {
            let mut map = Map::new();
            map.insert("last_answer".to_string(), answer);
            *other = Value::Object(map);
        }
    }
}
