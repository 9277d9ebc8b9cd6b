//! Task runs (answers).
//!
//! Inserting a run fires the `task_runs_complete_task` trigger, which moves the
//! task to `completed` once it holds `n_answers` answers.

use super::projects::get_project_internal;
use super::tasks::get_task_internal;
use super::{Database, json_column, now_ms};
use crate::error::ApiError;
use crate::types::{NewTaskRun, Requester, TaskRun, TaskState};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};
use tracing::{debug, info};

pub fn parse_task_run_row(row: &Row) -> rusqlite::Result<TaskRun> {
    let info: String = row.get("info")?;
    Ok(TaskRun {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        project_id: row.get("project_id")?,
        user_id: row.get("user_id")?,
        user_ip: row.get("user_ip")?,
        finish_time: row.get("finish_time")?,
        info: json_column(&info),
    })
}

impl Database {
    /// Record an answer.
    ///
    /// Rejects answers for unknown or completed tasks, answers whose task lives
    /// in another project, anonymous answers to projects that forbid them and
    /// a second answer from the same requester.
    pub fn submit_task_run(&self, input: NewTaskRun) -> Result<TaskRun> {
        let requester = Requester::resolve(input.user_id, input.user_ip.as_deref());
        let info_json = serde_json::to_string(&input.info)?;
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let project = get_project_internal(&tx, input.project_id)?
                .ok_or_else(|| ApiError::project_not_found(input.project_id))?;
            let task = get_task_internal(&tx, input.task_id)?
                .ok_or_else(|| ApiError::task_not_found(input.task_id))?;

            if task.project_id != project.id {
                return Err(ApiError::invalid_value("task_id", "task does not belong to this project")
                    .with_details(format!("task {} belongs to project {}", task.id, task.project_id))
                    .into());
            }
            if task.state == TaskState::Completed {
                return Err(ApiError::task_completed(task.id).into());
            }
            if requester.is_anonymous() && !project.allow_anonymous_contributors {
                return Err(ApiError::anonymous_not_allowed(project.id).into());
            }

            let already: bool = match &requester {
                Requester::User(id) => tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM task_runs WHERE task_id = ?1 AND user_id = ?2)",
                    params![task.id, id],
                    |row| row.get(0),
                )?,
                Requester::Anonymous(ip) => tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM task_runs WHERE task_id = ?1 AND user_ip = ?2)",
                    params![task.id, ip],
                    |row| row.get(0),
                )?,
            };
            if already {
                return Err(ApiError::already_answered(task.id, &requester).into());
            }

            tx.execute(
                "INSERT INTO task_runs (task_id, project_id, user_id, user_ip, finish_time, info)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    task.id,
                    project.id,
                    requester.user_id(),
                    requester.user_ip(),
                    now,
                    &info_json
                ],
            )?;
            let id = tx.last_insert_rowid();

            let state: String = tx.query_row(
                "SELECT state FROM tasks WHERE id = ?1",
                params![task.id],
                |row| row.get(0),
            )?;
            tx.commit()?;

            if state == TaskState::Completed.as_str() {
                info!(task_id = task.id, project_id = project.id, "Task reached its answer quota");
            }
            debug!(task_run_id = id, task_id = task.id, requester = %requester, "Answer recorded");

            Ok(TaskRun {
                id,
                task_id: task.id,
                project_id: project.id,
                user_id: requester.user_id(),
                user_ip: requester.user_ip().map(str::to_string),
                finish_time: now,
                info: input.info,
            })
        })
    }

    /// Most recent answer for a task by any requester.
    pub fn latest_task_run(&self, task_id: i64) -> Result<Option<TaskRun>> {
        self.with_conn(|conn| {
            let run = conn
                .query_row(
                    "SELECT * FROM task_runs WHERE task_id = ?1
                     ORDER BY finish_time DESC, id DESC LIMIT 1",
                    params![task_id],
                    parse_task_run_row,
                )
                .optional()?;
            Ok(run)
        })
    }

    /// All answers for a task, oldest first.
    pub fn list_task_runs(&self, task_id: i64) -> Result<Vec<TaskRun>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM task_runs WHERE task_id = ?1 ORDER BY finish_time, id",
            )?;
            let runs = stmt
                .query_map(params![task_id], parse_task_run_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(runs)
        })
    }

    /// All answers in a project, oldest first.
    pub fn list_project_task_runs(&self, project_id: i64) -> Result<Vec<TaskRun>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM task_runs WHERE project_id = ?1 ORDER BY finish_time, id",
            )?;
            let runs = stmt
                .query_map(params![project_id], parse_task_run_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(runs)
        })
    }
}
