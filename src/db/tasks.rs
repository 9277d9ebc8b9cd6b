//! Task CRUD and the eligibility queries the scheduler runs on.

use super::projects::get_project_internal;
use super::{Database, info_object, json_column, now_ms};
use crate::error::ApiError;
use crate::types::{DEFAULT_N_ANSWERS, NewTask, Requester, Task, TaskState};
use anyhow::Result;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let state: String = row.get("state")?;
    let info: String = row.get("info")?;

    Ok(Task {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        // The CHECK constraint only admits the two known states
        state: TaskState::from_str(&state).unwrap_or(TaskState::Ongoing),
        n_answers: row.get("n_answers")?,
        priority_0: row.get("priority_0")?,
        info: json_column(&info),
        created_at: row.get("created_at")?,
    })
}

/// Column and bound value that identify a requester's answers.
fn identity(requester: &Requester) -> (&'static str, SqlValue) {
    match requester {
        Requester::User(id) => ("user_id", SqlValue::Integer(*id)),
        Requester::Anonymous(ip) => ("user_ip", SqlValue::Text(ip.clone())),
    }
}

pub(crate) fn get_task_internal(conn: &Connection, task_id: i64) -> Result<Option<Task>> {
    let task = conn
        .query_row("SELECT * FROM tasks WHERE id = ?1", params![task_id], parse_task_row)
        .optional()?;
    Ok(task)
}

/// Outcome of a redundancy change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RedundancyUpdate {
    /// Ongoing tasks whose `n_answers` was rewritten.
    pub updated: usize,
    /// Tasks that already had enough answers and were completed.
    pub completed: usize,
}

impl Database {
    /// Create a task in a project.
    pub fn create_task(&self, project_id: i64, input: NewTask) -> Result<Task> {
        let n_answers = input.n_answers.unwrap_or(DEFAULT_N_ANSWERS);
        if n_answers < 1 {
            return Err(ApiError::invalid_value("n_answers", "n_answers must be at least 1").into());
        }
        let priority_0 = input.priority_0.unwrap_or(0.0);
        if !priority_0.is_finite() {
            return Err(ApiError::invalid_value("priority_0", "priority_0 must be a finite number").into());
        }
        let info = info_object(input.info, "info")?;
        let now = now_ms();

        self.with_conn(|conn| {
            if get_project_internal(conn, project_id)?.is_none() {
                return Err(ApiError::project_not_found(project_id).into());
            }

            conn.execute(
                "INSERT INTO tasks (project_id, state, n_answers, priority_0, info, created_at)
                 VALUES (?1, 'ongoing', ?2, ?3, ?4, ?5)",
                params![project_id, n_answers, priority_0, serde_json::to_string(&info)?, now],
            )?;
            let id = conn.last_insert_rowid();
            debug!(project_id, task_id = id, n_answers, priority_0, "Task created");

            Ok(Task {
                id,
                project_id,
                state: TaskState::Ongoing,
                n_answers,
                priority_0,
                info,
                created_at: now,
            })
        })
    }

    /// Get a task by ID.
    pub fn get_task(&self, task_id: i64) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    /// List a project's tasks by id, optionally filtered by state.
    pub fn list_tasks(&self, project_id: i64, state: Option<TaskState>) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let tasks = match state {
                Some(state) => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM tasks WHERE project_id = ?1 AND state = ?2 ORDER BY id",
                    )?;
                    stmt.query_map(params![project_id, state.as_str()], parse_task_row)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt =
                        conn.prepare("SELECT * FROM tasks WHERE project_id = ?1 ORDER BY id")?;
                    stmt.query_map(params![project_id], parse_task_row)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(tasks)
        })
    }

    /// Every task of a project regardless of state or prior answers.
    pub fn all_project_tasks(&self, project_id: i64) -> Result<Vec<Task>> {
        self.list_tasks(project_id, None)
    }

    /// Up to `limit` tasks the requester may still answer, highest
    /// `priority_0` first, then oldest first.
    ///
    /// A task is eligible when it belongs to the project, is not completed and
    /// has no answer from this requester's identity.
    pub fn candidate_tasks(
        &self,
        project_id: i64,
        requester: &Requester,
        limit: usize,
    ) -> Result<Vec<Task>> {
        let (column, value) = identity(requester);
        let sql = format!(
            "SELECT t.* FROM tasks t
             WHERE t.project_id = ?1
               AND t.state != 'completed'
               AND NOT EXISTS (
                   SELECT 1 FROM task_runs r WHERE r.task_id = t.id AND r.{column} = ?2
               )
             ORDER BY t.priority_0 DESC, t.id ASC
             LIMIT ?3"
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let tasks = stmt
                .query_map(params![project_id, value, limit as i64], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    /// Up to `limit` eligible tasks paired with their total answer count,
    /// fewest answers first, then oldest first.
    ///
    /// The count covers every requester and is not capped by `n_answers`.
    pub fn breadth_first_candidates(
        &self,
        project_id: i64,
        requester: &Requester,
        limit: usize,
    ) -> Result<Vec<(Task, i64)>> {
        let (column, value) = identity(requester);
        let sql = format!(
            "SELECT t.*, COUNT(r.id) AS answer_count FROM tasks t
             LEFT JOIN task_runs r ON r.task_id = t.id
             WHERE t.project_id = ?1
               AND t.state != 'completed'
               AND NOT EXISTS (
                   SELECT 1 FROM task_runs x WHERE x.task_id = t.id AND x.{column} = ?2
               )
             GROUP BY t.id
             ORDER BY answer_count ASC, t.id ASC
             LIMIT ?3"
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![project_id, value, limit as i64], |row| {
                    Ok((parse_task_row(row)?, row.get::<_, i64>("answer_count")?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Change a task's scheduling priority.
    pub fn set_task_priority(&self, task_id: i64, priority_0: f64) -> Result<Task> {
        if !priority_0.is_finite() {
            return Err(ApiError::invalid_value("priority_0", "priority_0 must be a finite number").into());
        }
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE tasks SET priority_0 = ?1 WHERE id = ?2",
                params![priority_0, task_id],
            )?;
            if updated == 0 {
                return Err(ApiError::task_not_found(task_id).into());
            }
            get_task_internal(conn, task_id)?.ok_or_else(|| ApiError::task_not_found(task_id).into())
        })
    }

    /// Set `n_answers` on every ongoing task of a project.
    ///
    /// Tasks that already hold at least the new number of answers are
    /// completed. Completed tasks are never reopened.
    pub fn set_project_redundancy(&self, project_id: i64, n_answers: i64) -> Result<RedundancyUpdate> {
        if n_answers < 1 {
            return Err(ApiError::invalid_value("n_answers", "n_answers must be at least 1").into());
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if get_project_internal(&tx, project_id)?.is_none() {
                return Err(ApiError::project_not_found(project_id).into());
            }

            let updated = tx.execute(
                "UPDATE tasks SET n_answers = ?2 WHERE project_id = ?1 AND state = 'ongoing'",
                params![project_id, n_answers],
            )?;
            let completed = tx.execute(
                "UPDATE tasks SET state = 'completed'
                 WHERE project_id = ?1 AND state = 'ongoing'
                   AND (SELECT COUNT(*) FROM task_runs r WHERE r.task_id = tasks.id) >= n_answers",
                params![project_id],
            )?;
            tx.commit()?;

            info!(project_id, n_answers, updated, completed, "Project redundancy changed");
            Ok(RedundancyUpdate { updated, completed })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewProject;

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let project = db
            .create_project(NewProject {
                short_name: "p".into(),
                name: "P".into(),
                allow_anonymous_contributors: true,
                info: None,
            })
            .unwrap();
        (db, project.id)
    }

    #[test]
    fn create_task_applies_defaults() {
        let (db, pid) = setup();
        let task = db.create_task(pid, NewTask::default()).unwrap();
        assert_eq!(task.n_answers, 30);
        assert_eq!(task.priority_0, 0.0);
        assert_eq!(task.state, TaskState::Ongoing);

        let loaded = db.get_task(task.id).unwrap().unwrap();
        assert_eq!(loaded.project_id, pid);
        assert_eq!(loaded.info, serde_json::json!({}));
    }

    #[test]
    fn create_task_rejects_zero_redundancy_and_unknown_project() {
        let (db, pid) = setup();
        let zero = NewTask {
            n_answers: Some(0),
            ..Default::default()
        };
        assert!(db.create_task(pid, zero).is_err());
        assert!(db.create_task(pid + 100, NewTask::default()).is_err());
    }

    #[test]
    fn create_task_rejects_non_object_info() {
        let (db, pid) = setup();
        let input = NewTask {
            info: Some(serde_json::json!([1, 2])),
            ..Default::default()
        };
        let api: ApiError = db.create_task(pid, input).unwrap_err().into();
        assert_eq!(api.field.as_deref(), Some("info"));
    }

    #[test]
    fn candidate_window_is_capped_and_ordered() {
        let (db, pid) = setup();
        for i in 0..15 {
            let priority = if i == 12 { 5.0 } else { 0.0 };
            db.create_task(
                pid,
                NewTask {
                    priority_0: Some(priority),
                    ..Default::default()
                },
            )
            .unwrap();
        }

        let tasks = db.candidate_tasks(pid, &Requester::User(1), 10).unwrap();
        assert_eq!(tasks.len(), 10);
        assert_eq!(tasks[0].priority_0, 5.0);
        let rest: Vec<i64> = tasks[1..].iter().map(|t| t.id).collect();
        let mut sorted = rest.clone();
        sorted.sort();
        assert_eq!(rest, sorted);
    }

    #[test]
    fn set_task_priority_unknown_task() {
        let (db, _) = setup();
        let api: ApiError = db.set_task_priority(42, 1.0).unwrap_err().into();
        assert_eq!(api.code, crate::error::ErrorCode::TaskNotFound);
    }
}
