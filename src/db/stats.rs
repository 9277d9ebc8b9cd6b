//! Aggregation queries for project statistics.

use super::Database;
use super::projects::get_project_internal;
use crate::error::ApiError;
use crate::types::{ProjectStats, Requester, UserProgress};
use anyhow::Result;
use rusqlite::params;

impl Database {
    /// Task, answer and contributor counts for a project.
    pub fn project_stats(&self, project_id: i64) -> Result<ProjectStats> {
        self.with_conn(|conn| {
            if get_project_internal(conn, project_id)?.is_none() {
                return Err(ApiError::project_not_found(project_id).into());
            }

            let (n_tasks, n_completed_tasks): (i64, i64) = conn.query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN state = 'completed' THEN 1 ELSE 0 END), 0)
                 FROM tasks WHERE project_id = ?1",
                params![project_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let (n_task_runs, n_registered_contributors, n_anonymous_contributors): (i64, i64, i64) =
                conn.query_row(
                    "SELECT
                        COUNT(*),
                        COUNT(DISTINCT user_id),
                        COUNT(DISTINCT user_ip)
                     FROM task_runs WHERE project_id = ?1",
                    params![project_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;

            let overall_progress = if n_tasks == 0 {
                0.0
            } else {
                (n_completed_tasks as f64 / n_tasks as f64) * 100.0
            };

            Ok(ProjectStats {
                project_id,
                n_tasks,
                n_completed_tasks,
                n_task_runs,
                n_registered_contributors,
                n_anonymous_contributors,
                overall_progress,
            })
        })
    }

    /// Number of tasks this requester answered out of the project's total.
    pub fn user_progress(&self, project_id: i64, requester: &Requester) -> Result<UserProgress> {
        self.with_conn(|conn| {
            if get_project_internal(conn, project_id)?.is_none() {
                return Err(ApiError::project_not_found(project_id).into());
            }

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE project_id = ?1",
                params![project_id],
                |row| row.get(0),
            )?;
            let done: i64 = match requester {
                Requester::User(id) => conn.query_row(
                    "SELECT COUNT(DISTINCT task_id) FROM task_runs
                     WHERE project_id = ?1 AND user_id = ?2",
                    params![project_id, id],
                    |row| row.get(0),
                )?,
                Requester::Anonymous(ip) => conn.query_row(
                    "SELECT COUNT(DISTINCT task_id) FROM task_runs
                     WHERE project_id = ?1 AND user_ip = ?2",
                    params![project_id, ip],
                    |row| row.get(0),
                )?,
            };

            Ok(UserProgress { done, total })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewProject, NewTask, NewTaskRun};
    use serde_json::json;

    #[test]
    fn stats_count_tasks_runs_and_contributors() {
        let db = Database::open_in_memory().unwrap();
        let project = db
            .create_project(NewProject {
                short_name: "s".into(),
                name: "S".into(),
                allow_anonymous_contributors: true,
                info: None,
            })
            .unwrap();
        let one = NewTask {
            n_answers: Some(1),
            ..Default::default()
        };
        let t1 = db.create_task(project.id, one.clone()).unwrap();
        let t2 = db.create_task(project.id, one).unwrap();

        for (task_id, user_id, ip) in [(t1.id, Some(1), None), (t2.id, None, Some("1.2.3.4"))] {
            db.submit_task_run(NewTaskRun {
                project_id: project.id,
                task_id,
                user_id,
                user_ip: ip.map(str::to_string),
                info: json!(null),
            })
            .unwrap();
        }

        let stats = db.project_stats(project.id).unwrap();
        assert_eq!(stats.n_tasks, 2);
        assert_eq!(stats.n_completed_tasks, 2);
        assert_eq!(stats.n_task_runs, 2);
        assert_eq!(stats.n_registered_contributors, 1);
        assert_eq!(stats.n_anonymous_contributors, 1);
        assert_eq!(stats.overall_progress, 100.0);

        let progress = db.user_progress(project.id, &Requester::User(1)).unwrap();
        assert_eq!(progress, UserProgress { done: 1, total: 2 });
    }

    #[test]
    fn empty_project_has_zero_progress() {
        let db = Database::open_in_memory().unwrap();
        let project = db
            .create_project(NewProject {
                short_name: "e".into(),
                name: "E".into(),
                allow_anonymous_contributors: true,
                info: None,
            })
            .unwrap();
        let stats = db.project_stats(project.id).unwrap();
        assert_eq!(stats.n_tasks, 0);
        assert_eq!(stats.overall_progress, 0.0);
        assert!(db.project_stats(project.id + 1).is_err());
    }
}
