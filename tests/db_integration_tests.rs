//! Integration tests for the database layer.
//!
//! These tests use an in-memory SQLite database unless a file is needed.

use crowd_scheduler::db::Database;
use crowd_scheduler::db::export::{EXPORT_VERSION, ProjectSnapshot};
use crowd_scheduler::error::{ApiError, ErrorCode};
use crowd_scheduler::sched::SchedulingPolicy;
use crowd_scheduler::types::{NewProject, NewTask, NewTaskRun, Requester, TaskState};
use serde_json::json;
use tempfile::TempDir;

fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn new_project(short_name: &str) -> NewProject {
    NewProject {
        short_name: short_name.to_string(),
        name: String::new(),
        allow_anonymous_contributors: true,
        info: None,
    }
}

fn error_code(err: anyhow::Error) -> ErrorCode {
    ApiError::from(err).code
}

mod project_tests {
    use super::*;

    #[test]
    fn duplicate_short_name_is_rejected() {
        let db = setup_db();
        db.create_project(new_project("birds")).unwrap();
        let err = db.create_project(new_project("birds")).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::AlreadyExists);
    }

    #[test]
    fn policy_is_stored_in_info_and_survives_reload() {
        let db = setup_db();
        let mut input = new_project("birds");
        input.info = Some(json!({"description": "count birds"}));
        let project = db.create_project(input).unwrap();

        db.set_project_policy(project.id, SchedulingPolicy::Incremental).unwrap();
        let reloaded = db.get_project_by_short_name("birds").unwrap().unwrap();
        assert_eq!(reloaded.info["sched"], "incremental");
        assert_eq!(reloaded.info["description"], "count birds");
        assert_eq!(SchedulingPolicy::for_project(&reloaded), SchedulingPolicy::Incremental);
    }

    #[test]
    fn file_database_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crowd.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_project(new_project("kept")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_projects().unwrap().len(), 1);
    }
}

mod task_run_tests {
    use super::*;

    #[test]
    fn answer_for_task_in_other_project_is_rejected() {
        let db = setup_db();
        let a = db.create_project(new_project("a")).unwrap();
        let b = db.create_project(new_project("b")).unwrap();
        let task = db.create_task(a.id, NewTask::default()).unwrap();

        let err = db
            .submit_task_run(NewTaskRun {
                project_id: b.id,
                task_id: task.id,
                user_id: Some(1),
                user_ip: None,
                info: json!("x"),
            })
            .unwrap_err();
        assert_eq!(error_code(err), ErrorCode::InvalidFieldValue);
    }

    #[test]
    fn anonymous_answers_are_refused_when_project_forbids_them() {
        let db = setup_db();
        let mut input = new_project("closed");
        input.allow_anonymous_contributors = false;
        let project = db.create_project(input).unwrap();
        let task = db.create_task(project.id, NewTask::default()).unwrap();

        let err = db
            .submit_task_run(NewTaskRun {
                project_id: project.id,
                task_id: task.id,
                user_id: None,
                user_ip: Some("10.0.0.1".into()),
                info: json!("x"),
            })
            .unwrap_err();
        assert_eq!(error_code(err), ErrorCode::AnonymousNotAllowed);
    }
}

mod stats_tests {
    use super::*;

    #[test]
    fn counts_contributors_by_identity_channel() {
        let db = setup_db();
        let project = db.create_project(new_project("p")).unwrap();
        let t1 = db
            .create_task(project.id, NewTask { n_answers: Some(2), ..Default::default() })
            .unwrap();
        let t2 = db
            .create_task(project.id, NewTask { n_answers: Some(2), ..Default::default() })
            .unwrap();

        for (task_id, user_id, user_ip) in [
            (t1.id, Some(1), None),
            (t1.id, None, Some("10.0.0.1")),
            (t2.id, Some(1), None),
        ] {
            db.submit_task_run(NewTaskRun {
                project_id: project.id,
                task_id,
                user_id,
                user_ip: user_ip.map(String::from),
                info: json!(null),
            })
            .unwrap();
        }

        let stats = db.project_stats(project.id).unwrap();
        assert_eq!(stats.n_tasks, 2);
        assert_eq!(stats.n_completed_tasks, 1);
        assert_eq!(stats.n_task_runs, 3);
        assert_eq!(stats.n_registered_contributors, 1);
        assert_eq!(stats.n_anonymous_contributors, 1);
        assert!((stats.overall_progress - 50.0).abs() < f64::EPSILON);

        let progress = db.user_progress(project.id, &Requester::User(1)).unwrap();
        assert_eq!((progress.done, progress.total), (2, 2));
        let progress = db
            .user_progress(project.id, &Requester::Anonymous("10.0.0.1".into()))
            .unwrap();
        assert_eq!((progress.done, progress.total), (1, 2));
    }
}

mod export_tests {
    use super::*;

    #[test]
    fn export_without_task_runs_keeps_task_states() {
        let db = setup_db();
        let project = db.create_project(new_project("p")).unwrap();
        let task = db
            .create_task(project.id, NewTask { n_answers: Some(1), ..Default::default() })
            .unwrap();
        db.submit_task_run(NewTaskRun {
            project_id: project.id,
            task_id: task.id,
            user_id: Some(5),
            user_ip: None,
            info: json!({"label": "owl"}),
        })
        .unwrap();

        let snapshot = db.export_project(project.id, false).unwrap();
        assert_eq!(snapshot.export_version, EXPORT_VERSION);
        assert!(snapshot.task_runs.is_empty());
        assert_eq!(snapshot.tasks[0].state, TaskState::Completed);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.json");
        snapshot
            .write_to(std::fs::File::create(&path).unwrap(), false)
            .unwrap();
        let loaded = ProjectSnapshot::from_file(&path).unwrap();
        assert_eq!(loaded.project.short_name, "p");
        assert_eq!(loaded.tasks.len(), 1);
    }

    #[test]
    fn export_of_unknown_project_fails() {
        let db = setup_db();
        let err = db.export_project(77, true).unwrap_err();
        assert_eq!(error_code(err), ErrorCode::ProjectNotFound);
    }
}
