//! Project export: a JSON snapshot of a project, its tasks and answers.

use super::Database;
use crate::error::ApiError;
use crate::types::{Project, Task, TaskRun};
use anyhow::Result;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Export format version (semver).
pub const EXPORT_VERSION: &str = "1.0.0";

/// Snapshot of one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub export_version: String,
    /// RFC 3339 timestamp of the export.
    pub exported_at: String,
    pub exported_by: String,
    pub project: Project,
    pub tasks: Vec<Task>,
    /// Empty when answers were excluded.
    #[serde(default)]
    pub task_runs: Vec<TaskRun>,
}

impl ProjectSnapshot {
    /// Serialize to JSON with pretty formatting.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the snapshot, gzip-compressed when `compress` is set.
    pub fn write_to<W: Write>(&self, writer: W, compress: bool) -> Result<()> {
        let json = self.to_json_pretty()?;
        if compress {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            encoder.write_all(json.as_bytes())?;
            encoder.finish()?;
        } else {
            let mut writer = writer;
            writer.write_all(json.as_bytes())?;
        }
        Ok(())
    }

    /// Load a snapshot from a file (plain JSON or gzip).
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut bytes = Vec::new();
        BufReader::new(std::fs::File::open(path)?).read_to_end(&mut bytes)?;

        let snapshot = if bytes.starts_with(&[0x1f, 0x8b]) {
            serde_json::from_reader(GzDecoder::new(bytes.as_slice()))?
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(snapshot)
    }
}

impl Database {
    /// Build a snapshot of a project's tasks and, optionally, its answers.
    pub fn export_project(&self, project_id: i64, include_task_runs: bool) -> Result<ProjectSnapshot> {
        let project = self
            .get_project(project_id)?
            .ok_or_else(|| ApiError::project_not_found(project_id))?;
        let tasks = self.all_project_tasks(project_id)?;
        let task_runs = if include_task_runs {
            self.list_project_task_runs(project_id)?
        } else {
            Vec::new()
        };

        tracing::info!(
            project_id,
            tasks = tasks.len(),
            task_runs = task_runs.len(),
            "Project exported"
        );

        Ok(ProjectSnapshot {
            export_version: EXPORT_VERSION.to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            exported_by: format!("crowd-scheduler v{}", env!("CARGO_PKG_VERSION")),
            project,
            tasks,
            task_runs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewProject, NewTask, NewTaskRun};
    use serde_json::json;
    use tempfile::TempDir;

    fn populated() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let project = db
            .create_project(NewProject {
                short_name: "x".into(),
                name: "X".into(),
                allow_anonymous_contributors: true,
                info: None,
            })
            .unwrap();
        let task = db.create_task(project.id, NewTask::default()).unwrap();
        db.create_task(project.id, NewTask::default()).unwrap();
        db.submit_task_run(NewTaskRun {
            project_id: project.id,
            task_id: task.id,
            user_id: Some(1),
            user_ip: None,
            info: json!({"v": 1}),
        })
        .unwrap();
        (db, project.id)
    }

    #[test]
    fn export_can_exclude_task_runs() {
        let (db, pid) = populated();
        let full = db.export_project(pid, true).unwrap();
        assert_eq!(full.tasks.len(), 2);
        assert_eq!(full.task_runs.len(), 1);

        let tasks_only = db.export_project(pid, false).unwrap();
        assert!(tasks_only.task_runs.is_empty());
    }

    #[test]
    fn gzip_snapshot_reads_back() {
        let (db, pid) = populated();
        let snapshot = db.export_project(pid, true).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.json.gz");
        snapshot
            .write_to(std::fs::File::create(&path).unwrap(), true)
            .unwrap();

        let loaded = ProjectSnapshot::from_file(&path).unwrap();
        assert_eq!(loaded.project.short_name, "x");
        assert_eq!(loaded.task_runs[0].info, json!({"v": 1}));
    }

    #[test]
    fn export_unknown_project_fails() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.export_project(1, true).is_err());
    }
}
