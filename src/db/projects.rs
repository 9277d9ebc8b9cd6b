//! Project CRUD.

use super::{Database, info_object, json_column, now_ms};
use crate::error::ApiError;
use crate::sched::SchedulingPolicy;
use crate::types::{NewProject, Project};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use tracing::info;

pub fn parse_project_row(row: &Row) -> rusqlite::Result<Project> {
    let info: String = row.get("info")?;
    Ok(Project {
        id: row.get("id")?,
        short_name: row.get("short_name")?,
        name: row.get("name")?,
        allow_anonymous_contributors: row.get("allow_anonymous_contributors")?,
        info: json_column(&info),
        created_at: row.get("created_at")?,
    })
}

/// Fetch a project using an existing connection.
pub(crate) fn get_project_internal(conn: &Connection, project_id: i64) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            "SELECT * FROM projects WHERE id = ?1",
            params![project_id],
            parse_project_row,
        )
        .optional()?;
    Ok(project)
}

impl Database {
    /// Create a new project. Short names are unique.
    pub fn create_project(&self, input: NewProject) -> Result<Project> {
        let short_name = input.short_name.trim().to_string();
        if short_name.is_empty() {
            return Err(ApiError::missing_field("short_name").into());
        }
        let name = if input.name.trim().is_empty() {
            short_name.clone()
        } else {
            input.name.trim().to_string()
        };
        let info = info_object(input.info, "info")?;
        let now = now_ms();

        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM projects WHERE short_name = ?1)",
                params![&short_name],
                |row| row.get(0),
            )?;
            if exists {
                return Err(ApiError::already_exists("Project", &short_name).into());
            }

            conn.execute(
                "INSERT INTO projects (short_name, name, allow_anonymous_contributors, info, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    &short_name,
                    &name,
                    input.allow_anonymous_contributors,
                    serde_json::to_string(&info)?,
                    now
                ],
            )?;
            let id = conn.last_insert_rowid();
            info!(project_id = id, short_name = %short_name, "Project created");

            Ok(Project {
                id,
                short_name,
                name,
                allow_anonymous_contributors: input.allow_anonymous_contributors,
                info,
                created_at: now,
            })
        })
    }

    /// Get a project by ID.
    pub fn get_project(&self, project_id: i64) -> Result<Option<Project>> {
        self.with_conn(|conn| get_project_internal(conn, project_id))
    }

    /// Get a project by its unique short name.
    pub fn get_project_by_short_name(&self, short_name: &str) -> Result<Option<Project>> {
        self.with_conn(|conn| {
            let project = conn
                .query_row(
                    "SELECT * FROM projects WHERE short_name = ?1",
                    params![short_name],
                    parse_project_row,
                )
                .optional()?;
            Ok(project)
        })
    }

    /// List all projects in creation order.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM projects ORDER BY id")?;
            let projects = stmt
                .query_map([], parse_project_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(projects)
        })
    }

    /// Store the scheduling policy in the project's `info.sched` key.
    pub fn set_project_policy(&self, project_id: i64, policy: SchedulingPolicy) -> Result<Project> {
        self.update_project_info(project_id, |info| {
            info.insert("sched".to_string(), Value::String(policy.as_str().to_string()));
        })
    }

    /// Allow or forbid anonymous contributions.
    pub fn set_allow_anonymous(&self, project_id: i64, allow: bool) -> Result<Project> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE projects SET allow_anonymous_contributors = ?1 WHERE id = ?2",
                params![allow, project_id],
            )?;
            if updated == 0 {
                return Err(ApiError::project_not_found(project_id).into());
            }
            info!(project_id, allow, "Anonymous contribution setting changed");
            get_project_internal(conn, project_id)?
                .ok_or_else(|| ApiError::project_not_found(project_id).into())
        })
    }

    fn update_project_info<F>(&self, project_id: i64, edit: F) -> Result<Project>
    where
        F: FnOnce(&mut serde_json::Map<String, Value>),
    {
        self.with_conn(|conn| {
            let mut project = get_project_internal(conn, project_id)?
                .ok_or_else(|| ApiError::project_not_found(project_id))?;

            let mut map = match project.info.take() {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            edit(&mut map);
            project.info = Value::Object(map);

            conn.execute(
                "UPDATE projects SET info = ?1 WHERE id = ?2",
                params![serde_json::to_string(&project.info)?, project_id],
            )?;
            Ok(project)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_project(short_name: &str) -> NewProject {
        NewProject {
            short_name: short_name.to_string(),
            name: String::new(),
            allow_anonymous_contributors: true,
            info: None,
        }
    }

    #[test]
    fn create_defaults_name_and_info() {
        let db = Database::open_in_memory().unwrap();
        let project = db.create_project(new_project("birds")).unwrap();
        assert_eq!(project.name, "birds");
        assert_eq!(project.info, serde_json::json!({}));
        assert!(project.allow_anonymous_contributors);
    }

    #[test]
    fn duplicate_short_name_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_project(new_project("birds")).unwrap();
        let err = db.create_project(new_project("birds")).unwrap_err();
        let api: ApiError = err.into();
        assert_eq!(api.code, crate::error::ErrorCode::AlreadyExists);
    }

    #[test]
    fn set_policy_preserves_other_info_keys() {
        let db = Database::open_in_memory().unwrap();
        let mut input = new_project("birds");
        input.info = Some(serde_json::json!({"thumbnail": "x.png"}));
        let project = db.create_project(input).unwrap();

        let updated = db
            .set_project_policy(project.id, SchedulingPolicy::BreadthFirst)
            .unwrap();
        assert_eq!(updated.info["sched"], "breadth_first");
        assert_eq!(updated.info["thumbnail"], "x.png");

        let reloaded = db.get_project(project.id).unwrap().unwrap();
        assert_eq!(reloaded.info, updated.info);
    }

    #[test]
    fn set_allow_anonymous_on_missing_project_fails() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.set_allow_anonymous(99, false).is_err());
    }
}
