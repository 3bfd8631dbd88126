use agentscope_core::error::{AgentscopeError, Result};
use agentscope_core::ids::validate_project_id;
use agentscope_core::model::Project;
use chrono::NaiveDateTime;
use duckdb::{Connection, params};

use crate::Store;
use crate::db::{naive_to_utc, ts_param};

impl Store {
    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        fetch_project(&conn, id)
    }

    pub fn insert_project(&self, project: &Project) -> Result<()> {
        validate_project_id(&project.id)?;
        let conn = self.conn();
        if fetch_project(&conn, &project.id)?.is_some() {
            return Err(AgentscopeError::InvalidArgument(format!(
                "project already exists: {}",
                project.id
            )));
        }
        write_project(&conn, project)
    }

    /// Checks `secret` against the project's key. An unseen project id is
    /// provisioned on the spot with `secret` as its key.
    pub fn authorize(&self, project_id: &str, secret: &str) -> Result<Project> {
        validate_project_id(project_id)?;
        if secret.is_empty() {
            return Err(AgentscopeError::Unauthorized("missing API key".to_string()));
        }

        let conn = self.conn();
        match fetch_project(&conn, project_id)? {
            Some(project) if project.accepts(secret) => Ok(project),
            Some(_) => Err(AgentscopeError::Unauthorized("invalid API key".to_string())),
            None => {
                let project = Project::provisioned(project_id, secret);
                write_project(&conn, &project)?;
                tracing::info!(project_id = %project.id, "provisioned project on first submission");
                Ok(project)
            }
        }
    }
}

fn fetch_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    let mut stmt = conn
        .prepare("SELECT id, name, api_key, created_at FROM projects WHERE id = ?")
        .map_err(|e| AgentscopeError::Store(format!("prepare project failed: {e}")))?;
    let mut rows = stmt
        .query_map(params![id], |row| {
            Ok(Project {
                id: row.get::<_, String>(0)?,
                name: row.get::<_, String>(1)?,
                api_key: row.get::<_, String>(2)?,
                created_at: naive_to_utc(row.get::<_, NaiveDateTime>(3)?),
            })
        })
        .map_err(|e| AgentscopeError::Store(format!("query project failed: {e}")))?;

    rows.next()
        .transpose()
        .map_err(|e| AgentscopeError::Store(format!("map project row failed: {e}")))
}

fn write_project(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        "INSERT INTO projects (id, name, api_key, created_at) VALUES (?, ?, ?, ?)",
        params![
            project.id,
            project.name,
            project.api_key,
            ts_param(project.created_at)
        ],
    )
    .map(|_| ())
    .map_err(|e| AgentscopeError::Store(format!("insert project failed: {e}")))
}
