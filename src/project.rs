//! The association's projects and where they stand.

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    activity::{Action, log_activity},
    auth::AdminUser,
    database_id::ProjectId,
    db::lock,
};

/// Where a project stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Still an idea being discussed.
    Planning,
    /// Work has started.
    InProgress,
    /// Done.
    Completed,
    /// Given up.
    Abandoned,
}

impl ProjectStatus {
    /// Every status, in the order shown on the dashboard.
    pub const ALL: [ProjectStatus; 4] = [
        ProjectStatus::Planning,
        ProjectStatus::InProgress,
        ProjectStatus::Completed,
        ProjectStatus::Abandoned,
    ];

    /// The name stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Abandoned => "abandoned",
        }
    }

    /// The label shown to members.
    pub fn label(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "En réflexion",
            ProjectStatus::InProgress => "En cours",
            ProjectStatus::Completed => "Terminé",
            ProjectStatus::Abandoned => "Abandonné",
        }
    }

    /// The badge colour.
    pub fn color(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "#f59e0b",
            ProjectStatus::InProgress => "#3b82f6",
            ProjectStatus::Completed => "#10b981",
            ProjectStatus::Abandoned => "#6b7280",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown project status \"{s}\""))
    }
}

impl ToSql for ProjectStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ProjectStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

/// Something the association works on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// The ID of the project.
    pub id: ProjectId,
    /// A short name.
    pub name: String,
    /// What the project is about.
    pub description: String,
    /// Where the project stands.
    pub status: ProjectStatus,
    /// The money set aside, if any.
    pub budget: Option<f64>,
    /// When the project was created.
    pub created_at: OffsetDateTime,
}

/// A project as returned by the API, with the status label and colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectView {
    /// The project.
    #[serde(flatten)]
    pub project: Project,
    /// The status label, e.g. "En cours".
    pub status_label: String,
    /// The status badge colour.
    pub status_color: String,
}

impl From<Project> for ProjectView {
    fn from(project: Project) -> Self {
        Self {
            status_label: project.status.label().to_owned(),
            status_color: project.status.color().to_owned(),
            project,
        }
    }
}

/// The data sent to create a project.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    /// A short name.
    pub name: String,
    /// What the project is about.
    #[serde(default)]
    pub description: String,
    /// Defaults to [ProjectStatus::Planning].
    pub status: Option<ProjectStatus>,
    /// The money set aside, if any.
    pub budget: Option<f64>,
}

/// Changes to a project. Missing fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPatch {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<ProjectStatus>,
    /// New budget.
    pub budget: Option<f64>,
}

fn validate_budget(budget: Option<f64>) -> Result<(), Error> {
    match budget {
        Some(amount) if !amount.is_finite() || amount < 0.0 => Err(Error::InvalidAmount(amount)),
        _ => Ok(()),
    }
}

/// Create the project table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_project_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS project (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                budget REAL,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Create a project.
///
/// # Errors
/// Returns [Error::EmptyField] for a blank name, [Error::InvalidAmount] for a
/// negative budget, or [Error::SqlError].
pub fn create_project(new_project: NewProject, connection: &Connection) -> Result<Project, Error> {
    let name = new_project.name.trim();
    if name.is_empty() {
        return Err(Error::EmptyField("name"));
    }
    validate_budget(new_project.budget)?;

    connection
        .prepare(
            "INSERT INTO project (name, description, status, budget, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, name, description, status, budget, created_at",
        )?
        .query_row(
            (
                name,
                new_project.description.trim(),
                new_project.status.unwrap_or(ProjectStatus::Planning),
                new_project.budget,
                OffsetDateTime::now_utc(),
            ),
            map_project_row,
        )
        .map_err(|error| error.into())
}

/// Get all projects, newest first.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn get_all_projects(connection: &Connection) -> Result<Vec<Project>, Error> {
    connection
        .prepare(
            "SELECT id, name, description, status, budget, created_at FROM project ORDER BY id DESC",
        )?
        .query_map([], map_project_row)?
        .map(|maybe_project| maybe_project.map_err(|error| error.into()))
        .collect()
}

/// Apply `patch` to the project with `id`.
///
/// # Errors
/// Returns [Error::UpdateMissingProject] if there is no such project, or a
/// validation error for a blank name or negative budget.
pub fn update_project(
    id: ProjectId,
    patch: ProjectPatch,
    connection: &Connection,
) -> Result<Project, Error> {
    if patch.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(Error::EmptyField("name"));
    }
    validate_budget(patch.budget)?;

    connection
        .prepare(
            "UPDATE project SET
                name = COALESCE(?1, name),
                description = COALESCE(?2, description),
                status = COALESCE(?3, status),
                budget = COALESCE(?4, budget)
             WHERE id = ?5
             RETURNING id, name, description, status, budget, created_at",
        )?
        .query_row(
            (
                patch.name.as_deref().map(str::trim),
                patch.description.as_deref().map(str::trim),
                patch.status,
                patch.budget,
                id,
            ),
            map_project_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingProject,
            error => error.into(),
        })
}

/// Delete the project with `id`.
///
/// # Errors
/// Returns [Error::DeleteMissingProject] if there is no such project.
pub fn delete_project(id: ProjectId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM project WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingProject);
    }

    Ok(())
}

/// How many projects have a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    /// The status.
    pub status: ProjectStatus,
    /// The status label.
    pub label: String,
    /// The status colour.
    pub color: String,
    /// The number of projects.
    pub count: u32,
}

/// Count the projects of every status, including statuses with no projects.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn count_projects_by_status(connection: &Connection) -> Result<Vec<StatusCount>, Error> {
    let mut statement = connection.prepare("SELECT COUNT(id) FROM project WHERE status = ?1")?;

    ProjectStatus::ALL
        .into_iter()
        .map(|status| {
            let count = statement.query_row([status], |row| row.get(0))?;

            Ok(StatusCount {
                status,
                label: status.label().to_owned(),
                color: status.color().to_owned(),
                count,
            })
        })
        .collect()
}

fn map_project_row(row: &Row) -> Result<Project, rusqlite::Error> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        budget: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// The state needed by the project routes.
#[derive(Debug, Clone)]
pub struct ProjectState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ProjectState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Route handler listing projects.
pub async fn list_projects_endpoint(
    State(state): State<ProjectState>,
) -> Result<Json<Vec<ProjectView>>, Error> {
    let connection = lock(&state.db_connection)?;
    let projects = get_all_projects(&connection)?;

    Ok(Json(projects.into_iter().map(ProjectView::from).collect()))
}

/// Route handler for creating a project. Administrators only.
pub async fn create_project_endpoint(
    State(state): State<ProjectState>,
    AdminUser(admin): AdminUser,
    Json(new_project): Json<NewProject>,
) -> Result<Response, Error> {
    let connection = lock(&state.db_connection)?;
    let project = create_project(new_project, &connection)?;

    log_activity(admin.id, Action::CreateProject, &project.name, &connection);

    Ok((StatusCode::CREATED, Json(ProjectView::from(project))).into_response())
}

/// Route handler for changing a project, e.g. its status. Administrators only.
pub async fn update_project_endpoint(
    State(state): State<ProjectState>,
    AdminUser(admin): AdminUser,
    Path(project_id): Path<ProjectId>,
    Json(patch): Json<ProjectPatch>,
) -> Result<Json<ProjectView>, Error> {
    let connection = lock(&state.db_connection)?;
    let project = update_project(project_id, patch, &connection)?;

    log_activity(
        admin.id,
        Action::UpdateProject,
        &format!("{}: {}", project.name, project.status.label()),
        &connection,
    );

    Ok(Json(ProjectView::from(project)))
}

/// Route handler for deleting a project. Administrators only.
pub async fn delete_project_endpoint(
    State(state): State<ProjectState>,
    AdminUser(admin): AdminUser,
    Path(project_id): Path<ProjectId>,
) -> Result<StatusCode, Error> {
    let connection = lock(&state.db_connection)?;
    delete_project(project_id, &connection)?;

    log_activity(
        admin.id,
        Action::DeleteProject,
        &format!("project {project_id}"),
        &connection,
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::json;

    use crate::{
        Error,
        auth::Role,
        build_router,
        db::initialize,
        endpoints::{self, format_endpoint},
        test_utils::{create_test_user, get_test_app_state, log_in},
    };

    use super::{
        NewProject, ProjectPatch, ProjectStatus, ProjectView, count_projects_by_status,
        create_project, delete_project, update_project,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn new_project(name: &str) -> NewProject {
        NewProject {
            name: name.to_owned(),
            description: "Un serveur de jeu".to_owned(),
            status: None,
            budget: Some(300.0),
        }
    }

    #[test]
    fn new_projects_start_in_planning() {
        let conn = get_test_connection();

        let project = create_project(new_project("Serveur Minecraft"), &conn).unwrap();

        assert_eq!(project.status, ProjectStatus::Planning);
        assert_eq!(project.budget, Some(300.0));
    }

    #[test]
    fn update_changes_only_given_fields() {
        let conn = get_test_connection();
        let project = create_project(new_project("Serveur Minecraft"), &conn).unwrap();

        let updated = update_project(
            project.id,
            ProjectPatch {
                status: Some(ProjectStatus::InProgress),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();

        assert_eq!(updated.status, ProjectStatus::InProgress);
        assert_eq!(updated.name, project.name);
        assert_eq!(updated.budget, project.budget);
    }

    #[test]
    fn missing_projects_are_reported() {
        let conn = get_test_connection();

        assert_eq!(
            update_project(7, ProjectPatch::default(), &conn),
            Err(Error::UpdateMissingProject)
        );
        assert_eq!(delete_project(7, &conn), Err(Error::DeleteMissingProject));
    }

    #[test]
    fn counts_include_empty_statuses() {
        let conn = get_test_connection();
        create_project(new_project("A"), &conn).unwrap();
        create_project(new_project("B"), &conn).unwrap();

        let counts: Vec<_> = count_projects_by_status(&conn)
            .unwrap()
            .into_iter()
            .map(|count| (count.status, count.count))
            .collect();

        assert_eq!(
            counts,
            vec![
                (ProjectStatus::Planning, 2),
                (ProjectStatus::InProgress, 0),
                (ProjectStatus::Completed, 0),
                (ProjectStatus::Abandoned, 0),
            ]
        );
    }

    #[tokio::test]
    async fn admin_moves_project_through_statuses() {
        let state = get_test_app_state();
        create_test_user(&state, "admin@csrp.fr", Role::Admin);
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "admin@csrp.fr").await;

        let response = server
            .post(endpoints::PROJECTS)
            .add_cookie(token.clone())
            .json(&json!({ "name": "Serveur Minecraft" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: ProjectView = response.json();
        assert_eq!(created.status_label, "En réflexion");

        let updated: ProjectView = server
            .put(&format_endpoint(endpoints::PROJECT, created.project.id))
            .add_cookie(token)
            .json(&json!({ "status": "completed" }))
            .await
            .json();

        assert_eq!(updated.project.status, ProjectStatus::Completed);
        assert_eq!(updated.status_label, "Terminé");
        assert_eq!(updated.status_color, "#10b981");
    }

    #[tokio::test]
    async fn members_cannot_create_projects() {
        let state = get_test_app_state();
        create_test_user(&state, "camille@example.org", Role::Member);
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "camille@example.org").await;

        server
            .post(endpoints::PROJECTS)
            .add_cookie(token)
            .json(&json!({ "name": "Serveur Minecraft" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
