//! An append-only log of who changed what, readable by administrators.

use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Json,
    extract::{FromRef, Query, State},
};
use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{AppState, Error, UserID, auth::AdminUser, db::lock};

/// What a user did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Logged in.
    LogIn,
    /// Created a user.
    CreateUser,
    /// Created a category.
    CreateCategory,
    /// Recorded a transaction.
    CreateTransaction,
    /// Deleted a transaction.
    DeleteTransaction,
    /// Created a recurring rule.
    CreateRecurringRule,
    /// Changed a recurring rule.
    UpdateRecurringRule,
    /// Deleted a recurring rule.
    DeleteRecurringRule,
    /// Created a project.
    CreateProject,
    /// Changed a project.
    UpdateProject,
    /// Deleted a project.
    DeleteProject,
    /// Submitted an idea.
    CreateIdea,
    /// Deleted an idea.
    DeleteIdea,
    /// Voted for an idea or withdrew the vote.
    ToggleVote,
}

impl Action {
    /// The name stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::LogIn => "log_in",
            Action::CreateUser => "create_user",
            Action::CreateCategory => "create_category",
            Action::CreateTransaction => "create_transaction",
            Action::DeleteTransaction => "delete_transaction",
            Action::CreateRecurringRule => "create_recurring_rule",
            Action::UpdateRecurringRule => "update_recurring_rule",
            Action::DeleteRecurringRule => "delete_recurring_rule",
            Action::CreateProject => "create_project",
            Action::UpdateProject => "update_project",
            Action::DeleteProject => "delete_project",
            Action::CreateIdea => "create_idea",
            Action::DeleteIdea => "delete_idea",
            Action::ToggleVote => "toggle_vote",
        }
    }

    const ALL: [Action; 14] = [
        Action::LogIn,
        Action::CreateUser,
        Action::CreateCategory,
        Action::CreateTransaction,
        Action::DeleteTransaction,
        Action::CreateRecurringRule,
        Action::UpdateRecurringRule,
        Action::DeleteRecurringRule,
        Action::CreateProject,
        Action::UpdateProject,
        Action::DeleteProject,
        Action::CreateIdea,
        Action::DeleteIdea,
        Action::ToggleVote,
    ];
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("unknown action \"{s}\""))
    }
}

impl ToSql for Action {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Action {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// The user who acted.
    pub user_id: UserID,
    /// The user's display name at the time the log is read.
    pub user_name: String,
    /// What they did.
    pub action: Action,
    /// A short human readable description, e.g. the transaction description.
    pub detail: String,
    /// When it happened.
    pub occurred_at: OffsetDateTime,
}

/// Create the activity table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_activity_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS activity (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                detail TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
                )",
        (),
    )?;

    Ok(())
}

/// Append an entry to the activity log.
///
/// The log is informational, so a failure is logged and otherwise ignored.
pub fn log_activity(user_id: UserID, action: Action, detail: &str, connection: &Connection) {
    let result = connection.execute(
        "INSERT INTO activity (user_id, action, detail, occurred_at) VALUES (?1, ?2, ?3, ?4)",
        (user_id.as_i64(), action, detail, OffsetDateTime::now_utc()),
    );

    if let Err(error) = result {
        tracing::error!("Could not record activity {action} for user {user_id}: {error}");
    }
}

/// Get the `limit` most recent entries, newest first.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn get_recent_activity(limit: u32, connection: &Connection) -> Result<Vec<ActivityEntry>, Error> {
    connection
        .prepare(
            "SELECT activity.user_id, user.name, activity.action, activity.detail, activity.occurred_at
             FROM activity
             INNER JOIN user ON user.id = activity.user_id
             ORDER BY activity.id DESC
             LIMIT ?1",
        )?
        .query_map([limit], map_activity_row)?
        .map(|maybe_entry| maybe_entry.map_err(|error| error.into()))
        .collect()
}

fn map_activity_row(row: &Row) -> Result<ActivityEntry, rusqlite::Error> {
    Ok(ActivityEntry {
        user_id: UserID::new(row.get(0)?),
        user_name: row.get(1)?,
        action: row.get(2)?,
        detail: row.get(3)?,
        occurred_at: row.get(4)?,
    })
}

/// The state needed to read the activity log.
#[derive(Debug, Clone)]
pub struct ActivityState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ActivityState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

const DEFAULT_ACTIVITY_LIMIT: u32 = 50;
const MAX_ACTIVITY_LIMIT: u32 = 500;

/// Query parameters for the activity log.
#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    /// How many entries to return, 50 by default and 500 at most.
    pub limit: Option<u32>,
}

/// Route handler for the activity log. Administrators only.
pub async fn get_activity_endpoint(
    State(state): State<ActivityState>,
    _admin: AdminUser,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityEntry>>, Error> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(MAX_ACTIVITY_LIMIT);
    let connection = lock(&state.db_connection)?;

    get_recent_activity(limit, &connection).map(Json)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use axum::http::StatusCode;
    use axum_test::TestServer;

    use crate::{
        auth::Role,
        build_router, endpoints,
        test_utils::{create_test_user, get_test_app_state, log_in},
    };

    use super::{Action, ActivityEntry, get_recent_activity, log_activity};

    #[test]
    fn action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_str(action.as_str()), Ok(action));
        }
    }

    #[test]
    fn recent_activity_is_newest_first_and_limited() {
        let state = get_test_app_state();
        let user = create_test_user(&state, "admin@csrp.fr", Role::Admin);
        let connection = state.db_connection.lock().unwrap();

        log_activity(user.id, Action::CreateIdea, "first", &connection);
        log_activity(user.id, Action::DeleteIdea, "second", &connection);
        log_activity(user.id, Action::ToggleVote, "third", &connection);

        let entries = get_recent_activity(2, &connection).unwrap();
        let details: Vec<_> = entries.iter().map(|entry| entry.detail.as_str()).collect();
        assert_eq!(details, ["third", "second"]);
        assert_eq!(entries[0].user_name, user.name);
    }

    #[tokio::test]
    async fn log_in_is_recorded() {
        let state = get_test_app_state();
        create_test_user(&state, "admin@csrp.fr", Role::Admin);
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "admin@csrp.fr").await;

        let entries: Vec<ActivityEntry> =
            server.get(endpoints::ACTIVITY).add_cookie(token).await.json();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, Action::LogIn);
    }

    #[tokio::test]
    async fn members_cannot_read_activity() {
        let state = get_test_app_state();
        create_test_user(&state, "camille@example.org", Role::Member);
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "camille@example.org").await;

        server
            .get(endpoints::ACTIVITY)
            .add_cookie(token)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
