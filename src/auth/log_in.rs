//! Handles log-in requests.
//!
//! A successful log-in opens a session cache and runs the recurrence engine, so
//! recurring charges for the current month appear as soon as someone logs in.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    AppState, Error, SessionCache, SqliteGateway,
    activity::{Action, log_activity},
    auth::{User, UserView, get_user_by_email, set_auth_cookie},
    db::lock,
    timezone::local_today,
    transaction::Summary,
};

/// The state needed to perform a login.
#[derive(Debug, Clone)]
pub struct LoginState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,
    /// How long a session lasts without activity.
    pub cookie_duration: Duration,
    /// The local timezone as a canonical timezone name, e.g. "Europe/Paris".
    pub local_timezone: String,
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for LoginState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            cookie_duration: state.cookie_duration,
            local_timezone: state.local_timezone.clone(),
            db_connection: state.db_connection.clone(),
        }
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<LoginState> for Key {
    fn from_ref(state: &LoginState) -> Self {
        state.cookie_key.clone()
    }
}

/// The credentials sent by the log-in form.
#[derive(Clone, Serialize, Deserialize)]
pub struct LogInData {
    /// Email entered during log-in.
    pub email: String,
    /// Password entered during log-in.
    pub password: String,
}

/// The response to a successful log-in.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogInResponse {
    /// The logged-in user.
    pub user: UserView,
    /// The running sums after recurring charges were applied, or `None` if the
    /// books could not be loaded.
    pub summary: Option<Summary>,
    /// How many transactions the recurrence engine created during this log-in.
    pub materialized: usize,
}

/// Handler for log-in requests.
///
/// On success the auth cookie is set and the response carries the user and a
/// summary of the books. Recurrence failures are only logged, they never fail
/// the log-in.
pub async fn post_log_in(
    State(state): State<LoginState>,
    jar: PrivateCookieJar,
    Json(credentials): Json<LogInData>,
) -> Response {
    let user = match authenticate(&credentials, &state.db_connection) {
        Ok(user) => user,
        Err(error) => return error.into_response(),
    };

    let jar = match set_auth_cookie(jar, user.id, state.cookie_duration) {
        Ok(jar) => jar,
        Err(error) => {
            tracing::error!("Error setting auth cookie: {error}");
            return error.into_response();
        }
    };

    let (summary, materialized) = open_session(&state).await;

    (
        jar,
        Json(LogInResponse {
            user: UserView::from(&user),
            summary,
            materialized,
        }),
    )
        .into_response()
}

fn authenticate(credentials: &LogInData, db_connection: &Mutex<Connection>) -> Result<User, Error> {
    let connection = lock(db_connection)?;

    let user = match get_user_by_email(&credentials.email, &connection) {
        Ok(user) => user,
        Err(Error::NotFound) => return Err(Error::InvalidCredentials),
        Err(error) => return Err(error),
    };

    let is_password_valid = user.password_hash.verify(&credentials.password).map_err(|error| {
        tracing::error!("Unhandled error while verifying credentials: {error}");
        Error::HashingError(error.to_string())
    })?;

    if !is_password_valid {
        return Err(Error::InvalidCredentials);
    }

    log_activity(user.id, Action::LogIn, &user.email, &connection);

    Ok(user)
}

/// Load the books into a session cache and apply the recurring rules due this month.
async fn open_session(state: &LoginState) -> (Option<Summary>, usize) {
    let today = match local_today(&state.local_timezone) {
        Ok(today) => today,
        Err(error) => {
            tracing::error!("Could not apply recurring rules: {error}");
            return (None, 0);
        }
    };

    let gateway = SqliteGateway::new(state.db_connection.clone());
    let mut session = match SessionCache::load(gateway).await {
        Ok(session) => session,
        Err(error) => {
            tracing::error!("Could not load the session cache: {error}");
            return (None, 0);
        }
    };

    let report = session.sync_recurring(today).await;

    (Some(session.summary()), report.materialized_count())
}
