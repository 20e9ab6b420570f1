//! Per-user dashboard preferences.
//!
//! Only the light/dark choice is stored. The response carries the matching
//! palette so clients do not need their own copy of the colours.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::{AppState, Error, UserID, db::lock};

/// The colours of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    /// Accent colour for buttons and highlights.
    pub primary: &'static str,
    /// Page background.
    pub bg: &'static str,
    /// Card background.
    pub card: &'static str,
    /// Sidebar background.
    pub sidebar: &'static str,
    /// Header background, a CSS gradient.
    pub header: &'static str,
    /// Input background.
    pub input: &'static str,
    /// Main text.
    pub text: &'static str,
    /// Secondary text.
    pub text_sec: &'static str,
    /// Muted text.
    pub text_mut: &'static str,
    /// Borders.
    pub border: &'static str,
}

const HEADER_GRADIENT: &str = "linear-gradient(135deg, #7c3238 0%, #5c2428 100%)";

/// The default palette.
pub const LIGHT_THEME: Theme = Theme {
    primary: "#7c3238",
    bg: "#f8fafc",
    card: "#ffffff",
    sidebar: "#ffffff",
    header: HEADER_GRADIENT,
    input: "#f1f5f9",
    text: "#1f2937",
    text_sec: "#4b5563",
    text_mut: "#9ca3af",
    border: "#e5e7eb",
};

/// The palette used in dark mode.
pub const DARK_THEME: Theme = Theme {
    primary: "#9a3c44",
    bg: "#0f172a",
    card: "#1e293b",
    sidebar: "#1e293b",
    header: HEADER_GRADIENT,
    input: "#334155",
    text: "#f1f5f9",
    text_sec: "#94a3b8",
    text_mut: "#64748b",
    border: "#334155",
};

/// A user's preferences and the palette they imply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preferences {
    /// Whether the dashboard uses the dark palette.
    pub dark_mode: bool,
    /// The palette to use.
    pub theme: Theme,
}

impl Preferences {
    fn new(dark_mode: bool) -> Self {
        Self {
            dark_mode,
            theme: if dark_mode { DARK_THEME } else { LIGHT_THEME },
        }
    }
}

/// The data sent to change preferences.
#[derive(Debug, Clone, Deserialize)]
pub struct PreferencesForm {
    /// Whether to use the dark palette.
    pub dark_mode: bool,
}

/// Create the preferences table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_preferences_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS preferences (
            user_id INTEGER PRIMARY KEY,
            dark_mode INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

/// Whether `user_id` chose dark mode. Users who never chose get light mode.
///
/// # Errors
/// Returns [Error::SqlError] if the query fails.
pub fn get_dark_mode(user_id: UserID, connection: &Connection) -> Result<bool, Error> {
    let dark_mode = connection
        .query_row(
            "SELECT dark_mode FROM preferences WHERE user_id = ?1",
            [user_id.as_i64()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(dark_mode.unwrap_or(false))
}

/// Save the dark mode choice of `user_id`.
///
/// # Errors
/// Returns [Error::SqlError] if the query fails.
pub fn save_dark_mode(
    user_id: UserID,
    dark_mode: bool,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO preferences (user_id, dark_mode) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET dark_mode = excluded.dark_mode",
        (user_id.as_i64(), dark_mode),
    )?;

    Ok(())
}

/// The state needed to read and save preferences.
#[derive(Debug, Clone)]
pub struct PreferencesState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for PreferencesState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Route handler returning the logged-in user's preferences.
pub async fn get_preferences_endpoint(
    State(state): State<PreferencesState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Preferences>, Error> {
    let connection = lock(&state.db_connection)?;
    let dark_mode = get_dark_mode(user_id, &connection)?;

    Ok(Json(Preferences::new(dark_mode)))
}

/// Route handler saving the logged-in user's preferences.
pub async fn update_preferences_endpoint(
    State(state): State<PreferencesState>,
    Extension(user_id): Extension<UserID>,
    Json(form): Json<PreferencesForm>,
) -> Result<Json<Preferences>, Error> {
    let connection = lock(&state.db_connection)?;
    save_dark_mode(user_id, form.dark_mode, &connection)?;

    Ok(Json(Preferences::new(form.dark_mode)))
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::{
        auth::Role,
        build_router, endpoints,
        test_utils::{create_test_user, get_test_app_state, log_in},
    };

    use super::{get_dark_mode, save_dark_mode};

    #[test]
    fn users_default_to_light_mode() {
        let state = get_test_app_state();
        let user = create_test_user(&state, "camille@example.org", Role::Member);
        let connection = state.db_connection.lock().unwrap();

        assert!(!get_dark_mode(user.id, &connection).unwrap());
    }

    #[test]
    fn saving_twice_keeps_the_latest_choice() {
        let state = get_test_app_state();
        let user = create_test_user(&state, "camille@example.org", Role::Member);
        let connection = state.db_connection.lock().unwrap();

        save_dark_mode(user.id, true, &connection).unwrap();
        save_dark_mode(user.id, false, &connection).unwrap();

        assert!(!get_dark_mode(user.id, &connection).unwrap());
    }

    #[tokio::test]
    async fn dark_mode_switches_the_palette() {
        let state = get_test_app_state();
        create_test_user(&state, "camille@example.org", Role::Member);
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "camille@example.org").await;

        let light: Value = server
            .get(endpoints::PREFERENCES)
            .add_cookie(token.clone())
            .await
            .json();
        assert_eq!(light["dark_mode"], false);
        assert_eq!(light["theme"]["bg"], "#f8fafc");

        server
            .put(endpoints::PREFERENCES)
            .add_cookie(token.clone())
            .json(&json!({ "dark_mode": true }))
            .await
            .assert_status_ok();

        let dark: Value = server
            .get(endpoints::PREFERENCES)
            .add_cookie(token)
            .await
            .json();
        assert_eq!(dark["dark_mode"], true);
        assert_eq!(dark["theme"]["bg"], "#0f172a");
        assert_eq!(dark["theme"]["textSec"], "#94a3b8");
    }
}
