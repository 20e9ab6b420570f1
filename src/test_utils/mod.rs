#![allow(missing_docs)]

mod fake_gateway;

use axum_extra::extract::cookie::{Cookie, Key};
use axum_test::TestServer;
use rusqlite::Connection;
use serde_json::json;

use crate::{
    AppState,
    app_state::create_cookie_key,
    auth::{COOKIE_TOKEN, NewUser, PasswordHash, Role, User, create_user},
    endpoints,
};

pub(crate) use fake_gateway::FakeGateway;

/// The password of every user made by [create_test_user].
pub(crate) const TEST_PASSWORD: &str = "correct horse battery staple";

pub(crate) fn test_cookie_key() -> Key {
    create_cookie_key("a test secret that is not used anywhere else")
}

/// An [AppState] over a fresh in-memory database in UTC.
pub(crate) fn get_test_app_state() -> AppState {
    let db_connection = Connection::open_in_memory().expect("Could not open database in memory.");

    AppState::new(db_connection, "foobar", "Etc/UTC").expect("Could not create app state.")
}

/// Insert a user with [TEST_PASSWORD]. The hash uses the lowest bcrypt cost to keep tests fast.
#[track_caller]
pub(crate) fn create_test_user(state: &AppState, email: &str, role: Role) -> User {
    let connection = state.db_connection.lock().unwrap();

    create_user(
        NewUser {
            name: email.split('@').next().unwrap_or(email).to_owned(),
            email: email.to_owned(),
            password_hash: PasswordHash::from_raw_password(TEST_PASSWORD, 4).unwrap(),
            role,
        },
        &connection,
    )
    .expect("Could not create test user.")
}

/// Log in as `email` and return the session cookie.
pub(crate) async fn log_in(server: &TestServer, email: &str) -> Cookie<'static> {
    let response = server
        .post(endpoints::LOG_IN)
        .json(&json!({ "email": email, "password": TEST_PASSWORD }))
        .await;

    response.assert_status_ok();
    response.cookie(COOKIE_TOKEN)
}
