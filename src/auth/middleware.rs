//! Authentication middleware that validates the session cookie and slides its expiry,
//! plus the extractor that restricts handlers to administrators.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use rusqlite::Connection;
use time::Duration;

use crate::{
    AppState, Error,
    auth::{
        User, UserID,
        cookie::{
            extend_auth_cookie_duration_if_needed, get_token_from_cookies, invalidate_auth_cookie,
        },
        get_user_by_id,
    },
    db::lock,
};

/// The state needed for the auth middleware
#[derive(Clone)]
pub struct AuthState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,
    /// How long a session lasts without activity.
    pub cookie_duration: Duration,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            cookie_duration: state.cookie_duration,
        }
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<AuthState> for Key {
    fn from_ref(state: &AuthState) -> Self {
        state.cookie_key.clone()
    }
}

/// Middleware function that checks for a valid, unexpired session cookie.
///
/// The user ID is placed into the request extensions and the request executed
/// normally, otherwise a 401 JSON error is returned and the cookie is cleared.
/// Every successful request pushes the session expiry forward by the session duration.
///
/// **Note**: Route handlers can use the function argument `Extension(user_id): Extension<UserID>` to receive the user ID.
pub async fn auth_guard(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let jar = match PrivateCookieJar::from_request_parts(&mut parts, &state).await {
        Ok(jar) => jar,
        Err(error) => {
            tracing::error!("Error getting cookie jar: {error:?}.");
            return Error::NotAuthenticated.into_response();
        }
    };

    let user_id = match get_token_from_cookies(&jar) {
        Ok(token) => token.user_id,
        Err(error) => return (invalidate_auth_cookie(jar), error).into_response(),
    };

    parts.extensions.insert(user_id);
    let request = Request::from_parts(parts, body);
    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    let jar = match extend_auth_cookie_duration_if_needed(jar.clone(), state.cookie_duration) {
        Ok(updated_jar) => updated_jar,
        Err(error) => {
            tracing::error!("Error extending cookie duration: {error}. Rolling back cookie jar.");
            jar
        }
    };
    for (key, val) in jar.into_response().headers().iter() {
        if key != SET_COOKIE {
            continue;
        }

        parts.headers.append(key, val.to_owned());
    }

    Response::from_parts(parts, body)
}

/// The state needed to look up the logged-in user.
#[derive(Debug, Clone)]
pub struct UserState {
    /// The database connection for looking up users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for UserState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Extracts the logged-in user and rejects the request unless they are an administrator.
///
/// Must be used on routes behind [auth_guard].
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl<S> FromRequestParts<S> for AdminUser
where
    UserState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .extensions
            .get::<UserID>()
            .copied()
            .ok_or(Error::NotAuthenticated)?;
        let state = UserState::from_ref(state);

        let connection = lock(&state.db_connection)?;
        let user = match get_user_by_id(user_id, &connection) {
            Ok(user) => user,
            Err(Error::NotFound) => return Err(Error::NotAuthenticated),
            Err(error) => return Err(error),
        };

        if !user.is_admin() {
            tracing::warn!("User {} tried to use an administrator route.", user.id);
            return Err(Error::AdminRequired);
        }

        Ok(AdminUser(user))
    }
}
