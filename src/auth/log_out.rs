//! Ends the session by invalidating the auth cookie.

use axum::{http::StatusCode, response::IntoResponse};
use axum_extra::extract::PrivateCookieJar;

use crate::auth::invalidate_auth_cookie;

/// Invalidate the auth cookie. Logging out twice is not an error.
pub async fn get_log_out(jar: PrivateCookieJar) -> impl IntoResponse {
    (StatusCode::NO_CONTENT, invalidate_auth_cookie(jar))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;

    use crate::{
        auth::{COOKIE_TOKEN, Role},
        build_router, endpoints,
        test_utils::{create_test_user, get_test_app_state, log_in},
    };

    #[tokio::test]
    async fn log_out_invalidates_session() {
        let state = get_test_app_state();
        create_test_user(&state, "camille@example.org", Role::Member);
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "camille@example.org").await;

        let response = server.get(endpoints::LOG_OUT).add_cookie(token).await;

        response.assert_status(StatusCode::NO_CONTENT);
        let cookie = response.cookie(COOKIE_TOKEN);
        server
            .get(endpoints::DASHBOARD)
            .add_cookie(cookie)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
