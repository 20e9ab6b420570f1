//! Administrators register new members and list existing ones.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    Error,
    activity::{Action, log_activity},
    auth::{
        AdminUser, NewUser, PasswordHash, Role, UserState, UserView, create_user,
        user::get_all_users,
    },
    db::lock,
};

/// The data sent to create a user.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    /// The display name.
    pub name: String,
    /// The email used to log in.
    pub email: String,
    /// The raw password, checked for strength before hashing.
    pub password: String,
    /// Defaults to [Role::Member].
    pub role: Option<Role>,
}

/// Route handler for creating a user. Administrators only.
pub async fn create_user_endpoint(
    State(state): State<UserState>,
    AdminUser(admin): AdminUser,
    Json(form): Json<RegisterForm>,
) -> Result<Response, Error> {
    let password_hash = PasswordHash::from_raw_password(&form.password, PasswordHash::DEFAULT_COST)?;

    let connection = lock(&state.db_connection)?;
    let user = create_user(
        NewUser {
            name: form.name,
            email: form.email,
            password_hash,
            role: form.role.unwrap_or(Role::Member),
        },
        &connection,
    )?;

    log_activity(admin.id, Action::CreateUser, &user.email, &connection);

    Ok((StatusCode::CREATED, Json(UserView::from(&user))).into_response())
}

/// Route handler listing all users. Administrators only.
pub async fn list_users_endpoint(
    State(state): State<UserState>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserView>>, Error> {
    let connection = lock(&state.db_connection)?;
    let users = get_all_users(&connection)?;

    Ok(Json(users.iter().map(UserView::from).collect()))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;

    use crate::{
        auth::{Role, UserView},
        build_router, endpoints,
        test_utils::{create_test_user, get_test_app_state, log_in},
    };

    #[tokio::test]
    async fn admin_can_create_member() {
        let state = get_test_app_state();
        create_test_user(&state, "admin@csrp.fr", Role::Admin);
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "admin@csrp.fr").await;

        let response = server
            .post(endpoints::USERS)
            .add_cookie(token.clone())
            .json(&json!({
                "name": "Dominique",
                "email": "dominique@csrp.fr",
                "password": "correct horse battery staple",
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let user: UserView = response.json();
        assert_eq!(user.role, Role::Member);

        let users: Vec<UserView> = server.get(endpoints::USERS).add_cookie(token).await.json();
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn weak_password_is_rejected() {
        let state = get_test_app_state();
        create_test_user(&state, "admin@csrp.fr", Role::Admin);
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "admin@csrp.fr").await;

        server
            .post(endpoints::USERS)
            .add_cookie(token)
            .json(&json!({
                "name": "Dominique",
                "email": "dominique@csrp.fr",
                "password": "admin123",
            }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn members_cannot_list_users() {
        let state = get_test_app_state();
        create_test_user(&state, "camille@example.org", Role::Member);
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "camille@example.org").await;

        server
            .get(endpoints::USERS)
            .add_cookie(token)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
