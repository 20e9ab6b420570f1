//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde_json::json;

use crate::{
    AppState,
    activity::get_activity_endpoint,
    auth::{auth_guard, create_user_endpoint, get_log_out, list_users_endpoint, post_log_in},
    category::{create_category_endpoint, list_categories_endpoint},
    dashboard::get_dashboard_endpoint,
    endpoints,
    idea::{
        create_idea_endpoint, delete_idea_endpoint, list_ideas_endpoint, toggle_vote_endpoint,
    },
    preferences::{get_preferences_endpoint, update_preferences_endpoint},
    project::{
        create_project_endpoint, delete_project_endpoint, list_projects_endpoint,
        update_project_endpoint,
    },
    recurring::{
        create_recurring_rule_endpoint, delete_recurring_rule_endpoint,
        list_recurring_rules_endpoint, update_recurring_rule_endpoint,
    },
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, export_transactions_endpoint,
        list_transactions_endpoint,
    },
};

/// Return a router with all the app's routes.
///
/// Every route except log-in and log-out requires a valid session cookie.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::LOG_IN, post(post_log_in))
        .route(endpoints::LOG_OUT, get(get_log_out));

    let protected_routes = Router::new()
        .route(endpoints::DASHBOARD, get(get_dashboard_endpoint))
        .route(
            endpoints::USERS,
            get(list_users_endpoint).post(create_user_endpoint),
        )
        .route(
            endpoints::CATEGORIES,
            get(list_categories_endpoint).post(create_category_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS,
            get(list_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS_EXPORT,
            get(export_transactions_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            delete(delete_transaction_endpoint),
        )
        .route(
            endpoints::RECURRING_RULES,
            get(list_recurring_rules_endpoint).post(create_recurring_rule_endpoint),
        )
        .route(
            endpoints::RECURRING_RULE,
            put(update_recurring_rule_endpoint).delete(delete_recurring_rule_endpoint),
        )
        .route(
            endpoints::PROJECTS,
            get(list_projects_endpoint).post(create_project_endpoint),
        )
        .route(
            endpoints::PROJECT,
            put(update_project_endpoint).delete(delete_project_endpoint),
        )
        .route(
            endpoints::IDEAS,
            get(list_ideas_endpoint).post(create_idea_endpoint),
        )
        .route(endpoints::IDEA, delete(delete_idea_endpoint))
        .route(endpoints::IDEA_VOTE, post(toggle_vote_endpoint))
        .route(
            endpoints::PREFERENCES,
            get(get_preferences_endpoint).put(update_preferences_endpoint),
        )
        .route(endpoints::ACTIVITY, get(get_activity_endpoint))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "the requested route does not exist" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;

    use crate::{build_router, endpoints, test_utils::get_test_app_state};

    #[tokio::test]
    async fn protected_routes_require_a_session() {
        let server = TestServer::new(build_router(get_test_app_state())).unwrap();

        for endpoint in [
            endpoints::DASHBOARD,
            endpoints::TRANSACTIONS,
            endpoints::RECURRING_RULES,
            endpoints::PROJECTS,
            endpoints::IDEAS,
            endpoints::PREFERENCES,
        ] {
            server
                .get(endpoint)
                .await
                .assert_status(StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let server = TestServer::new(build_router(get_test_app_state())).unwrap();

        server
            .get("/api/coffee")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
