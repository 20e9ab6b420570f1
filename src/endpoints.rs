//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/projects/{project_id}', use [format_endpoint].

/// The route for logging in a user.
pub const LOG_IN: &str = "/api/log_in";
/// The route for the client to log out the current user.
pub const LOG_OUT: &str = "/api/log_out";
/// The route to list and create users.
pub const USERS: &str = "/api/users";
/// The route to list and create categories.
pub const CATEGORIES: &str = "/api/categories";
/// The route to list and create transactions.
pub const TRANSACTIONS: &str = "/api/transactions";
/// The route to access a single transaction.
pub const TRANSACTION: &str = "/api/transactions/{transaction_id}";
/// The route to download the filtered transactions as CSV.
pub const TRANSACTIONS_EXPORT: &str = "/api/transactions/export";
/// The route to list and create recurring rules.
pub const RECURRING_RULES: &str = "/api/recurring";
/// The route to change or delete a recurring rule.
pub const RECURRING_RULE: &str = "/api/recurring/{rule_id}";
/// The route to list and create projects.
pub const PROJECTS: &str = "/api/projects";
/// The route to change or delete a project.
pub const PROJECT: &str = "/api/projects/{project_id}";
/// The route to list and submit ideas.
pub const IDEAS: &str = "/api/ideas";
/// The route to delete an idea.
pub const IDEA: &str = "/api/ideas/{idea_id}";
/// The route to vote for an idea, or withdraw the vote.
pub const IDEA_VOTE: &str = "/api/ideas/{idea_id}/vote";
/// The route for the logged-in user's preferences.
pub const PREFERENCES: &str = "/api/preferences";
/// The route for the activity log.
pub const ACTIVITY: &str = "/api/activity";
/// The route for the dashboard.
pub const DASHBOARD: &str = "/api/dashboard";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/api/ideas/{idea_id}/vote', '{idea_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_string();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map_or(endpoint_path.len(), |end| param_start + end + 1);

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}
