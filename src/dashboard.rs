//! The landing data for logged-in members: where the money stands, where the
//! projects stand, and which ideas members want most.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error, UserID,
    db::lock,
    idea::{Idea, get_ideas_by_votes},
    project::{StatusCount, count_projects_by_status},
    recurring::{MonthToken, get_all_recurring_rules},
    timezone::local_today,
    transaction::{Summary, get_all_transactions},
};

/// How many ideas the dashboard shows.
const TOP_IDEA_COUNT: u32 = 3;

/// The dashboard contents.
#[derive(Debug, Serialize, Deserialize)]
pub struct Dashboard {
    /// Running sums over every transaction.
    pub summary: Summary,
    /// The current month in the server's timezone.
    pub month: MonthToken,
    /// Running sums over the current month's transactions.
    pub month_summary: Summary,
    /// How many recurring rules are active.
    pub active_recurring_rules: usize,
    /// Project counts for every status.
    pub projects: Vec<StatusCount>,
    /// The most voted ideas.
    pub top_ideas: Vec<Idea>,
}

/// The state needed for the dashboard.
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Europe/Paris".
    pub local_timezone: String,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// Route handler for the dashboard.
pub async fn get_dashboard_endpoint(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Dashboard>, Error> {
    let month = MonthToken::from_date(local_today(&state.local_timezone)?);
    let connection = lock(&state.db_connection)?;

    build_dashboard(user_id, month, &connection).map(Json)
}

fn build_dashboard(
    viewer: UserID,
    month: MonthToken,
    connection: &Connection,
) -> Result<Dashboard, Error> {
    let transactions = get_all_transactions(connection)?;
    let active_recurring_rules = get_all_recurring_rules(connection)?
        .iter()
        .filter(|rule| rule.active)
        .count();

    Ok(Dashboard {
        summary: Summary::from_transactions(&transactions),
        month,
        month_summary: Summary::from_transactions(
            transactions
                .iter()
                .filter(|transaction| MonthToken::from_date(transaction.date) == month),
        ),
        active_recurring_rules,
        projects: count_projects_by_status(connection)?,
        top_ideas: get_ideas_by_votes(viewer, Some(TOP_IDEA_COUNT), connection)?,
    })
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use time::macros::date;

    use crate::{
        auth::Role,
        build_router, endpoints,
        idea::{NewIdea, create_idea},
        project::{NewProject, ProjectStatus, create_project},
        test_utils::{create_test_user, get_test_app_state, log_in},
        transaction::{Transaction, TransactionType, create_transaction},
    };

    use super::{Dashboard, build_dashboard};

    #[test]
    fn month_summary_only_counts_the_month() {
        let state = get_test_app_state();
        let user = create_test_user(&state, "camille@example.org", Role::Member);
        let connection = state.db_connection.lock().unwrap();
        for (date, amount) in [(date!(2024 - 05 - 31), 10.0), (date!(2024 - 06 - 01), 25.0)] {
            create_transaction(
                Transaction::build(TransactionType::Income, amount, date, "Cotisation")
                    .category("Cotisations"),
                &connection,
            )
            .unwrap();
        }

        let dashboard = build_dashboard(user.id, "2024-06".parse().unwrap(), &connection).unwrap();

        assert_eq!(dashboard.summary.income, 35.0);
        assert_eq!(dashboard.month_summary.income, 25.0);
    }

    #[test]
    fn shows_at_most_three_ideas() {
        let state = get_test_app_state();
        let user = create_test_user(&state, "camille@example.org", Role::Member);
        let connection = state.db_connection.lock().unwrap();
        for title in ["A", "B", "C", "D"] {
            create_idea(
                NewIdea {
                    title: title.to_owned(),
                    description: String::new(),
                },
                user.id,
                &connection,
            )
            .unwrap();
        }

        let dashboard = build_dashboard(user.id, "2024-06".parse().unwrap(), &connection).unwrap();

        assert_eq!(dashboard.top_ideas.len(), 3);
    }

    #[tokio::test]
    async fn members_see_project_counts() {
        let state = get_test_app_state();
        create_test_user(&state, "camille@example.org", Role::Member);
        {
            let connection = state.db_connection.lock().unwrap();
            create_project(
                NewProject {
                    name: "Serveur Minecraft".to_owned(),
                    description: String::new(),
                    status: Some(ProjectStatus::InProgress),
                    budget: None,
                },
                &connection,
            )
            .unwrap();
        }
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "camille@example.org").await;

        let response = server.get(endpoints::DASHBOARD).add_cookie(token).await;

        response.assert_status_ok();
        let dashboard: Dashboard = response.json();
        let in_progress = dashboard
            .projects
            .iter()
            .find(|count| count.status == ProjectStatus::InProgress)
            .unwrap();
        assert_eq!(in_progress.count, 1);
        assert_eq!(in_progress.label, "En cours");
    }
}
