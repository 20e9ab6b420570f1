//! Route handlers for recurring rules.
//!
//! Creating, changing or deleting a rule changes the rule list, which runs the
//! recurrence engine so a new rule that is due appears in this month's books
//! straight away.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error, SessionCache, SqliteGateway, User,
    activity::{Action, log_activity},
    auth::AdminUser,
    category::check_category,
    database_id::RuleId,
    db::lock,
    recurring::{
        DayOfMonth, NewRecurringRule, RecurrenceReport, RecurringRule, RecurringRulePatch,
        get_all_recurring_rules,
    },
    timezone::local_today,
    transaction::TransactionType,
};

/// The state needed by the recurring rule routes.
#[derive(Debug, Clone)]
pub struct RecurringState {
    /// The local timezone as a canonical timezone name, e.g. "Europe/Paris".
    pub local_timezone: String,
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RecurringState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            local_timezone: state.local_timezone.clone(),
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The form for creating a recurring rule.
///
/// The day is read as a plain number so that days outside 1 to 28 are
/// reported as a bad request rather than a parsing failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRuleForm {
    #[serde(rename = "type")]
    kind: TransactionType,
    category: String,
    description: String,
    amount: f64,
    day_of_month: i64,
    active: Option<bool>,
}

impl TryFrom<RecurringRuleForm> for NewRecurringRule {
    type Error = Error;

    fn try_from(form: RecurringRuleForm) -> Result<Self, Self::Error> {
        NewRecurringRule {
            kind: form.kind,
            category: form.category,
            description: form.description,
            amount: form.amount,
            day_of_month: DayOfMonth::new(form.day_of_month)?,
            active: form.active.unwrap_or(true),
        }
        .validate()
    }
}

/// The form for changing a recurring rule. Missing fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRulePatchForm {
    #[serde(rename = "type")]
    kind: Option<TransactionType>,
    category: Option<String>,
    description: Option<String>,
    amount: Option<f64>,
    day_of_month: Option<i64>,
    active: Option<bool>,
}

impl TryFrom<RecurringRulePatchForm> for RecurringRulePatch {
    type Error = Error;

    fn try_from(form: RecurringRulePatchForm) -> Result<Self, Self::Error> {
        Ok(RecurringRulePatch {
            kind: form.kind,
            category: form.category,
            description: form.description,
            amount: form.amount,
            day_of_month: form.day_of_month.map(DayOfMonth::new).transpose()?,
            active: form.active,
        })
    }
}

/// The response to a change of the rule list.
#[derive(Debug, Serialize, Deserialize)]
pub struct RuleChangeResponse {
    /// The rule after the recurrence engine ran.
    pub rule: RecurringRule,
    /// How many transactions the engine created.
    pub materialized: usize,
}

/// Route handler listing the recurring rules.
pub async fn list_recurring_rules_endpoint(
    State(state): State<RecurringState>,
) -> Result<Json<Vec<RecurringRule>>, Error> {
    let connection = lock(&state.db_connection)?;

    get_all_recurring_rules(&connection).map(Json)
}

/// Route handler for creating a recurring rule. Administrators only.
pub async fn create_recurring_rule_endpoint(
    State(state): State<RecurringState>,
    AdminUser(admin): AdminUser,
    Json(form): Json<RecurringRuleForm>,
) -> Result<Response, Error> {
    let new_rule = NewRecurringRule::try_from(form)?;
    {
        let connection = lock(&state.db_connection)?;
        check_category(&new_rule.category, new_rule.kind, &connection)?;
    }

    let mut session = open_session(&state).await?;
    let rule = session.add_rule(new_rule).await?;
    let report = sync(&mut session, &state).await;

    record(&state, &admin, Action::CreateRecurringRule, &rule.description);

    let rule = session.rule(rule.id).cloned().unwrap_or(rule);
    Ok((
        StatusCode::CREATED,
        Json(RuleChangeResponse {
            rule,
            materialized: report.map_or(0, |report| report.materialized_count()),
        }),
    )
        .into_response())
}

/// Route handler for changing a recurring rule. Administrators only.
///
/// The last applied month cannot be changed.
pub async fn update_recurring_rule_endpoint(
    State(state): State<RecurringState>,
    AdminUser(admin): AdminUser,
    Path(rule_id): Path<RuleId>,
    Json(form): Json<RecurringRulePatchForm>,
) -> Result<Json<RuleChangeResponse>, Error> {
    let patch = RecurringRulePatch::try_from(form)?;

    let mut session = open_session(&state).await?;
    let current = session.rule(rule_id).ok_or(Error::UpdateMissingRule)?;
    let patched = patch.apply_to(current)?;
    {
        let connection = lock(&state.db_connection)?;
        check_category(&patched.category, patched.kind, &connection)?;
    }

    let rule = session.update_rule(rule_id, patch).await?;
    let report = sync(&mut session, &state).await;

    record(&state, &admin, Action::UpdateRecurringRule, &rule.description);

    let rule = session.rule(rule.id).cloned().unwrap_or(rule);
    Ok(Json(RuleChangeResponse {
        rule,
        materialized: report.map_or(0, |report| report.materialized_count()),
    }))
}

/// Route handler for deleting a recurring rule. Administrators only.
///
/// Transactions already created from the rule are kept.
pub async fn delete_recurring_rule_endpoint(
    State(state): State<RecurringState>,
    AdminUser(admin): AdminUser,
    Path(rule_id): Path<RuleId>,
) -> Result<StatusCode, Error> {
    let mut session = open_session(&state).await?;
    let description = session
        .rule(rule_id)
        .map(|rule| rule.description.clone())
        .ok_or(Error::DeleteMissingRule)?;

    session.remove_rule(rule_id).await?;
    sync(&mut session, &state).await;

    record(&state, &admin, Action::DeleteRecurringRule, &description);

    Ok(StatusCode::NO_CONTENT)
}

async fn open_session(state: &RecurringState) -> Result<SessionCache<SqliteGateway>, Error> {
    let gateway = SqliteGateway::new(state.db_connection.clone());

    Ok(SessionCache::load(gateway).await?)
}

/// Run the recurrence engine after a change of the rule list.
///
/// The change itself is already stored, so failures are only logged.
async fn sync(
    session: &mut SessionCache<SqliteGateway>,
    state: &RecurringState,
) -> Option<RecurrenceReport> {
    match local_today(&state.local_timezone) {
        Ok(today) => Some(session.sync_recurring(today).await),
        Err(error) => {
            tracing::error!("Could not apply recurring rules: {error}");
            None
        }
    }
}

fn record(state: &RecurringState, admin: &User, action: Action, detail: &str) {
    match lock(&state.db_connection) {
        Ok(connection) => log_activity(admin.id, action, detail, &connection),
        Err(error) => tracing::error!("Could not record activity {action}: {error}"),
    }
}
