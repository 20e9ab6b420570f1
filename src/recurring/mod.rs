//! Recurring charges: monthly templates that the recurrence engine turns into
//! concrete transactions, once per rule per calendar month.

mod db;
mod endpoints;
mod engine;
mod models;

pub use db::{
    compare_and_set_last_applied, create_recurring_rule, create_recurring_rule_table,
    delete_recurring_rule, get_all_recurring_rules, get_recurring_rule, update_recurring_rule,
};
pub use endpoints::{
    RecurringState, RuleChangeResponse, create_recurring_rule_endpoint,
    delete_recurring_rule_endpoint, list_recurring_rules_endpoint, update_recurring_rule_endpoint,
};
pub use engine::{RecurrenceEngine, RecurrenceReport, RuleOutcome};
pub use models::{
    DayOfMonth, MonthToken, NewRecurringRule, RECURRENCE_MARKER, RecurringRule,
    RecurringRulePatch,
};
