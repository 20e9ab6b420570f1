use rusqlite::{Connection, Row};

use crate::{
    Error,
    database_id::RuleId,
    recurring::models::{MonthToken, NewRecurringRule, RecurringRule, RecurringRulePatch},
};

/// Create the recurring rule table.
///
/// The day check mirrors [crate::recurring::DayOfMonth] so rules written
/// directly to the database cannot fall on days missing from short months.
/// `last_applied` is either NULL or a `YYYY-MM` month token.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_recurring_rule_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS recurring_rule (
                id INTEGER PRIMARY KEY,
                type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                amount REAL NOT NULL CHECK (amount > 0),
                day_of_month INTEGER NOT NULL CHECK (day_of_month BETWEEN 1 AND 28),
                active INTEGER NOT NULL DEFAULT 1,
                last_applied TEXT CHECK (
                    last_applied IS NULL
                    OR last_applied GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]'
                )
                )",
        (),
    )?;

    Ok(())
}

/// Create a recurring rule that has never been applied.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] or [Error::EmptyField] if the rule is not valid,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_recurring_rule(
    new_rule: NewRecurringRule,
    connection: &Connection,
) -> Result<RecurringRule, Error> {
    let new_rule = new_rule.validate()?;

    connection
        .prepare(
            "INSERT INTO recurring_rule (type, category, description, amount, day_of_month, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id, type, category, description, amount, day_of_month, active, last_applied",
        )?
        .query_row(
            (
                new_rule.kind,
                new_rule.category,
                new_rule.description,
                new_rule.amount,
                new_rule.day_of_month,
                new_rule.active,
            ),
            map_rule_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve a recurring rule by `rule_id`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such rule.
pub fn get_recurring_rule(rule_id: RuleId, connection: &Connection) -> Result<RecurringRule, Error> {
    connection
        .prepare(
            "SELECT id, type, category, description, amount, day_of_month, active, last_applied
             FROM recurring_rule WHERE id = :id",
        )?
        .query_row(&[(":id", &rule_id)], map_rule_row)
        .map_err(|error| error.into())
}

/// Retrieve all recurring rules, in creation order.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_recurring_rules(connection: &Connection) -> Result<Vec<RecurringRule>, Error> {
    connection
        .prepare(
            "SELECT id, type, category, description, amount, day_of_month, active, last_applied
             FROM recurring_rule ORDER BY id",
        )?
        .query_map([], map_rule_row)?
        .map(|maybe_rule| maybe_rule.map_err(|error| error.into()))
        .collect()
}

/// Change the fields set in `patch`. `last_applied` is never touched.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingRule] if there is no such rule,
/// - [Error::InvalidAmount] or [Error::EmptyField] if the patched rule is not valid,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_recurring_rule(
    rule_id: RuleId,
    patch: &RecurringRulePatch,
    connection: &Connection,
) -> Result<RecurringRule, Error> {
    let current = match get_recurring_rule(rule_id, connection) {
        Ok(rule) => rule,
        Err(Error::NotFound) => return Err(Error::UpdateMissingRule),
        Err(error) => return Err(error),
    };
    let patched = patch.apply_to(&current)?;

    connection
        .prepare(
            "UPDATE recurring_rule
             SET type = ?1, category = ?2, description = ?3, amount = ?4, day_of_month = ?5, active = ?6
             WHERE id = ?7
             RETURNING id, type, category, description, amount, day_of_month, active, last_applied",
        )?
        .query_row(
            (
                patched.kind,
                patched.category,
                patched.description,
                patched.amount,
                patched.day_of_month,
                patched.active,
                rule_id,
            ),
            map_rule_row,
        )
        .map_err(|error| match error {
            // Deleted between the read and the write.
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingRule,
            error => error.into(),
        })
}

/// Delete the recurring rule with `rule_id`.
///
/// Transactions already created from the rule are kept.
///
/// # Errors
/// Returns [Error::DeleteMissingRule] if there is no such rule.
pub fn delete_recurring_rule(rule_id: RuleId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM recurring_rule WHERE id = ?1", [rule_id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingRule);
    }

    Ok(())
}

/// Set `last_applied` to `new` only if it currently equals `expected`.
///
/// Returns whether the value was changed. A `false` result means another
/// session changed the rule first, or the rule was deleted.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn compare_and_set_last_applied(
    rule_id: RuleId,
    expected: Option<MonthToken>,
    new: Option<MonthToken>,
    connection: &Connection,
) -> Result<bool, Error> {
    // `IS` compares NULLs as equal, `=` would not. Rows written before the
    // column was checked may hold an empty string for "never applied".
    let rows_affected = connection.execute(
        "UPDATE recurring_rule SET last_applied = ?1
         WHERE id = ?2
         AND (last_applied IS ?3 OR (?3 IS NULL AND last_applied = ''))",
        (new, rule_id, expected),
    )?;

    Ok(rows_affected == 1)
}

fn map_rule_row(row: &Row) -> Result<RecurringRule, rusqlite::Error> {
    Ok(RecurringRule {
        id: row.get(0)?,
        kind: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        amount: row.get(4)?,
        day_of_month: row.get(5)?,
        active: row.get(6)?,
        last_applied: map_last_applied(row, 7)?,
    })
}

/// An empty `last_applied` means the rule was never applied, like NULL.
fn map_last_applied(row: &Row, index: usize) -> Result<Option<MonthToken>, rusqlite::Error> {
    let Some(text) = row.get::<_, Option<String>>(index)? else {
        return Ok(None);
    };

    if text.is_empty() {
        return Ok(None);
    }

    text.parse()
        .map(Some)
        .map_err(|error: Error| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })
}
