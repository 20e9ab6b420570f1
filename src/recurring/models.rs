//! Recurring rules and the month tokens that keep them from firing twice.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::{
    Error,
    database_id::RuleId,
    transaction::{Transaction, TransactionBuilder, TransactionType},
};

/// Appended to the description of every transaction created from a recurring rule.
pub const RECURRENCE_MARKER: &str = " (récurrent)";

/// A calendar month, written `YYYY-MM`.
///
/// Tokens order chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthToken {
    // Field order matters for the derived ordering.
    year: i32,
    month: u8,
}

impl MonthToken {
    /// The month that contains `date`.
    pub fn from_date(date: Date) -> Self {
        Self {
            year: date.year(),
            month: date.month().into(),
        }
    }

    /// The year of the month.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// The month of the year.
    pub fn month(&self) -> Month {
        // Only valid months are ever stored.
        Month::try_from(self.month).unwrap_or(Month::January)
    }

    /// The date in this month falling on `day`.
    pub fn with_day(&self, day: DayOfMonth) -> Result<Date, Error> {
        Date::from_calendar_date(self.year, self.month(), day.get())
            .map_err(|_| Error::InvalidDayOfMonth(day.get().into()))
    }
}

impl Display for MonthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidMonthToken(s.to_owned());

        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let all_digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
        if year.len() != 4 || month.len() != 2 || !all_digits(year) || !all_digits(month) {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month
            .parse::<u8>()
            .ok()
            .filter(|month| (1..=12).contains(month))
            .ok_or_else(invalid)?;

        Ok(Self { year, month })
    }
}

impl TryFrom<String> for MonthToken {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthToken> for String {
    fn from(value: MonthToken) -> Self {
        value.to_string()
    }
}

impl ToSql for MonthToken {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for MonthToken {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(error.to_string().into()))
    }
}

/// The day of the month a recurring rule falls on, between 1 and 28 so that
/// every month, February included, has that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct DayOfMonth(u8);

impl DayOfMonth {
    /// The last day allowed.
    pub const MAX: u8 = 28;

    /// Check that `day` is between 1 and 28.
    ///
    /// # Errors
    /// Returns [Error::InvalidDayOfMonth] otherwise. Days are never clamped.
    pub fn new(day: i64) -> Result<Self, Error> {
        match u8::try_from(day) {
            Ok(value) if (1..=Self::MAX).contains(&value) => Ok(Self(value)),
            _ => Err(Error::InvalidDayOfMonth(day)),
        }
    }

    /// The day as a number.
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for DayOfMonth {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DayOfMonth> for u8 {
    fn from(value: DayOfMonth) -> Self {
        value.0
    }
}

impl ToSql for DayOfMonth {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for DayOfMonth {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let day = value.as_i64()?;
        DayOfMonth::new(day).map_err(|_| FromSqlError::OutOfRange(day))
    }
}

/// A template for a transaction that repeats every month, e.g. server hosting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRule {
    /// The ID of the rule.
    pub id: RuleId,
    /// Whether the transactions are income or expenses.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// The category given to the transactions.
    pub category: String,
    /// The description of the transactions, before the recurrence marker.
    pub description: String,
    /// The amount of every transaction.
    pub amount: f64,
    /// The day of the month the transactions are dated.
    pub day_of_month: DayOfMonth,
    /// Inactive rules are never applied.
    pub active: bool,
    /// The latest month a transaction was created for, `None` if never applied.
    pub last_applied: Option<MonthToken>,
}

impl RecurringRule {
    /// Whether the rule should produce a transaction for `month`.
    ///
    /// A rule applied in a later month, e.g. after the clock went backwards, is not due.
    pub fn is_due(&self, month: MonthToken) -> bool {
        self.active && self.last_applied.is_none_or(|last_applied| last_applied < month)
    }

    /// The transaction this rule produces in `month`.
    ///
    /// # Errors
    /// Returns [Error::InvalidDayOfMonth] if the day does not exist in `month`,
    /// which cannot happen for a validated [DayOfMonth].
    pub fn materialize(&self, month: MonthToken) -> Result<TransactionBuilder, Error> {
        let date = month.with_day(self.day_of_month)?;
        let description = format!("{}{RECURRENCE_MARKER}", self.description);

        Ok(Transaction::build(self.kind, self.amount, date, &description).category(&self.category))
    }
}

/// The data needed to create a recurring rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecurringRule {
    /// Whether the transactions are income or expenses.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// The category given to the transactions.
    pub category: String,
    /// The description of the transactions.
    pub description: String,
    /// The amount of every transaction.
    pub amount: f64,
    /// The day of the month the transactions are dated.
    pub day_of_month: DayOfMonth,
    /// Defaults to active.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl NewRecurringRule {
    /// Trim the text fields and check the amount.
    ///
    /// # Errors
    /// Returns [Error::InvalidAmount] or [Error::EmptyField].
    pub fn validate(mut self) -> Result<Self, Error> {
        self.category = self.category.trim().to_owned();
        self.description = self.description.trim().to_owned();

        validate_fields(self.amount, &self.category, &self.description)?;

        Ok(self)
    }
}

/// Changes to a recurring rule. Missing fields are left unchanged.
///
/// There is no `lastApplied` field, only the recurrence engine sets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRulePatch {
    /// New transaction type.
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    /// New category.
    pub category: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New amount.
    pub amount: Option<f64>,
    /// New day of the month.
    pub day_of_month: Option<DayOfMonth>,
    /// Pause or resume the rule.
    pub active: Option<bool>,
}

impl RecurringRulePatch {
    /// Apply the patch to a copy of `rule`.
    ///
    /// # Errors
    /// Returns [Error::InvalidAmount] or [Error::EmptyField] if the patched rule is not valid.
    pub fn apply_to(&self, rule: &RecurringRule) -> Result<RecurringRule, Error> {
        let patched = RecurringRule {
            id: rule.id,
            kind: self.kind.unwrap_or(rule.kind),
            category: self
                .category
                .as_deref()
                .map(str::trim)
                .unwrap_or(&rule.category)
                .to_owned(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .unwrap_or(&rule.description)
                .to_owned(),
            amount: self.amount.unwrap_or(rule.amount),
            day_of_month: self.day_of_month.unwrap_or(rule.day_of_month),
            active: self.active.unwrap_or(rule.active),
            last_applied: rule.last_applied,
        };

        validate_fields(patched.amount, &patched.category, &patched.description)?;

        Ok(patched)
    }
}

fn validate_fields(amount: f64, category: &str, description: &str) -> Result<(), Error> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount(amount));
    }

    if category.is_empty() {
        return Err(Error::EmptyField("category"));
    }

    if description.is_empty() {
        return Err(Error::EmptyField("description"));
    }

    Ok(())
}
