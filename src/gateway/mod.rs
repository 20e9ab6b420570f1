//! The storage seam between the recurrence engine and the database.
//!
//! The engine and the session cache only talk to storage through
//! [PersistenceGateway], so they can be driven by the SQLite implementation in
//! production and by an in-memory fake in tests.

mod sqlite;

use async_trait::async_trait;

use crate::{
    Error,
    database_id::RuleId,
    recurring::{MonthToken, NewRecurringRule, RecurringRule, RecurringRulePatch},
    transaction::{Transaction, TransactionBuilder},
};

pub use sqlite::SqliteGateway;

/// Any failure of the storage behind a [PersistenceGateway].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

impl From<Error> for StorageError {
    fn from(error: Error) -> Self {
        StorageError(error.to_string())
    }
}

/// Collection-scoped access to recurring rules and transactions.
///
/// Every operation is a suspension point for the caller and implementations
/// must not block other in-process work while waiting on storage.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Every recurring rule.
    async fn list_recurring_rules(&self) -> Result<Vec<RecurringRule>, StorageError>;

    /// Store a new rule that has never been applied.
    async fn create_recurring_rule(
        &self,
        rule: NewRecurringRule,
    ) -> Result<RecurringRule, StorageError>;

    /// Change the fields set in `patch` and return the stored rule.
    async fn update_recurring_rule(
        &self,
        id: RuleId,
        patch: RecurringRulePatch,
    ) -> Result<RecurringRule, StorageError>;

    /// Remove a rule. Transactions created from it are kept.
    async fn delete_recurring_rule(&self, id: RuleId) -> Result<(), StorageError>;

    /// Atomically set the rule's last applied month to `new` if it is still `expected`.
    ///
    /// Returns `false` when the stored value differs, e.g. because another
    /// session claimed the month first.
    async fn compare_and_set_last_applied(
        &self,
        id: RuleId,
        expected: Option<MonthToken>,
        new: Option<MonthToken>,
    ) -> Result<bool, StorageError>;

    /// Every transaction, newest first.
    async fn list_transactions(&self) -> Result<Vec<Transaction>, StorageError>;

    /// Store a transaction and return it with its ID.
    async fn create_transaction(
        &self,
        transaction: TransactionBuilder,
    ) -> Result<Transaction, StorageError>;
}
