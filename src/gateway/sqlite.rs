use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use crate::{
    database_id::RuleId,
    db::lock,
    gateway::{PersistenceGateway, StorageError},
    recurring::{
        MonthToken, NewRecurringRule, RecurringRule, RecurringRulePatch,
        compare_and_set_last_applied, create_recurring_rule, delete_recurring_rule,
        get_all_recurring_rules, update_recurring_rule,
    },
    transaction::{Transaction, TransactionBuilder, create_transaction, get_all_transactions},
};

/// A [PersistenceGateway] over the application's SQLite database.
///
/// The connection lock is taken and released inside each call, it is never
/// held across a suspension point.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteGateway {
    /// Create a gateway sharing `connection` with the rest of the application.
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn list_recurring_rules(&self) -> Result<Vec<RecurringRule>, StorageError> {
        let connection = lock(&self.connection)?;
        Ok(get_all_recurring_rules(&connection)?)
    }

    async fn create_recurring_rule(
        &self,
        rule: NewRecurringRule,
    ) -> Result<RecurringRule, StorageError> {
        let connection = lock(&self.connection)?;
        Ok(create_recurring_rule(rule, &connection)?)
    }

    async fn update_recurring_rule(
        &self,
        id: RuleId,
        patch: RecurringRulePatch,
    ) -> Result<RecurringRule, StorageError> {
        let connection = lock(&self.connection)?;
        Ok(update_recurring_rule(id, &patch, &connection)?)
    }

    async fn delete_recurring_rule(&self, id: RuleId) -> Result<(), StorageError> {
        let connection = lock(&self.connection)?;
        Ok(delete_recurring_rule(id, &connection)?)
    }

    async fn compare_and_set_last_applied(
        &self,
        id: RuleId,
        expected: Option<MonthToken>,
        new: Option<MonthToken>,
    ) -> Result<bool, StorageError> {
        let connection = lock(&self.connection)?;
        Ok(compare_and_set_last_applied(id, expected, new, &connection)?)
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>, StorageError> {
        let connection = lock(&self.connection)?;
        Ok(get_all_transactions(&connection)?)
    }

    async fn create_transaction(
        &self,
        transaction: TransactionBuilder,
    ) -> Result<Transaction, StorageError> {
        let connection = lock(&self.connection)?;
        Ok(create_transaction(transaction, &connection)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        db::initialize,
        gateway::PersistenceGateway,
        recurring::{DayOfMonth, NewRecurringRule},
        transaction::{Transaction, TransactionType},
    };

    use super::SqliteGateway;

    fn get_gateway() -> SqliteGateway {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        SqliteGateway::new(Arc::new(Mutex::new(connection)))
    }

    #[tokio::test]
    async fn created_rows_are_listed() {
        let gateway = get_gateway();

        let rule = gateway
            .create_recurring_rule(NewRecurringRule {
                kind: TransactionType::Income,
                category: "Partenariats".to_owned(),
                description: "Sponsor".to_owned(),
                amount: 100.0,
                day_of_month: DayOfMonth::new(1).unwrap(),
                active: true,
            })
            .await
            .unwrap();
        let transaction = gateway
            .create_transaction(
                Transaction::build(TransactionType::Income, 20.0, date!(2024 - 06 - 01), "Cotisation")
                    .category("Cotisations"),
            )
            .await
            .unwrap();

        assert_eq!(gateway.list_recurring_rules().await.unwrap(), vec![rule]);
        assert_eq!(gateway.list_transactions().await.unwrap(), vec![transaction]);
    }

    #[tokio::test]
    async fn invalid_transaction_is_a_storage_error() {
        let gateway = get_gateway();

        let result = gateway
            .create_transaction(Transaction::build(
                TransactionType::Income,
                -1.0,
                date!(2024 - 06 - 01),
                "Cotisation",
            ))
            .await;

        assert!(result.is_err());
    }
}
