use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    Error,
    database_id::{RuleId, TransactionId},
    gateway::{PersistenceGateway, StorageError},
    recurring::{MonthToken, NewRecurringRule, RecurringRule, RecurringRulePatch},
    transaction::{Transaction, TransactionBuilder},
};

#[derive(Debug, Default)]
struct FakeStore {
    rules: Vec<RecurringRule>,
    transactions: Vec<Transaction>,
    next_transaction_id: TransactionId,
    failing_description: Option<String>,
    failing_claims: HashSet<RuleId>,
    fail_everything: bool,
}

impl FakeStore {
    fn check_available(&self) -> Result<(), StorageError> {
        if self.fail_everything {
            return Err(StorageError("the fake store is down".to_owned()));
        }

        Ok(())
    }

    fn next_rule_id(&self) -> RuleId {
        self.rules.iter().map(|rule| rule.id).max().unwrap_or(0) + 1
    }
}

/// An in-memory [PersistenceGateway] that can be told to fail.
///
/// Clones share the same store, so a clone can stand in for a second session.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeGateway {
    store: Arc<Mutex<FakeStore>>,
}

impl FakeGateway {
    pub(crate) fn with_rules(rules: Vec<RecurringRule>) -> Self {
        Self {
            store: Arc::new(Mutex::new(FakeStore {
                rules,
                ..Default::default()
            })),
        }
    }

    pub(crate) async fn transactions(&self) -> Vec<Transaction> {
        self.store.lock().await.transactions.clone()
    }

    pub(crate) async fn rule(&self, id: RuleId) -> Option<RecurringRule> {
        self.store
            .lock()
            .await
            .rules
            .iter()
            .find(|rule| rule.id == id)
            .cloned()
    }

    /// Make creating a transaction fail when its description contains `text`.
    pub(crate) async fn fail_transactions_containing(&self, text: &str) {
        self.store.lock().await.failing_description = Some(text.to_owned());
    }

    pub(crate) async fn fail_claims_for(&self, id: RuleId) {
        self.store.lock().await.failing_claims.insert(id);
    }

    pub(crate) async fn fail_everything(&self) {
        self.store.lock().await.fail_everything = true;
    }

    pub(crate) async fn stop_failing(&self) {
        let mut store = self.store.lock().await;
        store.failing_description = None;
        store.failing_claims.clear();
        store.fail_everything = false;
    }
}

#[async_trait]
impl PersistenceGateway for FakeGateway {
    async fn list_recurring_rules(&self) -> Result<Vec<RecurringRule>, StorageError> {
        let store = self.store.lock().await;
        store.check_available()?;

        Ok(store.rules.clone())
    }

    async fn create_recurring_rule(
        &self,
        rule: NewRecurringRule,
    ) -> Result<RecurringRule, StorageError> {
        let mut store = self.store.lock().await;
        store.check_available()?;

        let rule = rule.validate()?;
        let rule = RecurringRule {
            id: store.next_rule_id(),
            kind: rule.kind,
            category: rule.category,
            description: rule.description,
            amount: rule.amount,
            day_of_month: rule.day_of_month,
            active: rule.active,
            last_applied: None,
        };
        store.rules.push(rule.clone());

        Ok(rule)
    }

    async fn update_recurring_rule(
        &self,
        id: RuleId,
        patch: RecurringRulePatch,
    ) -> Result<RecurringRule, StorageError> {
        let mut store = self.store.lock().await;
        store.check_available()?;

        let stored = store
            .rules
            .iter_mut()
            .find(|rule| rule.id == id)
            .ok_or(Error::UpdateMissingRule)?;
        *stored = patch.apply_to(stored)?;

        Ok(stored.clone())
    }

    async fn delete_recurring_rule(&self, id: RuleId) -> Result<(), StorageError> {
        let mut store = self.store.lock().await;
        store.check_available()?;

        let count_before = store.rules.len();
        store.rules.retain(|rule| rule.id != id);
        if store.rules.len() == count_before {
            return Err(Error::DeleteMissingRule.into());
        }

        Ok(())
    }

    async fn compare_and_set_last_applied(
        &self,
        id: RuleId,
        expected: Option<MonthToken>,
        new: Option<MonthToken>,
    ) -> Result<bool, StorageError> {
        let mut store = self.store.lock().await;
        store.check_available()?;
        if store.failing_claims.contains(&id) {
            return Err(StorageError(format!("claim on rule {id} failed")));
        }

        match store.rules.iter_mut().find(|rule| rule.id == id) {
            Some(rule) if rule.last_applied == expected => {
                rule.last_applied = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>, StorageError> {
        let store = self.store.lock().await;
        store.check_available()?;

        let mut transactions = store.transactions.clone();
        transactions.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        Ok(transactions)
    }

    async fn create_transaction(
        &self,
        transaction: TransactionBuilder,
    ) -> Result<Transaction, StorageError> {
        let mut store = self.store.lock().await;
        store.check_available()?;

        if let Some(text) = &store.failing_description {
            if transaction.description.contains(text.as_str()) {
                return Err(StorageError(format!(
                    "could not store \"{}\"",
                    transaction.description
                )));
            }
        }

        let transaction = transaction.validate()?;
        store.next_transaction_id += 1;
        let transaction = Transaction {
            id: store.next_transaction_id,
            date: transaction.date,
            kind: transaction.kind,
            category: transaction.category,
            description: transaction.description,
            amount: transaction.amount,
        };
        store.transactions.push(transaction.clone());

        Ok(transaction)
    }
}
