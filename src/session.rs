//! A per-session copy of the recurring rules and transactions.
//!
//! The cache is private to one session and the gateway stays the source of
//! truth. Every mutation goes through the gateway first and the cache is only
//! updated once the gateway has confirmed it.

use time::Date;

use crate::{
    database_id::RuleId,
    gateway::{PersistenceGateway, StorageError},
    recurring::{NewRecurringRule, RecurrenceEngine, RecurrenceReport, RecurringRule, RecurringRulePatch},
    transaction::{Summary, Transaction},
};

/// The recurring rules and transactions seen by one logged-in session.
pub struct SessionCache<G> {
    gateway: G,
    rules: Vec<RecurringRule>,
    transactions: Vec<Transaction>,
}

impl<G> SessionCache<G>
where
    G: PersistenceGateway,
{
    /// Read the rules and transactions from `gateway`.
    ///
    /// # Errors
    /// Returns the gateway's error if either list cannot be read.
    pub async fn load(gateway: G) -> Result<Self, StorageError> {
        let rules = gateway.list_recurring_rules().await?;
        let transactions = gateway.list_transactions().await?;

        Ok(Self {
            gateway,
            rules,
            transactions,
        })
    }

    /// The cached recurring rules.
    pub fn rules(&self) -> &[RecurringRule] {
        &self.rules
    }

    /// The cached rule with `id`.
    pub fn rule(&self, id: RuleId) -> Option<&RecurringRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    /// The cached transactions.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Running sums over the cached transactions.
    pub fn summary(&self) -> Summary {
        Summary::from_transactions(&self.transactions)
    }

    /// Run the recurrence engine over the cached rules for the month of `today`.
    ///
    /// Only confirmed results reach the cache: created transactions are added
    /// and their rules marked as applied. If another session claimed a rule
    /// first, the cache is reloaded to pick up that session's changes.
    pub async fn sync_recurring(&mut self, today: Date) -> RecurrenceReport {
        let report = RecurrenceEngine::new(&self.gateway)
            .run(&self.rules, today)
            .await;

        for (rule_id, transaction) in report.materialized() {
            if let Some(rule) = self.rules.iter_mut().find(|rule| rule.id == rule_id) {
                rule.last_applied = Some(report.month);
            }
            self.transactions.push(transaction.clone());
        }

        if report.saw_concurrent_claims() {
            if let Err(error) = self.refresh().await {
                tracing::warn!("Could not reload the session cache: {error}");
            }
        }

        report
    }

    /// Reload the rules and transactions from the gateway.
    ///
    /// # Errors
    /// Returns the gateway's error, the cache is left unchanged.
    pub async fn refresh(&mut self) -> Result<(), StorageError> {
        let rules = self.gateway.list_recurring_rules().await?;
        let transactions = self.gateway.list_transactions().await?;

        self.rules = rules;
        self.transactions = transactions;

        Ok(())
    }

    /// Store a new rule, then cache it.
    ///
    /// # Errors
    /// Returns the gateway's error, the cache is left unchanged.
    pub async fn add_rule(&mut self, rule: NewRecurringRule) -> Result<RecurringRule, StorageError> {
        let rule = self.gateway.create_recurring_rule(rule).await?;
        self.rules.push(rule.clone());

        Ok(rule)
    }

    /// Store changes to a rule, then replace the cached copy.
    ///
    /// # Errors
    /// Returns the gateway's error, the cache is left unchanged.
    pub async fn update_rule(
        &mut self,
        id: RuleId,
        patch: RecurringRulePatch,
    ) -> Result<RecurringRule, StorageError> {
        let updated = self.gateway.update_recurring_rule(id, patch).await?;

        match self.rules.iter_mut().find(|rule| rule.id == id) {
            Some(cached) => *cached = updated.clone(),
            None => self.rules.push(updated.clone()),
        }

        Ok(updated)
    }

    /// Delete a rule, then drop it from the cache.
    ///
    /// # Errors
    /// Returns the gateway's error, the cache is left unchanged.
    pub async fn remove_rule(&mut self, id: RuleId) -> Result<(), StorageError> {
        self.gateway.delete_recurring_rule(id).await?;
        self.rules.retain(|rule| rule.id != id);

        Ok(())
    }
}
