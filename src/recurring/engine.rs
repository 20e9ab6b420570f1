//! Turns recurring rules into concrete transactions, once per rule per calendar month.
//!
//! For each due rule the engine first claims the month with a conditional
//! update of the rule's last applied month, then creates the transaction. Two
//! sessions running at the same time cannot both win the claim, so a month is
//! never materialized twice. If creating the transaction fails the claim is
//! released so the next run retries.
//!
//! Missed months are not back-filled: a rule last applied three months ago
//! produces a single transaction dated in the current month.

use time::Date;

use crate::{
    database_id::RuleId,
    gateway::{PersistenceGateway, StorageError},
    recurring::{MonthToken, RecurringRule},
    transaction::Transaction,
};

/// What happened to one rule during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// The rule is paused.
    Inactive,
    /// The rule was already applied this month, or in a later month.
    UpToDate,
    /// Another session claimed the month after the rule was read.
    ClaimedElsewhere,
    /// The transaction was created and the rule marked as applied.
    Materialized(Transaction),
    /// Storage failed; the rule will be retried on the next run.
    Failed(StorageError),
}

/// The result of one run of the [RecurrenceEngine].
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceReport {
    /// The month the run applied rules for.
    pub month: MonthToken,
    /// One outcome per rule, in the order the rules were given.
    pub outcomes: Vec<(RuleId, RuleOutcome)>,
}

impl RecurrenceReport {
    /// The transactions created during the run, with the rule they came from.
    pub fn materialized(&self) -> impl Iterator<Item = (RuleId, &Transaction)> {
        self.outcomes.iter().filter_map(|(rule_id, outcome)| match outcome {
            RuleOutcome::Materialized(transaction) => Some((*rule_id, transaction)),
            _ => None,
        })
    }

    /// How many transactions were created.
    pub fn materialized_count(&self) -> usize {
        self.materialized().count()
    }

    /// How many rules failed.
    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, RuleOutcome::Failed(_)))
            .count()
    }

    /// Whether another session changed a rule while this run was in progress.
    pub fn saw_concurrent_claims(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, outcome)| *outcome == RuleOutcome::ClaimedElsewhere)
    }
}

/// Applies due recurring rules through a [PersistenceGateway].
pub struct RecurrenceEngine<'a, G: ?Sized> {
    gateway: &'a G,
}

impl<'a, G> RecurrenceEngine<'a, G>
where
    G: PersistenceGateway + ?Sized,
{
    /// Create an engine writing through `gateway`.
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Apply every due rule in `rules` for the month containing `today`.
    ///
    /// Rules are independent: a storage failure on one rule is logged and the
    /// run moves on to the next one. The run never fails as a whole.
    pub async fn run(&self, rules: &[RecurringRule], today: Date) -> RecurrenceReport {
        let month = MonthToken::from_date(today);
        let mut outcomes = Vec::with_capacity(rules.len());

        for rule in rules {
            let outcome = match self.apply(rule, month).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!("Could not apply recurring rule {} for {month}: {error}", rule.id);
                    RuleOutcome::Failed(error)
                }
            };

            outcomes.push((rule.id, outcome));
        }

        let report = RecurrenceReport { month, outcomes };
        tracing::debug!(
            "Applied recurring rules for {month}: {} created, {} failed.",
            report.materialized_count(),
            report.failure_count()
        );

        report
    }

    async fn apply(&self, rule: &RecurringRule, month: MonthToken) -> Result<RuleOutcome, StorageError> {
        if !rule.active {
            return Ok(RuleOutcome::Inactive);
        }

        if !rule.is_due(month) {
            return Ok(RuleOutcome::UpToDate);
        }

        let transaction = rule.materialize(month)?;

        let claimed = self
            .gateway
            .compare_and_set_last_applied(rule.id, rule.last_applied, Some(month))
            .await?;
        if !claimed {
            tracing::info!("Recurring rule {} for {month} was claimed by another session.", rule.id);
            return Ok(RuleOutcome::ClaimedElsewhere);
        }

        match self.gateway.create_transaction(transaction).await {
            Ok(transaction) => Ok(RuleOutcome::Materialized(transaction)),
            Err(error) => {
                self.release_claim(rule, month).await;
                Err(error)
            }
        }
    }

    async fn release_claim(&self, rule: &RecurringRule, month: MonthToken) {
        match self
            .gateway
            .compare_and_set_last_applied(rule.id, Some(month), rule.last_applied)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                "Recurring rule {} changed while its claim for {month} was being released.",
                rule.id
            ),
            Err(error) => tracing::error!(
                "Could not release the claim of recurring rule {} for {month}, it will be skipped this month: {error}",
                rule.id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use crate::{
        gateway::PersistenceGateway,
        recurring::{DayOfMonth, MonthToken, RecurringRule},
        test_utils::FakeGateway,
        transaction::TransactionType,
    };

    use super::{RecurrenceEngine, RuleOutcome};

    fn month(token: &str) -> Option<MonthToken> {
        Some(token.parse().unwrap())
    }

    fn rule(id: i64, day: i64, last_applied: Option<MonthToken>) -> RecurringRule {
        RecurringRule {
            id,
            kind: TransactionType::Expense,
            category: "Serveurs".to_owned(),
            description: format!("Hébergement {id}"),
            amount: 42.5,
            day_of_month: DayOfMonth::new(day).unwrap(),
            active: true,
            last_applied,
        }
    }

    #[tokio::test]
    async fn already_applied_this_month_is_left_alone() {
        let gateway = FakeGateway::with_rules(vec![rule(1, 5, month("2024-05"))]);
        let rules = gateway.list_recurring_rules().await.unwrap();

        let report = RecurrenceEngine::new(&gateway)
            .run(&rules, date!(2024 - 05 - 20))
            .await;

        assert_eq!(report.outcomes, vec![(1, RuleOutcome::UpToDate)]);
        assert!(gateway.transactions().await.is_empty());
        assert_eq!(gateway.rule(1).await.unwrap().last_applied, month("2024-05"));
    }

    #[tokio::test]
    async fn due_rule_materializes_on_its_day() {
        let gateway = FakeGateway::with_rules(vec![rule(1, 5, None)]);
        let rules = gateway.list_recurring_rules().await.unwrap();

        let report = RecurrenceEngine::new(&gateway)
            .run(&rules, date!(2024 - 06 - 01))
            .await;

        assert_eq!(report.materialized_count(), 1);
        let transactions = gateway.transactions().await;
        assert_eq!(transactions.len(), 1);
        let transaction = &transactions[0];
        assert_eq!(transaction.date, date!(2024 - 06 - 05));
        assert_eq!(transaction.amount, 42.5);
        assert_eq!(transaction.kind, TransactionType::Expense);
        assert_eq!(transaction.category, "Serveurs");
        assert_eq!(transaction.description, "Hébergement 1 (récurrent)");
        assert_eq!(gateway.rule(1).await.unwrap().last_applied, month("2024-06"));
    }

    #[tokio::test]
    async fn inactive_rule_is_skipped() {
        let mut paused = rule(1, 5, None);
        paused.active = false;
        let gateway = FakeGateway::with_rules(vec![paused]);
        let rules = gateway.list_recurring_rules().await.unwrap();

        let report = RecurrenceEngine::new(&gateway)
            .run(&rules, date!(2024 - 06 - 10))
            .await;

        assert_eq!(report.outcomes, vec![(1, RuleOutcome::Inactive)]);
        assert!(gateway.transactions().await.is_empty());
        assert_eq!(gateway.rule(1).await.unwrap().last_applied, None);
    }

    #[tokio::test]
    async fn missed_months_are_not_back_filled() {
        let gateway = FakeGateway::with_rules(vec![rule(1, 15, month("2024-03"))]);
        let rules = gateway.list_recurring_rules().await.unwrap();

        RecurrenceEngine::new(&gateway)
            .run(&rules, date!(2024 - 06 - 02))
            .await;

        let transactions = gateway.transactions().await;
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].date, date!(2024 - 06 - 15));
        assert_eq!(gateway.rule(1).await.unwrap().last_applied, month("2024-06"));
    }

    #[tokio::test]
    async fn rule_applied_in_a_later_month_is_not_reapplied() {
        let gateway = FakeGateway::with_rules(vec![rule(1, 5, month("2024-07"))]);
        let rules = gateway.list_recurring_rules().await.unwrap();

        let report = RecurrenceEngine::new(&gateway)
            .run(&rules, date!(2024 - 06 - 10))
            .await;

        assert_eq!(report.outcomes, vec![(1, RuleOutcome::UpToDate)]);
        assert_eq!(gateway.rule(1).await.unwrap().last_applied, month("2024-07"));
    }

    #[tokio::test]
    async fn failure_on_one_rule_does_not_stop_the_others() {
        let gateway = FakeGateway::with_rules(vec![rule(1, 5, None), rule(2, 10, None)]);
        gateway.fail_transactions_containing("Hébergement 1").await;
        let rules = gateway.list_recurring_rules().await.unwrap();

        let report = RecurrenceEngine::new(&gateway)
            .run(&rules, date!(2024 - 06 - 10))
            .await;

        assert!(matches!(report.outcomes[0], (1, RuleOutcome::Failed(_))));
        assert!(matches!(report.outcomes[1], (2, RuleOutcome::Materialized(_))));
        assert_eq!(report.failure_count(), 1);
        // The claim on the failed rule is released so the next run retries it.
        assert_eq!(gateway.rule(1).await.unwrap().last_applied, None);
        assert_eq!(gateway.rule(2).await.unwrap().last_applied, month("2024-06"));
        assert_eq!(gateway.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_rule_is_retried_on_next_run() {
        let gateway = FakeGateway::with_rules(vec![rule(1, 5, None)]);
        gateway.fail_transactions_containing("Hébergement").await;
        let rules = gateway.list_recurring_rules().await.unwrap();
        let engine = RecurrenceEngine::new(&gateway);
        engine.run(&rules, date!(2024 - 06 - 10)).await;

        gateway.stop_failing().await;
        let rules = gateway.list_recurring_rules().await.unwrap();
        let report = engine.run(&rules, date!(2024 - 06 - 11)).await;

        assert_eq!(report.materialized_count(), 1);
        assert_eq!(gateway.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn both_rules_behind_the_current_month_fire() {
        let gateway = FakeGateway::with_rules(vec![
            rule(1, 1, month("2024-05")),
            rule(2, 15, month("2024-04")),
        ]);
        let rules = gateway.list_recurring_rules().await.unwrap();

        let report = RecurrenceEngine::new(&gateway)
            .run(&rules, date!(2024 - 06 - 03))
            .await;

        assert_eq!(report.materialized_count(), 2);
        let mut dates: Vec<_> = gateway
            .transactions()
            .await
            .into_iter()
            .map(|transaction| transaction.date)
            .collect();
        dates.sort();
        assert_eq!(dates, vec![date!(2024 - 06 - 01), date!(2024 - 06 - 15)]);
        assert_eq!(gateway.rule(1).await.unwrap().last_applied, month("2024-06"));
        assert_eq!(gateway.rule(2).await.unwrap().last_applied, month("2024-06"));
    }

    #[tokio::test]
    async fn running_twice_in_a_month_creates_one_transaction() {
        let gateway = FakeGateway::with_rules(vec![rule(1, 5, None)]);
        let engine = RecurrenceEngine::new(&gateway);

        let rules = gateway.list_recurring_rules().await.unwrap();
        engine.run(&rules, date!(2024 - 06 - 01)).await;
        let rules = gateway.list_recurring_rules().await.unwrap();
        let report = engine.run(&rules, date!(2024 - 06 - 30)).await;

        assert_eq!(report.outcomes, vec![(1, RuleOutcome::UpToDate)]);
        assert_eq!(gateway.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_sessions_with_stale_rules_materialize_once() {
        let gateway = FakeGateway::with_rules(vec![rule(1, 5, None)]);
        // Both sessions read the rule before either ran the engine.
        let first_session_rules = gateway.list_recurring_rules().await.unwrap();
        let second_session_rules = gateway.list_recurring_rules().await.unwrap();
        let engine = RecurrenceEngine::new(&gateway);

        let first = engine.run(&first_session_rules, date!(2024 - 06 - 10)).await;
        let second = engine.run(&second_session_rules, date!(2024 - 06 - 10)).await;

        assert_eq!(first.materialized_count(), 1);
        assert_eq!(second.outcomes, vec![(1, RuleOutcome::ClaimedElsewhere)]);
        assert!(second.saw_concurrent_claims());
        assert_eq!(gateway.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_while_claiming_is_isolated() {
        let gateway = FakeGateway::with_rules(vec![rule(1, 5, None), rule(2, 5, None)]);
        gateway.fail_claims_for(1).await;
        let rules = gateway.list_recurring_rules().await.unwrap();

        let report = RecurrenceEngine::new(&gateway)
            .run(&rules, date!(2024 - 06 - 10))
            .await;

        assert!(matches!(report.outcomes[0], (1, RuleOutcome::Failed(_))));
        assert!(matches!(report.outcomes[1], (2, RuleOutcome::Materialized(_))));
        assert_eq!(gateway.rule(1).await.unwrap().last_applied, None);
    }
}
