//! Running sums over a list of transactions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::transaction::{Transaction, TransactionType};

/// The income and expense totals of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    /// The category name.
    pub category: String,
    /// The money received in this category.
    pub income: f64,
    /// The money spent in this category.
    pub expense: f64,
}

/// Totals shown at the top of the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Sum of all income.
    pub income: f64,
    /// Sum of all expenses.
    pub expense: f64,
    /// Income minus expenses.
    pub balance: f64,
    /// Totals per category, sorted by category name.
    pub by_category: Vec<CategoryTotal>,
}

impl Summary {
    /// Add up `transactions`.
    pub fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut income = 0.0;
        let mut expense = 0.0;
        let mut by_category: BTreeMap<&str, (f64, f64)> = BTreeMap::new();

        for transaction in transactions {
            let totals = by_category.entry(&transaction.category).or_default();

            match transaction.kind {
                TransactionType::Income => {
                    income += transaction.amount;
                    totals.0 += transaction.amount;
                }
                TransactionType::Expense => {
                    expense += transaction.amount;
                    totals.1 += transaction.amount;
                }
            }
        }

        Self {
            income,
            expense,
            balance: income - expense,
            by_category: by_category
                .into_iter()
                .map(|(category, (income, expense))| CategoryTotal {
                    category: category.to_owned(),
                    income,
                    expense,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use crate::transaction::{Transaction, TransactionType};

    use super::{CategoryTotal, Summary};

    fn transaction(kind: TransactionType, category: &str, amount: f64) -> Transaction {
        Transaction {
            id: 0,
            date: date!(2024 - 06 - 01),
            kind,
            category: category.to_owned(),
            description: "test".to_owned(),
            amount,
        }
    }

    #[test]
    fn empty_list_is_all_zero() {
        assert_eq!(Summary::from_transactions(&[]), Summary::default());
    }

    #[test]
    fn sums_by_type_and_category() {
        let transactions = [
            transaction(TransactionType::Income, "Cotisations", 100.0),
            transaction(TransactionType::Income, "Événements", 30.0),
            transaction(TransactionType::Expense, "Événements", 50.0),
            transaction(TransactionType::Expense, "Serveurs", 42.5),
        ];

        let summary = Summary::from_transactions(&transactions);

        assert_eq!(summary.income, 130.0);
        assert_eq!(summary.expense, 92.5);
        assert_eq!(summary.balance, 37.5);
        assert_eq!(
            summary.by_category,
            vec![
                CategoryTotal {
                    category: "Cotisations".to_owned(),
                    income: 100.0,
                    expense: 0.0
                },
                CategoryTotal {
                    category: "Serveurs".to_owned(),
                    income: 0.0,
                    expense: 42.5
                },
                CategoryTotal {
                    category: "Événements".to_owned(),
                    income: 30.0,
                    expense: 50.0
                },
            ]
        );
    }
}
