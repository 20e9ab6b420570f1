//! Query-string filters for the transaction list and the CSV export.

use rusqlite::{Connection, ToSql, params_from_iter};
use serde::Deserialize;
use time::Date;

use crate::{
    Error,
    transaction::{Transaction, TransactionType, core::map_transaction_row},
};

/// Narrows down the transaction list. Every field is optional and the filters combine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransactionFilter {
    /// Only income or only expenses.
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    /// Only this category, matched exactly.
    pub category: Option<String>,
    /// Only transactions on or after this date.
    pub from: Option<Date>,
    /// Only transactions on or before this date.
    pub to: Option<Date>,
    /// Only transactions whose description contains this text, ignoring case.
    pub search: Option<String>,
}

impl TransactionFilter {
    fn where_clause(&self) -> (String, Vec<Box<dyn ToSql + '_>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql + '_>> = Vec::new();

        if let Some(kind) = &self.kind {
            params.push(Box::new(kind));
            conditions.push(format!("type = ?{}", params.len()));
        }

        if let Some(category) = self.category.as_deref().filter(|c| !c.trim().is_empty()) {
            params.push(Box::new(category.trim()));
            conditions.push(format!("category = ?{}", params.len()));
        }

        if let Some(from) = &self.from {
            params.push(Box::new(from));
            conditions.push(format!("date >= ?{}", params.len()));
        }

        if let Some(to) = &self.to {
            params.push(Box::new(to));
            conditions.push(format!("date <= ?{}", params.len()));
        }

        if conditions.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), params)
        }
    }

    /// The lowercased search text, `None` if there is nothing to search for.
    fn search_text(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|search| !search.is_empty())
            .map(str::to_lowercase)
    }
}

/// Get the transactions matching `filter`, newest first.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn get_filtered_transactions(
    filter: &TransactionFilter,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let (where_clause, params) = filter.where_clause();
    let query = format!(
        "SELECT id, date, type, category, description, amount FROM \"transaction\"
         {where_clause}
         ORDER BY date DESC, id DESC"
    );

    // SQLite only folds ASCII case, so the description search happens here.
    let transactions = connection
        .prepare(&query)?
        .query_map(params_from_iter(params.iter()), map_transaction_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let Some(search) = filter.search_text() else {
        return Ok(transactions);
    };

    Ok(transactions
        .into_iter()
        .filter(|transaction| transaction.description.to_lowercase().contains(&search))
        .collect())
}
