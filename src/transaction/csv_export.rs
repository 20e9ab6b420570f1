//! Writes transactions as CSV for spreadsheets.

use serde::Serialize;

use crate::{
    Error,
    transaction::{Transaction, TransactionType},
};

#[derive(Serialize)]
struct CsvRecord<'a> {
    date: String,
    #[serde(rename = "type")]
    kind: TransactionType,
    category: &'a str,
    description: &'a str,
    amount: String,
}

/// Write `transactions` as CSV with the header `date,type,category,description,amount`.
///
/// # Errors
/// Returns [Error::CsvError] if a record could not be written.
pub fn transactions_to_csv(transactions: &[Transaction]) -> Result<String, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for transaction in transactions {
        writer
            .serialize(CsvRecord {
                date: transaction.date.to_string(),
                kind: transaction.kind,
                category: &transaction.category,
                description: &transaction.description,
                amount: format!("{:.2}", transaction.amount),
            })
            .map_err(|error| Error::CsvError(error.to_string()))?;
    }

    // The header is only written with the first record.
    if transactions.is_empty() {
        writer
            .write_record(["date", "type", "category", "description", "amount"])
            .map_err(|error| Error::CsvError(error.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| Error::CsvError(error.to_string()))?;

    String::from_utf8(bytes).map_err(|error| Error::CsvError(error.to_string()))
}
