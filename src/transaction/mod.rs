//! The association's income and expenses: storage, filters, running sums and CSV export.

mod core;
mod csv_export;
mod endpoints;
mod filter;
mod summary;

pub use core::{
    Transaction, TransactionBuilder, TransactionType, create_transaction,
    create_transaction_table, delete_transaction, get_all_transactions, get_transaction,
    map_transaction_row,
};
pub use csv_export::transactions_to_csv;
pub use endpoints::{
    TransactionList, TransactionState, create_transaction_endpoint, delete_transaction_endpoint,
    export_transactions_endpoint, list_transactions_endpoint,
};
pub use filter::{TransactionFilter, get_filtered_transactions};
pub use summary::{CategoryTotal, Summary};
