//! Route handlers for listing, creating, deleting and exporting transactions.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    activity::{Action, log_activity},
    auth::AdminUser,
    category::check_category,
    database_id::TransactionId,
    db::lock,
    transaction::{
        Summary, Transaction, TransactionBuilder, create_transaction, delete_transaction,
        filter::{TransactionFilter, get_filtered_transactions},
        transactions_to_csv,
    },
};

/// The state needed by the transaction routes.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The filtered transactions with their running sums.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionList {
    /// The matching transactions, newest first.
    pub transactions: Vec<Transaction>,
    /// The sums over the matching transactions.
    pub summary: Summary,
}

/// Route handler for the transaction list.
pub async fn list_transactions_endpoint(
    State(state): State<TransactionState>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<TransactionList>, Error> {
    let connection = lock(&state.db_connection)?;
    let transactions = get_filtered_transactions(&filter, &connection)?;
    let summary = Summary::from_transactions(&transactions);

    Ok(Json(TransactionList {
        transactions,
        summary,
    }))
}

/// Route handler for recording a transaction. Administrators only.
///
/// The category must exist and accept the transaction type.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    AdminUser(admin): AdminUser,
    Json(builder): Json<TransactionBuilder>,
) -> Result<Response, Error> {
    let builder = builder.validate()?;

    let connection = lock(&state.db_connection)?;
    check_category(&builder.category, builder.kind, &connection)?;
    let transaction = create_transaction(builder, &connection)?;

    log_activity(
        admin.id,
        Action::CreateTransaction,
        &format!(
            "{} {:.2} {}",
            transaction.kind, transaction.amount, transaction.description
        ),
        &connection,
    );

    Ok((StatusCode::CREATED, Json(transaction)).into_response())
}

/// Route handler for deleting a transaction. Administrators only.
pub async fn delete_transaction_endpoint(
    State(state): State<TransactionState>,
    AdminUser(admin): AdminUser,
    Path(transaction_id): Path<TransactionId>,
) -> Result<StatusCode, Error> {
    let connection = lock(&state.db_connection)?;
    delete_transaction(transaction_id, &connection)?;

    log_activity(
        admin.id,
        Action::DeleteTransaction,
        &format!("transaction {transaction_id}"),
        &connection,
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Route handler that downloads the filtered transactions as a CSV file.
pub async fn export_transactions_endpoint(
    State(state): State<TransactionState>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Response, Error> {
    let transactions = {
        let connection = lock(&state.db_connection)?;
        get_filtered_transactions(&filter, &connection)?
    };

    let csv = transactions_to_csv(&transactions)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"transactions.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}
