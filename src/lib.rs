//! Tresorier is a treasury dashboard for small associations.
//!
//! Members follow the association's cash transactions, recurring charges,
//! projects and improvement ideas. Administrators manage the money. The
//! library exposes a JSON API over a SQLite database.
//!
//! Recurring charges are materialized into concrete transactions by the
//! [RecurrenceEngine], once per rule per calendar month, whenever a member
//! logs in or the list of recurring rules changes.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod activity;
mod app_state;
mod auth;
mod category;
mod dashboard;
mod database_id;
mod db;
mod endpoints;
mod gateway;
mod idea;
mod logging;
mod preferences;
mod project;
mod recurring;
mod routing;
mod session;
mod timezone;
mod transaction;

#[cfg(test)]
mod test_utils;

pub use app_state::AppState;
pub use auth::{PasswordHash, Role, User, UserID, ValidatedPassword, bootstrap_admin};
pub use db::initialize as initialize_db;
pub use gateway::{PersistenceGateway, SqliteGateway, StorageError};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use recurring::{
    DayOfMonth, MonthToken, RecurrenceEngine, RecurrenceReport, RecurringRule, RuleOutcome,
};
pub use routing::build_router;
pub use session::SessionCache;
pub use timezone::local_today;
pub use transaction::{Transaction, TransactionType};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install the terminate signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The email and password did not match a registered user.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The request did not carry a valid, unexpired session token.
    #[error("not logged in or the session has expired")]
    NotAuthenticated,

    /// The action is reserved to administrators.
    #[error("this action requires an administrator")]
    AdminRequired,

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// The string is not a plausible email address.
    #[error("\"{0}\" is not a valid email address")]
    InvalidEmail(String),

    /// The email address is already used by another user.
    #[error("the email address is already registered")]
    DuplicateEmail,

    /// A category with the same name already exists.
    #[error("the category \"{0}\" already exists")]
    DuplicateCategoryName(String),

    /// A required text field was empty or only whitespace.
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    /// Amounts must be finite and strictly positive, the sign comes from the transaction type.
    #[error("{0} is not a valid amount, amounts must be greater than zero")]
    InvalidAmount(f64),

    /// Recurring rules can only fall on days 1 to 28 so that every month has that day.
    #[error("{0} is not a valid day of the month, expected a day between 1 and 28")]
    InvalidDayOfMonth(i64),

    /// A month token that is not of the form `YYYY-MM`.
    #[error("\"{0}\" is not a valid month, expected the format YYYY-MM")]
    InvalidMonthToken(String),

    /// Colours are CSS hex colours of the form `#rrggbb`.
    #[error("\"{0}\" is not a valid colour, expected the format #rrggbb")]
    InvalidColor(String),

    /// The category name does not match a known category.
    #[error("the category \"{0}\" does not exist")]
    UnknownCategory(String),

    /// The category cannot be used for the requested transaction type, e.g. an
    /// income-only category used for an expense.
    #[error("the category \"{0}\" cannot be used for {1}")]
    CategoryTypeMismatch(String, String),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// The persistence gateway failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// An error occurred while serializing a struct as JSON
    #[error("could not serialize as JSON: {0}")]
    JSONSerializationError(String),

    /// The CSV export could not be written.
    #[error("could not write CSV: {0}")]
    CsvError(String),

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,

    /// Tried to update a recurring rule that does not exist
    #[error("tried to update a recurring rule that is not in the database")]
    UpdateMissingRule,

    /// Tried to delete a recurring rule that does not exist
    #[error("tried to delete a recurring rule that is not in the database")]
    DeleteMissingRule,

    /// Tried to update a project that does not exist
    #[error("tried to update a project that is not in the database")]
    UpdateMissingProject,

    /// Tried to delete a project that does not exist
    #[error("tried to delete a project that is not in the database")]
    DeleteMissingProject,

    /// Tried to delete an idea that does not exist
    #[error("tried to delete an idea that is not in the database")]
    DeleteMissingIdea,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("user.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials | Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Error::AdminRequired => StatusCode::FORBIDDEN,
            Error::TooWeak(_)
            | Error::InvalidEmail(_)
            | Error::EmptyField(_)
            | Error::InvalidAmount(_)
            | Error::InvalidDayOfMonth(_)
            | Error::InvalidMonthToken(_)
            | Error::InvalidColor(_)
            | Error::UnknownCategory(_)
            | Error::CategoryTypeMismatch(_, _) => StatusCode::BAD_REQUEST,
            Error::DuplicateEmail | Error::DuplicateCategoryName(_) => StatusCode::CONFLICT,
            Error::NotFound
            | Error::DeleteMissingTransaction
            | Error::UpdateMissingRule
            | Error::DeleteMissingRule
            | Error::UpdateMissingProject
            | Error::DeleteMissingProject
            | Error::DeleteMissingIdea => StatusCode::NOT_FOUND,
            Error::HashingError(_)
            | Error::SqlError(_)
            | Error::Storage(_)
            | Error::DatabaseLockError
            | Error::InvalidTimezoneError(_)
            | Error::JSONSerializationError(_)
            | Error::CsvError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal errors are not intended to be shown to the client.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("An unexpected error occurred: {}", self);
            "An unexpected error occurred, check the server logs for more details.".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
