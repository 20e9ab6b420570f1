//! Creates the application's tables and hands out the shared connection.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::{
    Error,
    activity::create_activity_table,
    auth::create_user_table,
    category::{create_category_table, seed_default_categories},
    idea::create_idea_tables,
    preferences::create_preferences_table,
    project::create_project_table,
    recurring::create_recurring_rule_table,
    transaction::create_transaction_table,
};

/// Create all the tables for the domain models and seed the default categories.
///
/// This function is idempotent, it can be called on an existing database.
///
/// # Errors
/// Returns an error if a table cannot be created or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.execute("PRAGMA foreign_keys = ON", ())?;

    let transaction = Transaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_category_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_recurring_rule_table(&transaction)?;
    create_project_table(&transaction)?;
    create_idea_tables(&transaction)?;
    create_preferences_table(&transaction)?;
    create_activity_table(&transaction)?;

    let seeded = seed_default_categories(&transaction)?;
    if seeded > 0 {
        tracing::info!("Seeded {seeded} default categories.");
    }

    transaction.commit()?;

    Ok(())
}

/// Acquire the lock on the shared database connection.
///
/// # Errors
/// Returns [Error::DatabaseLockError] if the lock is poisoned.
pub(crate) fn lock(connection: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, Error> {
    connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use crate::category::get_all_categories;

    use super::initialize;

    #[test]
    fn initialize_twice_does_not_duplicate_categories() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).expect("first initialization failed");
        initialize(&connection).expect("second initialization failed");

        let categories = get_all_categories(&connection).unwrap();
        assert_eq!(categories.len(), 7);
    }
}
