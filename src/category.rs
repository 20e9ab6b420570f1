//! Categories group transactions, e.g. "Cotisations" or "Serveurs".
//!
//! A category is for income, for expenses, or for both. The default categories
//! are seeded when the database is created.

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    activity::{Action, log_activity},
    auth::AdminUser,
    database_id::CategoryId,
    db::lock,
    transaction::TransactionType,
};

/// Which transaction types may use a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    /// Only income.
    Income,
    /// Only expenses.
    Expense,
    /// Income and expenses.
    Both,
}

impl CategoryKind {
    /// The name stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Income => "income",
            CategoryKind::Expense => "expense",
            CategoryKind::Both => "both",
        }
    }

    /// Whether a transaction of type `kind` may use this category.
    pub fn accepts(&self, kind: TransactionType) -> bool {
        matches!(
            (self, kind),
            (CategoryKind::Both, _)
                | (CategoryKind::Income, TransactionType::Income)
                | (CategoryKind::Expense, TransactionType::Expense)
        )
    }
}

impl FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(CategoryKind::Income),
            "expense" => Ok(CategoryKind::Expense),
            "both" => Ok(CategoryKind::Both),
            other => Err(format!("unknown category type \"{other}\"")),
        }
    }
}

impl ToSql for CategoryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CategoryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

/// A named, coloured group of transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// The ID of the category.
    pub id: CategoryId,
    /// The unique name, e.g. "Dons".
    pub name: String,
    /// A CSS hex colour used by the charts, e.g. "#8b5cf6".
    pub color: String,
    /// Which transaction types may use the category.
    #[serde(rename = "type")]
    pub kind: CategoryKind,
}

/// The data sent to create a category.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    /// The unique name.
    pub name: String,
    /// Defaults to grey.
    pub color: Option<String>,
    /// Which transaction types may use the category.
    #[serde(rename = "type")]
    pub kind: CategoryKind,
}

const DEFAULT_COLOR: &str = "#6b7280";

/// The categories every new database starts with.
pub const DEFAULT_CATEGORIES: [(&str, &str, CategoryKind); 7] = [
    ("Cotisations", "#10b981", CategoryKind::Income),
    ("Dons", "#8b5cf6", CategoryKind::Income),
    ("Partenariats", "#3b82f6", CategoryKind::Income),
    ("Serveurs", "#ef4444", CategoryKind::Expense),
    ("Outils", "#f59e0b", CategoryKind::Expense),
    ("Événements", "#ec4899", CategoryKind::Both),
    ("Autre", DEFAULT_COLOR, CategoryKind::Both),
];

/// Create the category table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS category (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                color TEXT NOT NULL,
                type TEXT NOT NULL CHECK (type IN ('income', 'expense', 'both'))
                )",
        (),
    )?;

    Ok(())
}

/// Insert [DEFAULT_CATEGORIES] if the category table is empty.
///
/// Returns the number of categories inserted.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn seed_default_categories(connection: &Connection) -> Result<usize, rusqlite::Error> {
    let count: i64 = connection.query_row("SELECT COUNT(id) FROM category", [], |row| row.get(0))?;

    if count > 0 {
        return Ok(0);
    }

    let mut statement =
        connection.prepare("INSERT INTO category (name, color, type) VALUES (?1, ?2, ?3)")?;
    for (name, color, kind) in DEFAULT_CATEGORIES {
        statement.execute((name, color, kind))?;
    }

    Ok(DEFAULT_CATEGORIES.len())
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Create a category.
///
/// # Errors
/// This function will return a:
/// - [Error::EmptyField] if the name is blank,
/// - [Error::InvalidColor] if the colour is not a `#rrggbb` colour,
/// - [Error::DuplicateCategoryName] if the name is taken,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_category(new_category: NewCategory, connection: &Connection) -> Result<Category, Error> {
    let name = new_category.name.trim();
    if name.is_empty() {
        return Err(Error::EmptyField("name"));
    }

    let color = new_category.color.as_deref().map(str::trim).unwrap_or(DEFAULT_COLOR);
    if !is_hex_color(color) {
        return Err(Error::InvalidColor(color.to_owned()));
    }

    connection
        .prepare(
            "INSERT INTO category (name, color, type) VALUES (?1, ?2, ?3)
             RETURNING id, name, color, type",
        )?
        .query_row((name, color, new_category.kind), map_category_row)
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateCategoryName(name.to_owned()),
            error => error.into(),
        })
}

/// Get all categories ordered by ID, so the defaults come first.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn get_all_categories(connection: &Connection) -> Result<Vec<Category>, Error> {
    connection
        .prepare("SELECT id, name, color, type FROM category ORDER BY id")?
        .query_map([], map_category_row)?
        .map(|maybe_category| maybe_category.map_err(|error| error.into()))
        .collect()
}

/// Get the category called `name`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such category.
pub fn get_category_by_name(name: &str, connection: &Connection) -> Result<Category, Error> {
    connection
        .prepare("SELECT id, name, color, type FROM category WHERE name = :name")?
        .query_row(&[(":name", &name.trim())], map_category_row)
        .map_err(|error| error.into())
}

/// Check that `name` is a known category that accepts transactions of type `kind`.
///
/// # Errors
/// Returns [Error::UnknownCategory] or [Error::CategoryTypeMismatch].
pub fn check_category(name: &str, kind: TransactionType, connection: &Connection) -> Result<(), Error> {
    let category = match get_category_by_name(name, connection) {
        Ok(category) => category,
        Err(Error::NotFound) => return Err(Error::UnknownCategory(name.trim().to_owned())),
        Err(error) => return Err(error),
    };

    if !category.kind.accepts(kind) {
        return Err(Error::CategoryTypeMismatch(category.name, kind.to_string()));
    }

    Ok(())
}

fn map_category_row(row: &Row) -> Result<Category, rusqlite::Error> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        kind: row.get(3)?,
    })
}

/// The state needed by the category routes.
#[derive(Debug, Clone)]
pub struct CategoryState {
    /// The database connection for managing categories.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CategoryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Route handler listing all categories.
pub async fn list_categories_endpoint(
    State(state): State<CategoryState>,
) -> Result<Json<Vec<Category>>, Error> {
    let connection = lock(&state.db_connection)?;

    get_all_categories(&connection).map(Json)
}

/// Route handler for creating a category. Administrators only.
pub async fn create_category_endpoint(
    State(state): State<CategoryState>,
    AdminUser(admin): AdminUser,
    Json(new_category): Json<NewCategory>,
) -> Result<Response, Error> {
    let connection = lock(&state.db_connection)?;
    let category = create_category(new_category, &connection)?;

    log_activity(admin.id, Action::CreateCategory, &category.name, &connection);

    Ok((StatusCode::CREATED, Json(category)).into_response())
}
