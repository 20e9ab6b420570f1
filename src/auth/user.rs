//! Code for creating the user table and fetching users from the database.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, auth::PasswordHash};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What a user is allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Manages money, recurring charges, projects and users.
    Admin,
    /// Reads the books, submits and votes on ideas.
    Member,
}

impl Role {
    /// The name stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role \"{other}\"")),
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

/// A member of the association with access to the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The display name.
    pub name: String,
    /// The email used to log in.
    pub email: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// Whether the user is an administrator.
    pub role: Role,
    /// When the account was created.
    pub created_at: OffsetDateTime,
}

impl User {
    /// Whether the user may manage money, recurring charges, projects and users.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// The public view of a [User], without the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    /// The user's ID.
    pub id: UserID,
    /// The display name.
    pub name: String,
    /// The email used to log in.
    pub email: String,
    /// Whether the user is an administrator.
    pub role: Role,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// The data needed to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// The display name.
    pub name: String,
    /// The email used to log in, it must not be used by another user.
    pub email: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// Whether the user is an administrator.
    pub role: Role,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Check that `email` looks like an email address and normalize it for lookups.
///
/// # Errors
/// Returns [Error::InvalidEmail] if there is no `@` with text on both sides.
pub fn normalize_email(email: &str) -> Result<String, Error> {
    let email = email.trim().to_lowercase();

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(Error::InvalidEmail(email)),
    }
}

/// Create and insert a new user into the database.
///
/// # Errors
///
/// Returns a:
/// - [Error::InvalidEmail] if the email is not valid,
/// - [Error::EmptyField] if the name is empty,
/// - [Error::DuplicateEmail] if another user has the same email,
/// - [Error::SqlError] if an SQL related error occurred.
pub fn create_user(new_user: NewUser, connection: &Connection) -> Result<User, Error> {
    let email = normalize_email(&new_user.email)?;
    let name = new_user.name.trim();

    if name.is_empty() {
        return Err(Error::EmptyField("name"));
    }

    let created_at = OffsetDateTime::now_utc();

    connection
        .prepare(
            "INSERT INTO user (name, email, password, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, name, email, password, role, created_at",
        )?
        .query_row(
            (
                name,
                &email,
                new_user.password_hash.to_string(),
                new_user.role,
                created_at,
            ),
            map_user_row,
        )
        .map_err(|error| error.into())
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(
            "SELECT id, name, email, password, role, created_at FROM user WHERE id = :id",
        )?
        .query_row(&[(":id", &user_id.as_i64())], map_user_row)
        .map_err(|error| error.into())
}

/// Get the user whose email matches `email`, ignoring case.
///
/// # Errors
///
/// Returns [Error::NotFound] if no user has this email.
pub fn get_user_by_email(email: &str, connection: &Connection) -> Result<User, Error> {
    let email = email.trim().to_lowercase();

    connection
        .prepare(
            "SELECT id, name, email, password, role, created_at FROM user WHERE email = :email",
        )?
        .query_row(&[(":email", &email)], map_user_row)
        .map_err(|error| error.into())
}

/// Get all users ordered by name.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn get_all_users(connection: &Connection) -> Result<Vec<User>, Error> {
    connection
        .prepare("SELECT id, name, email, password, role, created_at FROM user ORDER BY name")?
        .query_map([], map_user_row)?
        .map(|maybe_user| maybe_user.map_err(|error| error.into()))
        .collect()
}

/// Get the number of users in the database.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn count_users(connection: &Connection) -> Result<usize, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM user;", [], |row| row.get(0))
        .map_err(|error| error.into())
}

/// Create the first administrator if nobody is registered yet.
///
/// Returns the new administrator, or `None` if there already are users.
///
/// # Errors
///
/// Returns an error if the user could not be created.
pub fn bootstrap_admin(
    email: &str,
    password_hash: PasswordHash,
    connection: &Connection,
) -> Result<Option<User>, Error> {
    if count_users(connection)? > 0 {
        return Ok(None);
    }

    create_user(
        NewUser {
            name: "Administrateur".to_owned(),
            email: email.to_owned(),
            password_hash,
            role: Role::Admin,
        },
        connection,
    )
    .map(Some)
}

fn map_user_row(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_password_hash: String = row.get(3)?;

    Ok(User {
        id: UserID::new(row.get(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        role: row.get(4)?,
        created_at: row.get(5)?,
    })
}
