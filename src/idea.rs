//! Improvement ideas submitted by members, and the votes on them.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error, UserID,
    activity::{Action, log_activity},
    auth::AdminUser,
    database_id::IdeaId,
    db::lock,
};

/// An idea and how it is doing, as seen by one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    /// The ID of the idea.
    pub id: IdeaId,
    /// A one line summary.
    pub title: String,
    /// The details.
    pub description: String,
    /// Who submitted the idea.
    pub author_id: UserID,
    /// The author's name.
    pub author_name: String,
    /// When the idea was submitted.
    pub created_at: OffsetDateTime,
    /// How many members voted for the idea.
    pub votes: u32,
    /// Whether the member reading the idea voted for it.
    pub voted: bool,
}

/// The data sent to submit an idea.
#[derive(Debug, Clone, Deserialize)]
pub struct NewIdea {
    /// A one line summary.
    pub title: String,
    /// The details.
    #[serde(default)]
    pub description: String,
}

/// Create the idea and vote tables.
///
/// # Errors
/// Returns an error if a table cannot be created or if there is an SQL error.
pub fn create_idea_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS idea (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                author_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(author_id) REFERENCES user(id) ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE TABLE IF NOT EXISTS idea_vote (
                idea_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                UNIQUE(idea_id, user_id),
                FOREIGN KEY(idea_id) REFERENCES idea(id) ON DELETE CASCADE,
                FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
                )",
        (),
    )?;

    Ok(())
}

/// Store a new idea from `author_id`.
///
/// # Errors
/// Returns [Error::EmptyField] if the title is blank, or [Error::SqlError].
pub fn create_idea(
    new_idea: NewIdea,
    author_id: UserID,
    connection: &Connection,
) -> Result<IdeaId, Error> {
    let title = new_idea.title.trim();
    if title.is_empty() {
        return Err(Error::EmptyField("title"));
    }

    connection.execute(
        "INSERT INTO idea (title, description, author_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        (
            title,
            new_idea.description.trim(),
            author_id.as_i64(),
            OffsetDateTime::now_utc(),
        ),
    )?;

    Ok(connection.last_insert_rowid())
}

const IDEA_QUERY: &str = "SELECT idea.id, idea.title, idea.description, idea.author_id, user.name,
        idea.created_at,
        (SELECT COUNT(*) FROM idea_vote WHERE idea_vote.idea_id = idea.id) AS votes,
        EXISTS(SELECT 1 FROM idea_vote WHERE idea_vote.idea_id = idea.id AND idea_vote.user_id = ?1)
    FROM idea
    INNER JOIN user ON user.id = idea.author_id";

/// Get the idea with `id` as seen by `viewer`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such idea.
pub fn get_idea(id: IdeaId, viewer: UserID, connection: &Connection) -> Result<Idea, Error> {
    connection
        .prepare(&format!("{IDEA_QUERY} WHERE idea.id = ?2"))?
        .query_row((viewer.as_i64(), id), map_idea_row)
        .map_err(|error| error.into())
}

/// Get up to `limit` ideas as seen by `viewer`, most voted first. Ties go to
/// the oldest idea.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn get_ideas_by_votes(
    viewer: UserID,
    limit: Option<u32>,
    connection: &Connection,
) -> Result<Vec<Idea>, Error> {
    // SQLite treats a negative limit as no limit.
    let limit = limit.map_or(-1, i64::from);

    connection
        .prepare(&format!(
            "{IDEA_QUERY} ORDER BY votes DESC, idea.id ASC LIMIT ?2"
        ))?
        .query_map((viewer.as_i64(), limit), map_idea_row)?
        .map(|maybe_idea| maybe_idea.map_err(|error| error.into()))
        .collect()
}

/// Vote for the idea, or withdraw the vote if `user_id` already voted.
///
/// Returns whether the user now votes for the idea.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such idea.
pub fn toggle_vote(id: IdeaId, user_id: UserID, connection: &Connection) -> Result<bool, Error> {
    let idea_exists: bool = connection.query_row(
        "SELECT EXISTS(SELECT 1 FROM idea WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    if !idea_exists {
        return Err(Error::NotFound);
    }

    let withdrawn = connection.execute(
        "DELETE FROM idea_vote WHERE idea_id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;
    if withdrawn > 0 {
        return Ok(false);
    }

    connection.execute(
        "INSERT INTO idea_vote (idea_id, user_id) VALUES (?1, ?2)",
        (id, user_id.as_i64()),
    )?;

    Ok(true)
}

/// Delete the idea with `id` and its votes.
///
/// # Errors
/// Returns [Error::DeleteMissingIdea] if there is no such idea.
pub fn delete_idea(id: IdeaId, connection: &Connection) -> Result<(), Error> {
    connection.execute("DELETE FROM idea_vote WHERE idea_id = ?1", [id])?;
    let rows_affected = connection.execute("DELETE FROM idea WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingIdea);
    }

    Ok(())
}

fn map_idea_row(row: &Row) -> Result<Idea, rusqlite::Error> {
    Ok(Idea {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        author_id: UserID::new(row.get(3)?),
        author_name: row.get(4)?,
        created_at: row.get(5)?,
        votes: row.get(6)?,
        voted: row.get(7)?,
    })
}

/// The state needed by the idea routes.
#[derive(Debug, Clone)]
pub struct IdeaState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for IdeaState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Route handler listing every idea, most voted first.
pub async fn list_ideas_endpoint(
    State(state): State<IdeaState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Vec<Idea>>, Error> {
    let connection = lock(&state.db_connection)?;

    get_ideas_by_votes(user_id, None, &connection).map(Json)
}

/// Route handler for submitting an idea. Open to every member.
pub async fn create_idea_endpoint(
    State(state): State<IdeaState>,
    Extension(user_id): Extension<UserID>,
    Json(new_idea): Json<NewIdea>,
) -> Result<Response, Error> {
    let connection = lock(&state.db_connection)?;
    let id = create_idea(new_idea, user_id, &connection)?;
    let idea = get_idea(id, user_id, &connection)?;

    log_activity(user_id, Action::CreateIdea, &idea.title, &connection);

    Ok((StatusCode::CREATED, Json(idea)).into_response())
}

/// Route handler for voting for an idea or withdrawing the vote.
pub async fn toggle_vote_endpoint(
    State(state): State<IdeaState>,
    Extension(user_id): Extension<UserID>,
    Path(idea_id): Path<IdeaId>,
) -> Result<Json<Idea>, Error> {
    let connection = lock(&state.db_connection)?;
    let voted = toggle_vote(idea_id, user_id, &connection)?;
    let idea = get_idea(idea_id, user_id, &connection)?;

    let verb = if voted { "voted for" } else { "withdrew vote for" };
    log_activity(
        user_id,
        Action::ToggleVote,
        &format!("{verb} {}", idea.title),
        &connection,
    );

    Ok(Json(idea))
}

/// Route handler for deleting an idea. Administrators only.
pub async fn delete_idea_endpoint(
    State(state): State<IdeaState>,
    AdminUser(admin): AdminUser,
    Path(idea_id): Path<IdeaId>,
) -> Result<StatusCode, Error> {
    let connection = lock(&state.db_connection)?;
    delete_idea(idea_id, &connection)?;

    log_activity(
        admin.id,
        Action::DeleteIdea,
        &format!("idea {idea_id}"),
        &connection,
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;

    use crate::{
        Error,
        auth::Role,
        build_router,
        endpoints::{self, format_endpoint},
        test_utils::{create_test_user, get_test_app_state, log_in},
    };

    use super::{Idea, NewIdea, create_idea, delete_idea, get_ideas_by_votes, toggle_vote};

    fn new_idea(title: &str) -> NewIdea {
        NewIdea {
            title: title.to_owned(),
            description: String::new(),
        }
    }

    #[test]
    fn toggling_twice_withdraws_the_vote() {
        let state = get_test_app_state();
        let user = create_test_user(&state, "camille@example.org", Role::Member);
        let connection = state.db_connection.lock().unwrap();
        let id = create_idea(new_idea("Tournoi"), user.id, &connection).unwrap();

        assert!(toggle_vote(id, user.id, &connection).unwrap());
        assert_eq!(get_ideas_by_votes(user.id, None, &connection).unwrap()[0].votes, 1);

        assert!(!toggle_vote(id, user.id, &connection).unwrap());
        let ideas = get_ideas_by_votes(user.id, None, &connection).unwrap();
        assert_eq!(ideas[0].votes, 0);
        assert!(!ideas[0].voted);
    }

    #[test]
    fn ideas_are_sorted_by_votes() {
        let state = get_test_app_state();
        let camille = create_test_user(&state, "camille@example.org", Role::Member);
        let dominique = create_test_user(&state, "dominique@example.org", Role::Member);
        let connection = state.db_connection.lock().unwrap();
        let quiet = create_idea(new_idea("Newsletter"), camille.id, &connection).unwrap();
        let popular = create_idea(new_idea("Tournoi"), camille.id, &connection).unwrap();
        toggle_vote(popular, camille.id, &connection).unwrap();
        toggle_vote(popular, dominique.id, &connection).unwrap();
        toggle_vote(quiet, dominique.id, &connection).unwrap();

        let ideas = get_ideas_by_votes(camille.id, None, &connection).unwrap();

        assert_eq!(
            ideas.iter().map(|idea| (idea.id, idea.votes, idea.voted)).collect::<Vec<_>>(),
            vec![(popular, 2, true), (quiet, 1, false)]
        );
        assert_eq!(get_ideas_by_votes(camille.id, Some(1), &connection).unwrap().len(), 1);
    }

    #[test]
    fn blank_title_is_rejected() {
        let state = get_test_app_state();
        let user = create_test_user(&state, "camille@example.org", Role::Member);
        let connection = state.db_connection.lock().unwrap();

        assert_eq!(
            create_idea(new_idea("  "), user.id, &connection),
            Err(Error::EmptyField("title"))
        );
    }

    #[test]
    fn voting_for_a_missing_idea_is_not_found() {
        let state = get_test_app_state();
        let user = create_test_user(&state, "camille@example.org", Role::Member);
        let connection = state.db_connection.lock().unwrap();

        assert_eq!(toggle_vote(3, user.id, &connection), Err(Error::NotFound));
        assert_eq!(delete_idea(3, &connection), Err(Error::DeleteMissingIdea));
    }

    #[tokio::test]
    async fn members_submit_and_vote() {
        let state = get_test_app_state();
        create_test_user(&state, "camille@example.org", Role::Member);
        let server = TestServer::new(build_router(state)).unwrap();
        let token = log_in(&server, "camille@example.org").await;

        let response = server
            .post(endpoints::IDEAS)
            .add_cookie(token.clone())
            .json(&json!({ "title": "Tournoi inter-serveurs" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let idea: Idea = response.json();
        assert_eq!(idea.votes, 0);

        let voted: Idea = server
            .post(&format_endpoint(endpoints::IDEA_VOTE, idea.id))
            .add_cookie(token.clone())
            .await
            .json();
        assert_eq!(voted.votes, 1);
        assert!(voted.voted);

        server
            .delete(&format_endpoint(endpoints::IDEA, idea.id))
            .add_cookie(token)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
