use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{info, warn};

use playground_types::models::{ChatMessage, ChatRole, ComponentVersion, Session, User};

use crate::Database;
use crate::error::{DbError, Result};
use crate::models::{ChatMessageRow, ComponentVersionRow, SessionRow, UserRow};

pub const DEFAULT_SESSION_TITLE: &str = "Untitled Session";

/// Attempts at allocating a version number before a conflict is surfaced.
const VERSION_ALLOCATION_ATTEMPTS: usize = 3;

const SESSION_COLUMNS: &str = "id, user_id, title, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, session_id, role, content, created_at";
const VERSION_COLUMNS: &str = "id, session_id, jsx_code, css_code, version, created_at";

impl Database {
    // -- Users --

    /// Fails with `DbError::Conflict` when the email is already registered.
    pub fn create_user(&self, email: &str, password_hash: &str, name: Option<&str>) -> Result<User> {
        let row = self.with_conn_mut(|conn| {
            let row = conn.query_row(
                "INSERT INTO users (email, password_hash, name) VALUES (?1, ?2, ?3)
                 RETURNING id, email, password_hash, name, created_at",
                params![email, password_hash, name],
                UserRow::from_row,
            )?;
            Ok(row)
        })?;
        row.to_user()
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, email, password_hash, name, created_at FROM users WHERE email = ?1",
                    [email],
                    UserRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, email, password_hash, name, created_at FROM users WHERE id = ?1",
                    [id],
                    UserRow::from_row,
                )
                .optional()?;
            Ok(row)
        })?;
        row.map(|r| r.to_user()).transpose()
    }

    // -- Sessions --

    pub fn create_session(&self, user_id: i64, title: &str) -> Result<Session> {
        self.with_conn_mut(|conn| {
            let sql = format!(
                "INSERT INTO sessions (user_id, title) VALUES (?1, ?2) RETURNING {SESSION_COLUMNS}"
            );
            let row = conn.query_row(&sql, params![user_id, title], SessionRow::from_row)?;
            row.into_model()
        })
    }

    /// Most recently active first.
    pub fn get_user_sessions(&self, user_id: i64) -> Result<Vec<Session>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ?1
                 ORDER BY updated_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], SessionRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(SessionRow::into_model).collect()
        })
    }

    /// Ownership-scoped lookup. A session owned by someone else is
    /// indistinguishable from one that does not exist.
    pub fn get_session(&self, session_id: i64, user_id: i64) -> Result<Option<Session>> {
        self.with_conn(|conn| query_session(conn, session_id, user_id))
    }

    /// Renames a session the user owns. Returns `None` if there is no such session.
    pub fn update_session_title(
        &self,
        session_id: i64,
        user_id: i64,
        title: &str,
    ) -> Result<Option<Session>> {
        self.with_conn_mut(|conn| {
            let sql = format!(
                "UPDATE sessions
                 SET title = ?3, updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
                 WHERE id = ?1 AND user_id = ?2
                 RETURNING {SESSION_COLUMNS}"
            );
            let row = conn
                .query_row(&sql, params![session_id, user_id, title], SessionRow::from_row)
                .optional()?;
            row.map(SessionRow::into_model).transpose()
        })
    }

    // -- Chat messages --

    /// Appends a message and bumps the session's `updated_at` in one transaction.
    pub fn add_chat_message(&self, session_id: i64, role: ChatRole, content: &str) -> Result<ChatMessage> {
        self.with_conn_mut(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

            let sql = format!(
                "INSERT INTO chat_messages (session_id, role, content) VALUES (?1, ?2, ?3)
                 RETURNING {MESSAGE_COLUMNS}"
            );
            let row = tx.query_row(
                &sql,
                params![session_id, role.as_str(), content],
                ChatMessageRow::from_row,
            )?;
            touch_session(&tx, session_id, &row.created_at)?;

            tx.commit()?;
            row.into_model()
        })
    }

    /// Full history, oldest first.
    pub fn get_chat_messages(&self, session_id: i64) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE session_id = ?1
                 ORDER BY created_at ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([session_id], ChatMessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ChatMessageRow::into_model).collect()
        })
    }

    /// The newest `limit` messages, still returned oldest first.
    pub fn get_recent_chat_messages(&self, session_id: i64, limit: u32) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM (
                     SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE session_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2
                 )
                 ORDER BY created_at ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![session_id, limit], ChatMessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ChatMessageRow::into_model).collect()
        })
    }

    // -- Component versions --

    /// Stores a new snapshot at `max(version) + 1` for the session.
    ///
    /// Allocation and insert are a single statement inside an immediate
    /// transaction, and `UNIQUE(session_id, version)` rejects any duplicate
    /// that another writer (e.g. a second process) could still race in. A
    /// rejected insert is retried with a fresh read before giving up.
    pub fn save_component_version(
        &self,
        session_id: i64,
        jsx_code: Option<&str>,
        css_code: Option<&str>,
    ) -> Result<ComponentVersion> {
        let version = retry_on_conflict(VERSION_ALLOCATION_ATTEMPTS, || {
            self.insert_next_version(session_id, jsx_code, css_code)
        })?;
        info!("Saved component version {} for session {}", version.version, session_id);
        Ok(version)
    }

    fn insert_next_version(
        &self,
        session_id: i64,
        jsx_code: Option<&str>,
        css_code: Option<&str>,
    ) -> Result<ComponentVersion> {
        self.with_conn_mut(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

            let sql = format!(
                "INSERT INTO component_versions (session_id, jsx_code, css_code, version)
                 SELECT ?1, ?2, ?3, COALESCE(MAX(version), 0) + 1
                 FROM component_versions WHERE session_id = ?1
                 RETURNING {VERSION_COLUMNS}"
            );
            let row = tx.query_row(
                &sql,
                params![session_id, jsx_code, css_code],
                ComponentVersionRow::from_row,
            )?;
            touch_session(&tx, session_id, &row.created_at)?;

            tx.commit()?;
            row.into_model()
        })
    }

    pub fn get_latest_component_version(&self, session_id: i64) -> Result<Option<ComponentVersion>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {VERSION_COLUMNS} FROM component_versions WHERE session_id = ?1
                 ORDER BY version DESC
                 LIMIT 1"
            );
            let row = conn
                .query_row(&sql, [session_id], ComponentVersionRow::from_row)
                .optional()?;
            row.map(ComponentVersionRow::into_model).transpose()
        })
    }

    /// Newest version first.
    pub fn get_component_versions(&self, session_id: i64) -> Result<Vec<ComponentVersion>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {VERSION_COLUMNS} FROM component_versions WHERE session_id = ?1
                 ORDER BY version DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([session_id], ComponentVersionRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ComponentVersionRow::into_model).collect()
        })
    }
}

/// Runs `op` until it succeeds, fails with anything but a conflict, or has
/// been tried `attempts` times.
fn retry_on_conflict<T>(attempts: usize, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(DbError::Conflict(msg)) if attempt < attempts => {
                warn!("Write conflict (attempt {} of {}), retrying: {}", attempt, attempts, msg);
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn query_session(conn: &Connection, session_id: i64, user_id: i64) -> Result<Option<Session>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1 AND user_id = ?2");
    let row = conn
        .query_row(&sql, params![session_id, user_id], SessionRow::from_row)
        .optional()?;
    row.map(SessionRow::into_model).transpose()
}

/// Moves `updated_at` forward to the child's timestamp, never backwards.
fn touch_session(conn: &Connection, session_id: i64, child_created_at: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE sessions SET updated_at = MAX(updated_at, ?2) WHERE id = ?1",
        params![session_id, child_created_at],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user(email: &str) -> (Database, User) {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(email, "hash", Some("Ada")).unwrap();
        (db, user)
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let (db, _) = db_with_user("a@b.com");
        let err = db.create_user("a@b.com", "other", None).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        // Case-sensitive as stored
        assert!(db.create_user("A@b.com", "other", None).is_ok());
    }

    #[test]
    fn user_lookups() {
        let (db, user) = db_with_user("a@b.com");
        let row = db.get_user_by_email("a@b.com").unwrap().unwrap();
        assert_eq!(row.id, user.id);
        assert_eq!(row.password_hash, "hash");
        assert_eq!(db.get_user_by_id(user.id).unwrap().unwrap().name.as_deref(), Some("Ada"));
        assert!(db.get_user_by_email("nobody@b.com").unwrap().is_none());
        assert!(db.get_user_by_id(user.id + 100).unwrap().is_none());
    }

    #[test]
    fn sessions_are_scoped_to_their_owner() {
        let (db, owner) = db_with_user("owner@b.com");
        let other = db.create_user("other@b.com", "hash", None).unwrap();
        let session = db.create_session(owner.id, "Mine").unwrap();

        assert_eq!(db.get_session(session.id, owner.id).unwrap().unwrap(), session);
        assert!(db.get_session(session.id, other.id).unwrap().is_none());
        assert!(db.update_session_title(session.id, other.id, "Stolen").unwrap().is_none());
        assert!(db.get_user_sessions(other.id).unwrap().is_empty());

        let renamed = db.update_session_title(session.id, owner.id, "Renamed").unwrap().unwrap();
        assert_eq!(renamed.title, "Renamed");
        assert!(renamed.updated_at >= session.updated_at);
    }

    #[test]
    fn sessions_order_by_recent_activity() {
        let (db, user) = db_with_user("a@b.com");
        let first = db.create_session(user.id, "first").unwrap();
        let second = db.create_session(user.id, "second").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        db.add_chat_message(first.id, ChatRole::User, "bump").unwrap();

        let ids: Vec<i64> = db.get_user_sessions(user.id).unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn messages_replay_in_submission_order() {
        let (db, user) = db_with_user("a@b.com");
        let session = db.create_session(user.id, DEFAULT_SESSION_TITLE).unwrap();

        let contents = ["one", "two", "three"];
        for (i, content) in contents.iter().enumerate() {
            let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
            db.add_chat_message(session.id, role, content).unwrap();
        }

        let messages = db.get_chat_messages(session.id).unwrap();
        let got: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(got, contents);
        assert_eq!(messages[1].role, ChatRole::Assistant);

        let touched = db.get_session(session.id, user.id).unwrap().unwrap();
        assert!(touched.updated_at >= messages[2].created_at);
    }

    #[test]
    fn recent_messages_are_bounded_and_ascending() {
        let (db, user) = db_with_user("a@b.com");
        let session = db.create_session(user.id, DEFAULT_SESSION_TITLE).unwrap();
        for i in 0..15 {
            db.add_chat_message(session.id, ChatRole::User, &format!("m{}", i)).unwrap();
        }

        let recent = db.get_recent_chat_messages(session.id, 10).unwrap();
        let got: Vec<String> = recent.into_iter().map(|m| m.content).collect();
        let expected: Vec<String> = (5..15).map(|i| format!("m{}", i)).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn message_for_missing_session_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.add_chat_message(42, ChatRole::User, "hello").unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[test]
    fn sequential_versions_are_gap_free() {
        let (db, user) = db_with_user("a@b.com");
        let session = db.create_session(user.id, DEFAULT_SESSION_TITLE).unwrap();
        let other = db.create_session(user.id, "other").unwrap();

        assert!(db.get_latest_component_version(session.id).unwrap().is_none());

        let versions: Vec<i64> = (0..5)
            .map(|i| {
                db.save_component_version(session.id, Some(format!("<V{} />", i).as_str()), Some(""))
                    .unwrap()
                    .version
            })
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);

        // Numbering is per session
        assert_eq!(db.save_component_version(other.id, None, None).unwrap().version, 1);

        let latest = db.get_latest_component_version(session.id).unwrap().unwrap();
        assert_eq!(latest.version, 5);
        assert_eq!(latest.jsx_code.as_deref(), Some("<V4 />"));

        let listed: Vec<i64> = db
            .get_component_versions(session.id)
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(listed, vec![5, 4, 3, 2, 1]);

        let touched = db.get_session(session.id, user.id).unwrap().unwrap();
        assert!(touched.updated_at >= latest.created_at);
    }

    #[test]
    fn conflicts_are_retried_until_success() {
        let mut calls = 0;
        let result = retry_on_conflict(3, || {
            calls += 1;
            if calls < 2 {
                Err(DbError::Conflict("UNIQUE constraint failed".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn retries_stop_at_the_attempt_limit() {
        let mut calls = 0;
        let result: Result<()> = retry_on_conflict(3, || {
            calls += 1;
            Err(DbError::Conflict("UNIQUE constraint failed".into()))
        });
        assert!(matches!(result, Err(DbError::Conflict(_))));
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result: Result<()> = retry_on_conflict(3, || {
            calls += 1;
            Err(DbError::NotFound)
        });
        assert!(matches!(result, Err(DbError::NotFound)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn taken_version_number_surfaces_as_conflict() {
        let (db, user) = db_with_user("a@b.com");
        let session = db.create_session(user.id, DEFAULT_SESSION_TITLE).unwrap();

        // Occupy whatever number the insert is about to claim.
        db.with_conn_mut(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER occupy_version BEFORE INSERT ON component_versions
                 BEGIN
                     INSERT INTO component_versions (session_id, version)
                     VALUES (NEW.session_id, NEW.version);
                 END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = db.save_component_version(session.id, Some("<A />"), None).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        assert!(db.get_component_versions(session.id).unwrap().is_empty());
    }
}
