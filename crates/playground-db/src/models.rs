//! Database row types. These map directly to SQLite rows and are converted
//! into `playground-types` models at the crate boundary.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;

use playground_types::models::{ChatMessage, ComponentVersion, Session, User};

use crate::error::{DbError, Result};

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            name: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    pub fn to_user(&self) -> Result<User> {
        Ok(User {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub(crate) struct SessionRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    pub(crate) fn into_model(self) -> Result<Session> {
        Ok(Session {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

pub(crate) struct ChatMessageRow {
    pub id: i64,
    pub session_id: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl ChatMessageRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    pub(crate) fn into_model(self) -> Result<ChatMessage> {
        Ok(ChatMessage {
            id: self.id,
            session_id: self.session_id,
            role: self.role.parse().map_err(DbError::Corrupt)?,
            content: self.content,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub(crate) struct ComponentVersionRow {
    pub id: i64,
    pub session_id: i64,
    pub jsx_code: Option<String>,
    pub css_code: Option<String>,
    pub version: i64,
    pub created_at: String,
}

impl ComponentVersionRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            jsx_code: row.get(2)?,
            css_code: row.get(3)?,
            version: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub(crate) fn into_model(self) -> Result<ComponentVersion> {
        Ok(ComponentVersion {
            id: self.id,
            session_id: self.session_id,
            jsx_code: self.jsx_code,
            css_code: self.css_code,
            version: self.version,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS[.fff]" without timezone.
/// Parse as naive UTC; accept RFC 3339 for rows written by other tools.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .or_else(|_| raw.parse::<DateTime<Utc>>())
        .map_err(|e| DbError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_sqlite_timestamps() {
        let ts = parse_timestamp("2024-05-01 10:20:30.456").unwrap();
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.nanosecond(), 456_000_000);

        let ts = parse_timestamp("2024-05-01 10:20:30").unwrap();
        assert_eq!(ts.second(), 30);
    }

    #[test]
    fn parses_rfc3339() {
        assert!(parse_timestamp("2024-05-01T10:20:30Z").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_timestamp("yesterday"), Err(DbError::Corrupt(_))));
    }
}
