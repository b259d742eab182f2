//! User account storage.

use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub plan: String,
    pub created_at: String,
}

fn row_to_user(row: &Row) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        plan: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const USER_COLUMNS: &str = "id, email, password_hash, plan, created_at";

/// Insert a new user. Fails on duplicate email (UNIQUE constraint).
pub fn create_user(
    db: &Database,
    email: &str,
    password_hash: &str,
) -> Result<User, rusqlite::Error> {
    let id = Uuid::new_v4().to_string();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO users (id, email, password_hash) VALUES (?1, ?2, ?3)",
            params![id, email, password_hash],
        )?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
    })
}

pub fn find_by_email(db: &Database, email: &str) -> Result<Option<User>, rusqlite::Error> {
    db.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            row_to_user,
        )
        .optional()
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<User>, rusqlite::Error> {
    db.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
        .optional()
    })
}

/// Set a user's plan tag. Returns false when the user does not exist.
pub fn update_plan(db: &Database, user_id: &str, plan: &str) -> Result<bool, rusqlite::Error> {
    let changed = db.with_conn(|conn| {
        conn.execute(
            "UPDATE users SET plan = ?1 WHERE id = ?2",
            params![plan, user_id],
        )
    })?;
    Ok(changed > 0)
}
