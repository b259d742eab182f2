//! Subscription plans and their monthly token quotas.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::db::Database;

/// Quota applied when a user carries a plan tag the table does not know.
pub const DEFAULT_TOKEN_QUOTA: u64 = 5000;

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub name: String,
    pub monthly_price: f64,
    pub token_quota: u64,
}

pub fn get_plan(db: &Database, name: &str) -> Result<Option<Plan>, rusqlite::Error> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT name, monthly_price, token_quota FROM plans WHERE name = ?1",
            params![name],
            |row| {
                Ok(Plan {
                    name: row.get(0)?,
                    monthly_price: row.get(1)?,
                    token_quota: row.get(2)?,
                })
            },
        )
        .optional()
    })
}

/// Monthly token quota for a plan tag, defaulting for unknown tags.
pub fn token_quota(db: &Database, plan_name: &str) -> Result<u64, rusqlite::Error> {
    Ok(get_plan(db, plan_name)?
        .map(|p| p.token_quota)
        .unwrap_or(DEFAULT_TOKEN_QUOTA))
}
