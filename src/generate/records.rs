//! Request accounting records.
//!
//! One row per generation attempt that got past admission and credential
//! resolution. A record is created once and finalized exactly once; nothing
//! in the backend ever deletes one.

use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::providers::Provider;

/// Lifecycle states of an accounting record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Started,
    Streaming,
    Success,
    Error,
    Canceled,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Streaming => "streaming",
            Self::Success => "success",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "streaming" => Some(Self::Streaming),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub id: String,
    pub user_id: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub model: String,
    pub provider: Provider,
    pub prompt_hash: Option<String>,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub cost_usd: Option<f64>,
    pub status: RecordStatus,
    pub created_at: String,
}

/// Fields known at record-creation time.
#[derive(Debug)]
pub struct NewRecord<'a> {
    pub user_id: &'a str,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub model: &'a str,
    pub provider: Provider,
    pub prompt_hash: Option<String>,
    /// Eagerly estimated for streaming requests, absent for blocking ones.
    pub tokens_in: Option<u32>,
    pub status: RecordStatus,
}

const RECORD_COLUMNS: &str = "id, user_id, domain, path, model, provider, prompt_hash, \
     tokens_in, tokens_out, cost_usd, status, created_at";

fn row_to_record(row: &Row) -> Result<RequestRecord, rusqlite::Error> {
    let provider: String = row.get(5)?;
    let status: String = row.get(10)?;
    Ok(RequestRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        domain: row.get(2)?,
        path: row.get(3)?,
        model: row.get(4)?,
        provider: provider.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                format!("bad provider tag: {provider}").into(),
            )
        })?,
        prompt_hash: row.get(6)?,
        tokens_in: row.get(7)?,
        tokens_out: row.get(8)?,
        cost_usd: row.get(9)?,
        status: RecordStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                10,
                rusqlite::types::Type::Text,
                format!("bad status: {status}").into(),
            )
        })?,
        created_at: row.get(11)?,
    })
}

/// Insert and return a new accounting record.
pub fn create(db: &Database, new: NewRecord<'_>) -> Result<RequestRecord, rusqlite::Error> {
    let id = Uuid::new_v4().to_string();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO requests \
             (id, user_id, domain, path, model, provider, prompt_hash, tokens_in, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                new.user_id,
                new.domain,
                new.path,
                new.model,
                new.provider.as_str(),
                new.prompt_hash,
                new.tokens_in,
                new.status.as_str(),
            ],
        )?;
        conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM requests WHERE id = ?1"),
            params![id],
            row_to_record,
        )
    })
}

/// Finalize as `success` with full token and cost figures.
pub fn finalize_success(
    db: &Database,
    id: &str,
    tokens_in: u32,
    tokens_out: u32,
    cost_usd: f64,
) -> Result<(), rusqlite::Error> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE requests SET status = 'success', tokens_in = ?1, tokens_out = ?2, \
             cost_usd = ?3 WHERE id = ?4",
            params![tokens_in, tokens_out, cost_usd, id],
        )?;
        Ok(())
    })
}

/// Finalize as `error`. Token and cost columns are left untouched: no output
/// was delivered, so nothing is billed.
pub fn finalize_error(db: &Database, id: &str) -> Result<(), rusqlite::Error> {
    db.with_conn(|conn| {
        conn.execute("UPDATE requests SET status = 'error' WHERE id = ?1", params![id])?;
        Ok(())
    })
}

/// Finalize as `canceled` with partial credit: the deltas already forwarded
/// count as billed output.
pub fn finalize_canceled(
    db: &Database,
    id: &str,
    tokens_out: u32,
    cost_usd: f64,
) -> Result<(), rusqlite::Error> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE requests SET status = 'canceled', tokens_out = ?1, cost_usd = ?2 \
             WHERE id = ?3",
            params![tokens_out, cost_usd, id],
        )?;
        Ok(())
    })
}

pub fn get(db: &Database, id: &str) -> Result<Option<RequestRecord>, rusqlite::Error> {
    db.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM requests WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()
    })
}

/// A user's records, newest first.
pub fn list_for_user(
    db: &Database,
    user_id: &str,
    limit: u32,
) -> Result<Vec<RequestRecord>, rusqlite::Error> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM requests WHERE user_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![user_id, limit], row_to_record)?;
        rows.collect()
    })
}

pub fn count_for_user(db: &Database, user_id: &str) -> Result<u64, rusqlite::Error> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
    })
}

/// Tokens consumed (in + out) by a user since `since` (ISO-8601 UTC).
pub fn tokens_used_since(
    db: &Database,
    user_id: &str,
    since: &str,
) -> Result<u64, rusqlite::Error> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT COALESCE(SUM(COALESCE(tokens_in, 0) + COALESCE(tokens_out, 0)), 0) \
             FROM requests WHERE user_id = ?1 AND created_at >= ?2",
            params![user_id, since],
            |row| row.get(0),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::users::create_user;

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let user = create_user(&db, "a@b.c", "hash").unwrap();
        (db, user.id)
    }

    fn new_record<'a>(user_id: &'a str, status: RecordStatus) -> NewRecord<'a> {
        NewRecord {
            user_id,
            domain: Some("mail.example.com".into()),
            path: Some("/inbox".into()),
            model: "gpt-4o-mini",
            provider: Provider::OpenAi,
            prompt_hash: Some("abc123".into()),
            tokens_in: None,
            status,
        }
    }

    #[test]
    fn test_create_and_finalize_success() {
        let (db, user) = setup();
        let record = create(&db, new_record(&user, RecordStatus::Started)).unwrap();
        assert_eq!(record.status, RecordStatus::Started);
        assert!(record.tokens_in.is_none());

        finalize_success(&db, &record.id, 4, 40, 0.00062).unwrap();
        let updated = get(&db, &record.id).unwrap().unwrap();
        assert_eq!(updated.status, RecordStatus::Success);
        assert_eq!(updated.tokens_in, Some(4));
        assert_eq!(updated.tokens_out, Some(40));
        assert_eq!(updated.cost_usd, Some(0.00062));
    }

    #[test]
    fn test_streaming_record_eager_tokens_in() {
        let (db, user) = setup();
        let mut new = new_record(&user, RecordStatus::Streaming);
        new.tokens_in = Some(7);
        let record = create(&db, new).unwrap();
        assert_eq!(record.status, RecordStatus::Streaming);
        assert_eq!(record.tokens_in, Some(7));
    }

    #[test]
    fn test_finalize_error_leaves_tokens_untouched() {
        let (db, user) = setup();
        let mut new = new_record(&user, RecordStatus::Streaming);
        new.tokens_in = Some(7);
        let record = create(&db, new).unwrap();

        finalize_error(&db, &record.id).unwrap();
        let updated = get(&db, &record.id).unwrap().unwrap();
        assert_eq!(updated.status, RecordStatus::Error);
        assert_eq!(updated.tokens_in, Some(7));
        assert!(updated.tokens_out.is_none());
        assert!(updated.cost_usd.is_none());
    }

    #[test]
    fn test_finalize_canceled_records_partial_credit() {
        let (db, user) = setup();
        let mut new = new_record(&user, RecordStatus::Streaming);
        new.tokens_in = Some(7);
        let record = create(&db, new).unwrap();

        finalize_canceled(&db, &record.id, 12, 0.000215).unwrap();
        let updated = get(&db, &record.id).unwrap().unwrap();
        assert_eq!(updated.status, RecordStatus::Canceled);
        assert_eq!(updated.tokens_out, Some(12));
        assert_eq!(updated.cost_usd, Some(0.000215));
    }

    #[test]
    fn test_list_newest_first_and_scoped() {
        let (db, user) = setup();
        let other = create_user(&db, "x@y.z", "hash").unwrap();
        let first = create(&db, new_record(&user, RecordStatus::Started)).unwrap();
        let second = create(&db, new_record(&user, RecordStatus::Started)).unwrap();
        create(&db, new_record(&other.id, RecordStatus::Started)).unwrap();

        let listed = list_for_user(&db, &user, 10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);

        assert_eq!(list_for_user(&db, &user, 1).unwrap().len(), 1);
        assert_eq!(count_for_user(&db, &user).unwrap(), 2);
    }

    #[test]
    fn test_tokens_used_since() {
        let (db, user) = setup();
        let a = create(&db, new_record(&user, RecordStatus::Started)).unwrap();
        finalize_success(&db, &a.id, 10, 30, 0.001).unwrap();
        let b = create(&db, new_record(&user, RecordStatus::Started)).unwrap();
        finalize_error(&db, &b.id).unwrap();

        let used = tokens_used_since(&db, &user, "1970-01-01 00:00:00").unwrap();
        assert_eq!(used, 40);
        let none = tokens_used_since(&db, &user, "2999-01-01 00:00:00").unwrap();
        assert_eq!(none, 0);
    }
}
