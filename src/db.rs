use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Thread-safe database handle wrapping a SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path with WAL mode.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, rusqlite::Error>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self.conn.lock().expect("database mutex poisoned");
        f(&conn)
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })?;
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY,
    email           TEXT NOT NULL UNIQUE,
    password_hash   TEXT NOT NULL,
    plan            TEXT NOT NULL DEFAULT 'Basic',
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS provider_keys (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    provider        TEXT NOT NULL CHECK (provider IN ('openai', 'anthropic', 'gemini')),
    key_ciphertext  TEXT NOT NULL,
    key_type        TEXT NOT NULL DEFAULT 'user_provided',
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_provider_keys_user ON provider_keys(user_id, provider);

CREATE TABLE IF NOT EXISTS requests (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    domain          TEXT,
    path            TEXT,
    model           TEXT NOT NULL,
    provider        TEXT NOT NULL,
    prompt_hash     TEXT,
    tokens_in       INTEGER,
    tokens_out      INTEGER,
    cost_usd        REAL,
    status          TEXT NOT NULL DEFAULT 'started'
                    CHECK (status IN ('started', 'streaming', 'success', 'error', 'canceled')),
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_requests_user ON requests(user_id);
CREATE INDEX IF NOT EXISTS idx_requests_domain ON requests(domain);
CREATE INDEX IF NOT EXISTS idx_requests_created ON requests(created_at);

CREATE TABLE IF NOT EXISTS plans (
    name            TEXT PRIMARY KEY,
    monthly_price   REAL NOT NULL DEFAULT 0.0,
    token_quota     INTEGER NOT NULL DEFAULT 5000,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);
INSERT OR IGNORE INTO plans (name, monthly_price, token_quota) VALUES ('Basic', 0.0, 5000);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_creates_schema() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                    [],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert!(count >= 4);
    }

    #[test]
    fn test_default_plan_seeded() {
        let db = Database::open_in_memory().unwrap();
        let quota: i64 = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT token_quota FROM plans WHERE name = 'Basic'",
                    [],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert_eq!(quota, 5000);
    }

    #[test]
    fn test_provider_check_constraint() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password_hash) VALUES ('u1', 'a@b.c', 'x')",
                [],
            )
        })
        .unwrap();

        let result = db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO provider_keys (id, user_id, provider, key_ciphertext) \
                 VALUES ('k1', 'u1', 'mystery', 'ct')",
                [],
            )
        });
        assert!(result.is_err());
    }
}
