//! Encrypted per-user provider API keys.
//!
//! Credentials are create/delete only. A user may hold several keys for the
//! same provider; resolution always picks the newest, so uploading a
//! replacement takes effect without deleting the old one first.

use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::KeyCipher;
use crate::db::Database;
use crate::providers::Provider;

/// A stored credential, ciphertext included. Never leaves the backend.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub id: String,
    pub user_id: String,
    pub provider: Provider,
    pub key_ciphertext: String,
    pub key_type: String,
    pub created_at: String,
}

/// The caller-visible view of a credential: metadata only.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    pub id: String,
    pub provider: Provider,
    pub key_type: String,
    pub created_at: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no {0} key configured")]
    NotFound(Provider),
    #[error("stored {0} key could not be decrypted")]
    Invalid(Provider),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

fn row_to_credential(row: &Row) -> Result<StoredCredential, rusqlite::Error> {
    let provider: String = row.get(2)?;
    Ok(StoredCredential {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: provider.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("bad provider tag: {provider}").into(),
            )
        })?,
        key_ciphertext: row.get(3)?,
        key_type: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const KEY_COLUMNS: &str = "id, user_id, provider, key_ciphertext, key_type, created_at";

/// Encrypt and store a new credential for a user.
pub fn create_key(
    db: &Database,
    cipher: &KeyCipher,
    user_id: &str,
    provider: Provider,
    plaintext_key: &str,
) -> Result<CredentialSummary, rusqlite::Error> {
    let id = Uuid::new_v4().to_string();
    let ciphertext = cipher.encrypt(plaintext_key);
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO provider_keys (id, user_id, provider, key_ciphertext) \
             VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, provider.as_str(), ciphertext],
        )?;
        conn.query_row(
            &format!("SELECT {KEY_COLUMNS} FROM provider_keys WHERE id = ?1"),
            params![id],
            |row| {
                let cred = row_to_credential(row)?;
                Ok(CredentialSummary {
                    id: cred.id,
                    provider: cred.provider,
                    key_type: cred.key_type,
                    created_at: cred.created_at,
                })
            },
        )
    })
}

/// All of a user's credentials, newest first, metadata only.
pub fn list_keys(db: &Database, user_id: &str) -> Result<Vec<CredentialSummary>, rusqlite::Error> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, provider, key_type, created_at FROM provider_keys \
             WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let provider: String = row.get(1)?;
            Ok(CredentialSummary {
                id: row.get(0)?,
                provider: provider.parse().map_err(|_| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        format!("bad provider tag: {provider}").into(),
                    )
                })?,
                key_type: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        rows.collect()
    })
}

/// Delete a credential the user owns. Returns false when no such key.
pub fn delete_key(db: &Database, user_id: &str, key_id: &str) -> Result<bool, rusqlite::Error> {
    let changed = db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM provider_keys WHERE id = ?1 AND user_id = ?2",
            params![key_id, user_id],
        )
    })?;
    Ok(changed > 0)
}

/// Resolve the plaintext API key a user has on file for a provider.
///
/// Picks the most recently created credential. A key that exists but fails
/// to decrypt is an operator problem, not an absent key, and must not fall
/// through to an older credential.
pub fn resolve_key(
    db: &Database,
    cipher: &KeyCipher,
    user_id: &str,
    provider: Provider,
) -> Result<String, ResolveError> {
    let credential = db.with_conn(|conn| {
        conn.query_row(
            &format!(
                "SELECT {KEY_COLUMNS} FROM provider_keys \
                 WHERE user_id = ?1 AND provider = ?2 \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            params![user_id, provider.as_str()],
            row_to_credential,
        )
        .optional()
    })?;

    let credential = credential.ok_or(ResolveError::NotFound(provider))?;
    cipher.decrypt(&credential.key_ciphertext).map_err(|err| {
        tracing::error!(
            error = %err,
            key_id = %credential.id,
            provider = %provider,
            "Stored credential failed to decrypt"
        );
        ResolveError::Invalid(provider)
    })
}
