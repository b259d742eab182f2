//! Generation orchestration.
//!
//! One request's path through the backend: admission, credential
//! resolution, accounting record creation, adapter invocation, and
//! finalization. The orchestrator owns the record for the duration of the
//! call; nothing else touches it.

pub mod records;
pub mod stream;

use std::sync::Arc;

use sha2::{Digest, Sha256};
use url::Url;

use crate::db::Database;
use crate::error::AppError;
use crate::estimator::{RateTable, estimate_tokens};
use crate::keys::{self, ResolveError};
use crate::providers::{AdapterRegistry, GenerationRequest, GenerationResponse, build_prompt};
use crate::ratelimit::RateLimiter;
use records::{NewRecord, RecordStatus};
use stream::RecordingStream;

#[derive(Clone)]
pub struct Orchestrator {
    db: Database,
    limiter: RateLimiter,
    cipher: crate::crypto::KeyCipher,
    rates: Arc<RateTable>,
    adapters: AdapterRegistry,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        limiter: RateLimiter,
        cipher: crate::crypto::KeyCipher,
        rates: Arc<RateTable>,
        adapters: AdapterRegistry,
    ) -> Self {
        Self {
            db,
            limiter,
            cipher,
            rates,
            adapters,
        }
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    /// Admission and credential resolution, shared by both modes. Runs
    /// before any record exists, so rejections leave no trace.
    fn admit_and_resolve(
        &self,
        user_id: &str,
        req: &GenerationRequest,
    ) -> Result<String, AppError> {
        let admission = self.limiter.admit(user_id);
        if !admission.allowed {
            return Err(AppError::RateLimited(format!(
                "{} requests per minute",
                self.limiter.quota()
            )));
        }

        if !req.use_user_key {
            return Err(AppError::BadRequest(
                "server-managed provider keys are not supported".into(),
            ));
        }

        keys::resolve_key(&self.db, &self.cipher, user_id, req.provider).map_err(|err| match err {
            ResolveError::NotFound(p) => AppError::CredentialNotFound(p.to_string()),
            ResolveError::Invalid(p) => AppError::CredentialInvalid(p.to_string()),
            ResolveError::Db(e) => e.into(),
        })
    }

    fn create_record(
        &self,
        user_id: &str,
        req: &GenerationRequest,
        status: RecordStatus,
        tokens_in: Option<u32>,
    ) -> Result<records::RequestRecord, AppError> {
        let (domain, path) = context_location(req);
        let record = records::create(
            &self.db,
            NewRecord {
                user_id,
                domain,
                path,
                model: &req.model,
                provider: req.provider,
                prompt_hash: Some(sha256_hex(&req.prompt)),
                tokens_in,
                status,
            },
        )?;
        Ok(record)
    }

    /// Blocking generation: full text in, full text out.
    pub async fn generate(
        &self,
        user_id: &str,
        req: &GenerationRequest,
    ) -> Result<GenerationResponse, AppError> {
        let api_key = self.admit_and_resolve(user_id, req)?;
        let adapter = self
            .adapters
            .adapter_for(req.provider)
            .ok_or_else(|| AppError::UnsupportedProvider(req.provider.to_string()))?;

        let record = self.create_record(user_id, req, RecordStatus::Started, None)?;

        match adapter.generate(req, &api_key).await {
            Ok(response) => {
                let prompt = build_prompt(req);
                let tokens_in = estimate_tokens(req.provider, &prompt, &req.model);
                let tokens_out = estimate_tokens(req.provider, &response.text, &req.model);
                let cost = self
                    .rates
                    .compute_cost(req.provider, &req.model, tokens_in, tokens_out);

                // Output exists; an accounting write failure must not turn
                // this into a generation failure.
                if let Err(err) =
                    records::finalize_success(&self.db, &record.id, tokens_in, tokens_out, cost)
                {
                    tracing::error!(
                        error = %err,
                        record_id = %record.id,
                        "Failed to finalize record as success"
                    );
                }
                Ok(response)
            }
            Err(err) => {
                if let Err(persist_err) = records::finalize_error(&self.db, &record.id) {
                    tracing::error!(
                        error = %persist_err,
                        record_id = %record.id,
                        "Failed to finalize record as error"
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Streaming generation: a [`RecordingStream`] that forwards deltas and
    /// finalizes the accounting record when the stream ends, fails, or is
    /// dropped.
    pub async fn generate_stream(
        &self,
        user_id: &str,
        req: &GenerationRequest,
    ) -> Result<RecordingStream, AppError> {
        let api_key = self.admit_and_resolve(user_id, req)?;
        let adapter = self
            .adapters
            .adapter_for(req.provider)
            .ok_or_else(|| AppError::UnsupportedProvider(req.provider.to_string()))?;

        // The input side of the bill is known up front; persist it before
        // any output exists so an interrupted stream still has it.
        let prompt = build_prompt(req);
        let tokens_in = estimate_tokens(req.provider, &prompt, &req.model);
        let record =
            self.create_record(user_id, req, RecordStatus::Streaming, Some(tokens_in))?;

        let deltas = match adapter.generate_stream(req, &api_key).await {
            Ok(deltas) => deltas,
            Err(err) => {
                // Nothing was forwarded; this is a clean error.
                if let Err(persist_err) = records::finalize_error(&self.db, &record.id) {
                    tracing::error!(
                        error = %persist_err,
                        record_id = %record.id,
                        "Failed to finalize record as error"
                    );
                }
                return Err(err.into());
            }
        };

        Ok(RecordingStream::new(
            deltas,
            self.db.clone(),
            self.rates.clone(),
            record.id,
            req.provider,
            req.model.clone(),
            tokens_in,
        ))
    }
}

fn sha256_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Split the context URL into (domain, path) for the accounting record.
fn context_location(req: &GenerationRequest) -> (Option<String>, Option<String>) {
    let Some(url) = req.context.as_ref().and_then(|c| c.url.as_deref()) else {
        return (None, None);
    };
    match Url::parse(url) {
        Ok(parsed) => (
            parsed.host_str().map(String::from),
            Some(parsed.path().to_string()),
        ),
        Err(_) => (None, None),
    }
}
