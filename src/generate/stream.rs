//! Accounting wrapper around an adapter delta stream.
//!
//! [`RecordingStream`] forwards deltas unbuffered while keeping a running
//! output-token total, and guarantees the accounting record reaches a
//! terminal status exactly once -- on exhaustion, on upstream failure, or on
//! drop when the client walks away mid-stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;

use crate::db::Database;
use crate::estimator::{RateTable, estimate_tokens};
use crate::generate::records;
use crate::providers::{DeltaStream, Provider};

/// Events forwarded to the client during a streamed generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental text fragment.
    Delta(String),
    /// Upstream failed before producing any output. Terminal.
    Error(String),
    /// Clean end-of-stream sentinel. Terminal.
    Done,
}

enum Phase {
    Streaming,
    Finished,
}

pub struct RecordingStream {
    inner: DeltaStream,
    db: Database,
    rates: Arc<RateTable>,
    record_id: String,
    provider: Provider,
    model: String,
    tokens_in: u32,
    tokens_out: u32,
    forwarded: u64,
    phase: Phase,
}

impl std::fmt::Debug for RecordingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingStream")
            .field("record_id", &self.record_id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("tokens_in", &self.tokens_in)
            .field("tokens_out", &self.tokens_out)
            .field("forwarded", &self.forwarded)
            .finish_non_exhaustive()
    }
}

impl RecordingStream {
    pub fn new(
        inner: DeltaStream,
        db: Database,
        rates: Arc<RateTable>,
        record_id: String,
        provider: Provider,
        model: String,
        tokens_in: u32,
    ) -> Self {
        Self {
            inner,
            db,
            rates,
            record_id,
            provider,
            model,
            tokens_in,
            tokens_out: 0,
            forwarded: 0,
            phase: Phase::Streaming,
        }
    }

    fn cost(&self) -> f64 {
        self.rates
            .compute_cost(self.provider, &self.model, self.tokens_in, self.tokens_out)
    }

    /// Accounting writes after output has flowed must never surface as a
    /// generation failure; a failed write is logged and the stream goes on.
    fn finalize_success(&mut self) {
        self.phase = Phase::Finished;
        if let Err(err) =
            records::finalize_success(&self.db, &self.record_id, self.tokens_in, self.tokens_out, self.cost())
        {
            tracing::error!(
                error = %err,
                record_id = %self.record_id,
                "Failed to finalize streaming record as success"
            );
        }
    }

    fn finalize_canceled(&mut self) {
        self.phase = Phase::Finished;
        if let Err(err) =
            records::finalize_canceled(&self.db, &self.record_id, self.tokens_out, self.cost())
        {
            tracing::error!(
                error = %err,
                record_id = %self.record_id,
                "Failed to finalize streaming record as canceled"
            );
        }
    }

    fn finalize_error(&mut self) {
        self.phase = Phase::Finished;
        if let Err(err) = records::finalize_error(&self.db, &self.record_id) {
            tracing::error!(
                error = %err,
                record_id = %self.record_id,
                "Failed to finalize streaming record as error"
            );
        }
    }
}

impl Stream for RecordingStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if matches!(this.phase, Phase::Finished) {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(delta))) => {
                this.tokens_out += estimate_tokens(this.provider, &delta, &this.model);
                this.forwarded += 1;
                Poll::Ready(Some(StreamEvent::Delta(delta)))
            }
            Poll::Ready(Some(Err(err))) => {
                if this.forwarded > 0 {
                    // Output already reached the client: partial credit, and
                    // no synthetic error event -- the stream just ends.
                    tracing::warn!(
                        error = %err,
                        record_id = %this.record_id,
                        forwarded = this.forwarded,
                        "Upstream failed mid-stream, recording partial output"
                    );
                    this.finalize_canceled();
                    Poll::Ready(None)
                } else {
                    this.finalize_error();
                    Poll::Ready(Some(StreamEvent::Error(err.to_string())))
                }
            }
            Poll::Ready(None) => {
                this.finalize_success();
                Poll::Ready(Some(StreamEvent::Done))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RecordingStream {
    fn drop(&mut self) {
        // Client disconnected before the stream ran to completion. Whatever
        // was already sent is committed output.
        if matches!(self.phase, Phase::Streaming) {
            tracing::info!(
                record_id = %self.record_id,
                forwarded = self.forwarded,
                "Stream dropped before completion, recording as canceled"
            );
            self.finalize_canceled();
        }
    }
}
