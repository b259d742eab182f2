//! Token estimation and cost computation.
//!
//! Estimation is deliberately pure: the same (provider, text, model) input
//! always yields the same count, so accounting rows are reproducible. OpenAI
//! models with a known encoding get an exact subword count via tiktoken;
//! everything else uses the 4-chars-per-token heuristic.

use std::collections::HashMap;
use std::sync::OnceLock;

use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};
use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base};

use crate::providers::Provider;

/// USD per 1K tokens for requests the rate table does not know about at all.
const GLOBAL_DEFAULT_RATE: (f64, f64) = (0.001, 0.001);

fn cl100k() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| cl100k_base().expect("embedded cl100k vocabulary is valid"))
}

fn o200k() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| o200k_base().expect("embedded o200k vocabulary is valid"))
}

/// `ceil(chars / 4)` with a floor of one token for non-empty text.
fn heuristic_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    (text.chars().count().div_ceil(4)).max(1) as u32
}

/// Estimate the token count of `text` as `model` at `provider` would bill it.
pub fn estimate_tokens(provider: Provider, text: &str, model: &str) -> u32 {
    match provider {
        Provider::OpenAi => match get_tokenizer(model) {
            Some(Tokenizer::Cl100kBase) => cl100k().encode_with_special_tokens(text).len() as u32,
            Some(Tokenizer::O200kBase) => o200k().encode_with_special_tokens(text).len() as u32,
            // Legacy GPT-2/P50k era encodings and unknown models both fall
            // back to the heuristic.
            _ => heuristic_tokens(text),
        },
        Provider::Anthropic | Provider::Gemini => heuristic_tokens(text),
    }
}

/// Static per-(provider, model) price table, USD per 1K tokens.
pub struct RateTable {
    models: HashMap<(Provider, &'static str), (f64, f64)>,
    provider_defaults: HashMap<Provider, (f64, f64)>,
}

impl Default for RateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RateTable {
    pub fn new() -> Self {
        let mut models = HashMap::new();
        models.insert((Provider::OpenAi, "gpt-4o-mini"), (0.005, 0.015));
        models.insert(
            (Provider::Anthropic, "claude-3-haiku-20240307"),
            (0.00025, 0.00125),
        );
        models.insert((Provider::Gemini, "gemini-1.5-flash"), (0.00075, 0.003));

        let mut provider_defaults = HashMap::new();
        provider_defaults.insert(Provider::OpenAi, (0.005, 0.015));
        provider_defaults.insert(Provider::Anthropic, (0.00025, 0.00125));
        provider_defaults.insert(Provider::Gemini, (0.00075, 0.003));

        Self {
            models,
            provider_defaults,
        }
    }

    /// (prompt, completion) rates for a model, falling back to the provider
    /// default, then the global default.
    pub fn rates(&self, provider: Provider, model: &str) -> (f64, f64) {
        self.models
            .get(&(provider, model))
            .or_else(|| self.provider_defaults.get(&provider))
            .copied()
            .unwrap_or(GLOBAL_DEFAULT_RATE)
    }

    /// Cost in USD, rounded half-away-from-zero to six decimal places.
    pub fn compute_cost(
        &self,
        provider: Provider,
        model: &str,
        tokens_in: u32,
        tokens_out: u32,
    ) -> f64 {
        let (rate_in, rate_out) = self.rates(provider, model);
        let raw = (f64::from(tokens_in) / 1000.0) * rate_in
            + (f64::from(tokens_out) / 1000.0) * rate_out;
        round6(raw)
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
