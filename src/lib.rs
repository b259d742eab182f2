pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod estimator;
pub mod generate;
pub mod keys;
pub mod plans;
pub mod providers;
pub mod ratelimit;

use std::sync::Arc;

use crate::config::Config;
use crate::crypto::KeyCipher;
use crate::db::Database;
use crate::generate::Orchestrator;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub cipher: KeyCipher,
    pub orchestrator: Orchestrator,
}
