//! Certificate ledger: an append-only, hash-chained, proof-of-work sealed record of
//! certificate metadata and the SHA-256 fingerprint of each certificate document.
//!
//! The core ([`ledger::Ledger`]) is single-process and in-memory. It is shared through
//! a [`handle::LedgerHandle`] that serialises appends while reads run concurrently,
//! and exposed over HTTP by [`routes::router`].

pub mod config;
pub mod error;
pub mod handle;
pub mod hash;
pub mod ledger;
pub mod model;
pub mod routes;
pub mod storage;
pub mod validation;

use std::sync::Arc;

use config::Config;
use handle::LedgerHandle;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerHandle,
    pub config: Arc<Config>,
}

impl AppState {
    /// Fresh ledger (genesis only) sealed at the configured difficulty.
    pub fn new(config: Config) -> Self {
        AppState {
            ledger: LedgerHandle::new(config.difficulty),
            config: Arc::new(config),
        }
    }
}
