//! Process-scoped access to the ledger: one writer at a time, concurrent readers.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use time::OffsetDateTime;

use crate::error::LedgerError;
use crate::ledger::{CertificatePage, ChainViolation, Ledger, LedgerStats, Verification};
use crate::model::{Block, CertificatePayload};

/// Cloneable handle to the single ledger instance of the process.
///
/// Appends are serialised by `writer`. The proof-of-work runs while holding only
/// that gate, so readers keep seeing the last committed state until the sealed
/// block is pushed under a short write lock. Read methods return owned snapshots.
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    ledger: Arc<RwLock<Ledger>>,
    writer: Arc<Mutex<()>>,
}

impl LedgerHandle {
    pub fn new(difficulty: u32) -> Self {
        Self::from_ledger(Ledger::new(difficulty))
    }

    pub fn from_ledger(ledger: Ledger) -> Self {
        LedgerHandle {
            ledger: Arc::new(RwLock::new(ledger)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    // Appends are a single push, so a panicking holder cannot leave the chain
    // half-written; recover the guard instead of propagating the poison.
    fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seal and append a certificate. Blocks the calling thread for the
    /// proof-of-work; callers on an async runtime should use a blocking task.
    pub fn add_certificate(&self, payload: CertificatePayload) -> Result<Block, LedgerError> {
        let _gate = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let (mut block, difficulty) = {
            let ledger = self.read();
            let block = ledger.prepare_block(payload, OffsetDateTime::now_utc())?;
            (block, ledger.difficulty())
        };

        block.seal(difficulty);

        let mut ledger = self.write();
        let appended = ledger.append(block)?.clone();
        Ok(appended)
    }

    pub fn latest_block(&self) -> Block {
        self.read().latest_block().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn certificate_count(&self) -> usize {
        self.read().certificate_count()
    }

    pub fn difficulty(&self) -> u32 {
        self.read().difficulty()
    }

    pub fn is_chain_valid(&self) -> bool {
        self.read().is_chain_valid()
    }

    pub fn violations(&self) -> Vec<ChainViolation> {
        self.read().violations()
    }

    pub fn find_certificate_by_certificate_id(&self, certificate_id: &str) -> Option<Block> {
        self.read()
            .find_certificate_by_certificate_id(certificate_id)
            .cloned()
    }

    pub fn find_certificates_by_entity_id(&self, entity_id: &str) -> Vec<Block> {
        self.read()
            .find_certificates_by_entity_id(entity_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn get_certificates(&self, page: usize, page_size: usize) -> CertificatePage {
        self.read().get_certificates(page, page_size)
    }

    pub fn get_stats(&self) -> LedgerStats {
        self.read().get_stats()
    }

    pub fn verify_certificate_pdf(&self, certificate_id: &str, pdf_hash: &str) -> Verification {
        self.read().verify_certificate_pdf(certificate_id, pdf_hash)
    }
}
