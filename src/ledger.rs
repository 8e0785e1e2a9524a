//! The append-only certificate ledger: chain construction, proof-of-work sealing,
//! linkage validation, lookups and the document verification protocol.

use std::collections::HashMap;

use serde::Serialize;
use time::macros::datetime;
use time::OffsetDateTime;

use crate::error::LedgerError;
use crate::hash::{meets_difficulty, DIGEST_HEX_LEN};
use crate::model::{Block, CertificatePayload, CertificateType, Metadata};

/// Leading zero hex digits required of every sealed certificate block.
pub const DEFAULT_DIFFICULTY: u32 = 4;

pub const GENESIS_CERTIFICATE_ID: &str = "GENESIS";

/// `preceding_hash` of the genesis block.
pub const GENESIS_PRECEDING_HASH: &str = "0";

/// A single integrity failure found while scanning the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChainViolation {
    #[error("block {index} has invalid hash")]
    HashMismatch { index: u64 },
    #[error("block {index} has invalid preceding hash")]
    BrokenLink { index: u64 },
    #[error("block {index} does not meet difficulty {difficulty}")]
    InsufficientWork { index: u64, difficulty: u32 },
    #[error("block index {found} out of sequence, expected {expected}")]
    OutOfSequence { expected: u64, found: u64 },
}

impl ChainViolation {
    pub fn index(&self) -> u64 {
        match *self {
            ChainViolation::HashMismatch { index }
            | ChainViolation::BrokenLink { index }
            | ChainViolation::InsufficientWork { index, .. } => index,
            ChainViolation::OutOfSequence { found, .. } => found,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePage {
    pub items: Vec<Block>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total_certificates: usize,
    pub is_valid: bool,
    pub difficulty: u32,
    /// Payload of the tail block (the genesis payload while the ledger is empty).
    pub latest_certificate: CertificatePayload,
    pub company_certificates: usize,
    pub product_certificates: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationOutcome {
    Authentic,
    NotFound,
    /// The presented document does not match the registered fingerprint.
    HashMismatch,
    /// The fingerprint matches but the containing block fails its self-check.
    BlockCorrupted,
}

impl VerificationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationOutcome::Authentic)
    }

    pub fn message(&self) -> &'static str {
        match self {
            VerificationOutcome::Authentic => "Certificate is authentic and verified",
            VerificationOutcome::NotFound => "Certificate not found in ledger",
            VerificationOutcome::HashMismatch => {
                "PDF has been tampered with - hash does not match ledger record"
            }
            VerificationOutcome::BlockCorrupted => "Ledger block has been corrupted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub is_valid: bool,
    pub outcome: VerificationOutcome,
    pub block: Option<Block>,
    pub message: &'static str,
}

impl Verification {
    fn new(outcome: VerificationOutcome, block: Option<&Block>) -> Self {
        Verification {
            is_valid: outcome.is_valid(),
            outcome,
            block: block.cloned(),
            message: outcome.message(),
        }
    }
}

/// Ordered, append-only sequence of blocks starting at genesis.
///
/// Certificate blocks live in `certificates`; chain index `i > 0` is
/// `certificates[i - 1]`. The id and entity maps are lookup accelerators only and
/// preserve ledger order for multi-result queries.
#[derive(Debug, Clone)]
pub struct Ledger {
    genesis: Block,
    certificates: Vec<Block>,
    difficulty: u32,
    by_certificate_id: HashMap<String, usize>,
    by_entity_id: HashMap<String, Vec<usize>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger::new(DEFAULT_DIFFICULTY)
    }
}

impl Ledger {
    pub fn new(difficulty: u32) -> Self {
        Ledger {
            genesis: genesis_block(),
            certificates: Vec::new(),
            difficulty,
            by_certificate_id: HashMap::new(),
            by_entity_id: HashMap::new(),
        }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Number of blocks including genesis. Never zero.
    pub fn len(&self) -> usize {
        self.certificates.len() + 1
    }

    /// Number of certificate (non-genesis) blocks.
    pub fn certificate_count(&self) -> usize {
        self.certificates.len()
    }

    pub fn genesis(&self) -> &Block {
        &self.genesis
    }

    /// All blocks in chain order, genesis first.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        std::iter::once(&self.genesis).chain(self.certificates.iter())
    }

    pub fn latest_block(&self) -> &Block {
        self.certificates.last().unwrap_or(&self.genesis)
    }

    /// Seal `payload` into a new block and append it.
    ///
    /// Blocks the calling thread for the whole proof-of-work search.
    pub fn add_certificate(&mut self, payload: CertificatePayload) -> Result<Block, LedgerError> {
        let mut block = self.prepare_block(payload, OffsetDateTime::now_utc())?;
        block.seal(self.difficulty);
        self.append(block).cloned()
    }

    /// Build the unsealed successor of the current tail.
    pub fn prepare_block(
        &self,
        payload: CertificatePayload,
        timestamp: OffsetDateTime,
    ) -> Result<Block, LedgerError> {
        self.ensure_unregistered(&payload.certificate_id)?;
        let tail = self.latest_block();
        Ok(Block::new(
            self.len() as u64,
            timestamp,
            payload,
            tail.hash.clone(),
        ))
    }

    /// Append a sealed block after re-checking it against the current tail.
    /// Nothing is appended on error.
    pub fn append(&mut self, block: Block) -> Result<&Block, LedgerError> {
        self.ensure_unregistered(&block.payload.certificate_id)?;

        let expected = self.len() as u64;
        if block.index != expected {
            return Err(LedgerError::Rejected(ChainViolation::OutOfSequence {
                expected,
                found: block.index,
            }));
        }
        if block.preceding_hash != self.latest_block().hash {
            return Err(LedgerError::Rejected(ChainViolation::BrokenLink {
                index: block.index,
            }));
        }
        if !block.is_valid() {
            return Err(LedgerError::Rejected(ChainViolation::HashMismatch {
                index: block.index,
            }));
        }
        if block.difficulty != self.difficulty || !block.has_valid_work() {
            return Err(LedgerError::Rejected(ChainViolation::InsufficientWork {
                index: block.index,
                difficulty: self.difficulty,
            }));
        }

        tracing::info!(
            index = block.index,
            certificate_id = %block.payload.certificate_id,
            hash = %block.hash,
            nonce = block.nonce,
            "certificate appended"
        );

        let position = self.certificates.len();
        self.by_certificate_id
            .insert(block.payload.certificate_id.clone(), position);
        self.by_entity_id
            .entry(block.payload.entity_id.clone())
            .or_default()
            .push(position);
        self.certificates.push(block);
        Ok(&self.certificates[position])
    }

    fn ensure_unregistered(&self, certificate_id: &str) -> Result<(), LedgerError> {
        match self.find_certificate_by_certificate_id(certificate_id) {
            Some(existing) => Err(LedgerError::DuplicateCertificate {
                certificate_id: certificate_id.to_string(),
                block_index: existing.index,
            }),
            None => Ok(()),
        }
    }

    /// Lazily yields integrity violations in chain order.
    ///
    /// Each block's hash must be reproducible from its fields and must carry the
    /// ledger's work factor; every certificate block must link to its predecessor.
    fn scan(&self) -> impl Iterator<Item = ChainViolation> + '_ {
        let genesis =
            (!self.genesis.is_valid()).then_some(ChainViolation::HashMismatch { index: 0 });
        let links = self
            .blocks()
            .zip(self.certificates.iter())
            .flat_map(move |(previous, current)| {
                let index = current.index;
                let insufficient = current.difficulty < self.difficulty
                    || !meets_difficulty(&current.hash, current.difficulty);
                [
                    (!current.is_valid()).then_some(ChainViolation::HashMismatch { index }),
                    (current.preceding_hash != previous.hash)
                        .then_some(ChainViolation::BrokenLink { index }),
                    insufficient.then_some(ChainViolation::InsufficientWork {
                        index,
                        difficulty: self.difficulty,
                    }),
                ]
                .into_iter()
                .flatten()
            });
        genesis.into_iter().chain(links)
    }

    /// Every integrity violation in the chain. Reports only, never repairs.
    pub fn violations(&self) -> Vec<ChainViolation> {
        let found: Vec<ChainViolation> = self.scan().collect();
        for violation in &found {
            tracing::warn!(%violation, "chain integrity violation");
        }
        found
    }

    /// `true` if the whole chain passes; stops at the first violation.
    pub fn is_chain_valid(&self) -> bool {
        match self.scan().next() {
            Some(violation) => {
                tracing::warn!(%violation, "chain integrity violation");
                false
            }
            None => true,
        }
    }

    pub fn find_certificate_by_certificate_id(&self, certificate_id: &str) -> Option<&Block> {
        if self.genesis.payload.certificate_id == certificate_id {
            return Some(&self.genesis);
        }
        self.by_certificate_id
            .get(certificate_id)
            .and_then(|&position| self.certificates.get(position))
    }

    /// All blocks for `entity_id` in ledger order; empty if none.
    pub fn find_certificates_by_entity_id(&self, entity_id: &str) -> Vec<&Block> {
        let genesis = (self.genesis.payload.entity_id == entity_id).then_some(&self.genesis);
        let certificates = self
            .by_entity_id
            .get(entity_id)
            .into_iter()
            .flatten()
            .filter_map(|&position| self.certificates.get(position));
        genesis.into_iter().chain(certificates).collect()
    }

    /// One page of certificate blocks (genesis excluded), 1-based.
    ///
    /// `page` and `page_size` below 1 are treated as 1. Pages past the end are empty.
    pub fn get_certificates(&self, page: usize, page_size: usize) -> CertificatePage {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total = self.certificates.len();
        let start = (page - 1).saturating_mul(page_size);

        CertificatePage {
            items: self
                .certificates
                .iter()
                .skip(start)
                .take(page_size)
                .cloned()
                .collect(),
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        }
    }

    pub fn get_stats(&self) -> LedgerStats {
        let company_certificates = self
            .certificates
            .iter()
            .filter(|b| b.payload.certificate_type == CertificateType::Company)
            .count();

        LedgerStats {
            total_certificates: self.certificates.len(),
            is_valid: self.is_chain_valid(),
            difficulty: self.difficulty,
            latest_certificate: self.latest_block().payload.clone(),
            company_certificates,
            product_certificates: self.certificates.len() - company_certificates,
        }
    }

    /// Compare a presented document hash with the registered record.
    ///
    /// The fingerprint is compared before the block self-check so document
    /// tampering and ledger corruption are reported as distinct outcomes.
    pub fn verify_certificate_pdf(&self, certificate_id: &str, pdf_hash: &str) -> Verification {
        let Some(block) = self.find_certificate_by_certificate_id(certificate_id) else {
            return Verification::new(VerificationOutcome::NotFound, None);
        };

        let outcome = if block.payload.pdf_hash != pdf_hash {
            VerificationOutcome::HashMismatch
        } else if !block.is_valid() {
            tracing::warn!(index = block.index, %certificate_id, "verified block failed self-check");
            VerificationOutcome::BlockCorrupted
        } else {
            VerificationOutcome::Authentic
        };
        Verification::new(outcome, Some(block))
    }
}

/// Fixed sentinel block at index 0. Not mined and never counted as a certificate.
fn genesis_block() -> Block {
    let mut metadata = Metadata::new();
    metadata.insert("version".into(), "1.0.0".into());
    metadata.insert(
        "description".into(),
        "Genesis block for the certificate ledger".into(),
    );

    let payload = CertificatePayload {
        certificate_id: GENESIS_CERTIFICATE_ID.to_string(),
        certificate_type: CertificateType::Company,
        pdf_hash: "0".repeat(DIGEST_HEX_LEN),
        entity_id: "SYSTEM".to_string(),
        entity_name: "Certificate Ledger".to_string(),
        license_number: None,
        lto_number: None,
        cfpr_number: None,
        issued_date: datetime!(2025-01-01 0:00 UTC),
        external_transaction_id: None,
        metadata: Some(metadata),
    };

    Block::new(
        0,
        datetime!(2025-01-01 0:00 UTC),
        payload,
        GENESIS_PRECEDING_HASH.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(id: &str, kind: CertificateType, entity: &str) -> CertificatePayload {
        CertificatePayload {
            certificate_id: id.to_string(),
            certificate_type: kind,
            pdf_hash: "a".repeat(64),
            entity_id: entity.to_string(),
            entity_name: "Acme".to_string(),
            license_number: None,
            lto_number: None,
            cfpr_number: None,
            issued_date: OffsetDateTime::now_utc(),
            external_transaction_id: None,
            metadata: None,
        }
    }

    fn company(id: &str) -> CertificatePayload {
        payload(id, CertificateType::Company, "E1")
    }

    fn filled(difficulty: u32, count: usize) -> Ledger {
        let mut ledger = Ledger::new(difficulty);
        for i in 0..count {
            ledger
                .add_certificate(company(&format!("CERT-COMP-{i}")))
                .unwrap();
        }
        ledger
    }

    #[test]
    fn new_ledger_holds_only_genesis() {
        let ledger = Ledger::default();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.certificate_count(), 0);
        assert_eq!(ledger.difficulty(), DEFAULT_DIFFICULTY);
        let latest = ledger.latest_block();
        assert_eq!(latest.index, 0);
        assert_eq!(latest.preceding_hash, GENESIS_PRECEDING_HASH);
        assert_eq!(latest.payload.certificate_id, GENESIS_CERTIFICATE_ID);
        assert!(ledger.is_chain_valid());
    }

    #[test]
    fn genesis_is_identical_across_ledgers() {
        assert_eq!(Ledger::new(1).genesis(), Ledger::new(4).genesis());
    }

    #[test]
    fn sealed_block_meets_difficulty_four() {
        let mut ledger = Ledger::new(4);
        let block = ledger.add_certificate(company("CERT-COMP-1")).unwrap();
        assert!(block.hash.starts_with("0000"));
        assert_eq!(block.index, 1);
        assert_eq!(block.preceding_hash, ledger.genesis().hash);
        assert_eq!(ledger.latest_block(), &block);
    }

    #[test]
    fn sequential_appends_form_a_valid_chain() {
        let ledger = filled(2, 6);
        assert_eq!(ledger.len(), 7);
        assert!(ledger.is_chain_valid());
        assert!(ledger.violations().is_empty());

        let blocks: Vec<&Block> = ledger.blocks().collect();
        for pair in blocks.windows(2) {
            assert_eq!(pair[1].index, pair[0].index + 1);
            assert_eq!(pair[1].preceding_hash, pair[0].hash);
        }
        for block in &blocks[1..] {
            assert!(block.hash.starts_with("00"));
            assert_eq!(block.compute_hash(), block.hash);
        }
    }

    #[test]
    fn tampered_payload_is_detected_at_its_index() {
        let mut ledger = filled(1, 4);
        ledger.certificates[2].payload.entity_name = "Forged".to_string();

        assert!(!ledger.is_chain_valid());
        let violations = ledger.violations();
        assert_eq!(violations[0], ChainViolation::HashMismatch { index: 3 });
        assert!(violations[0].index() <= 3);
    }

    #[test]
    fn resealed_tamper_breaks_the_next_link() {
        let mut ledger = filled(1, 3);
        let target = &mut ledger.certificates[0];
        target.payload.pdf_hash = "b".repeat(64);
        target.seal(1);

        assert!(!ledger.is_chain_valid());
        assert_eq!(
            ledger.violations(),
            vec![ChainViolation::BrokenLink { index: 2 }]
        );
    }

    #[test]
    fn tampered_genesis_is_detected() {
        let mut ledger = filled(1, 1);
        ledger.genesis.payload.entity_name = "Someone else".to_string();
        assert!(!ledger.is_chain_valid());
        assert_eq!(ledger.violations()[0].index(), 0);
    }

    #[test]
    fn duplicate_certificate_is_rejected_without_appending() {
        let mut ledger = filled(1, 1);
        let err = ledger.add_certificate(company("CERT-COMP-0")).unwrap_err();
        assert_eq!(
            err,
            LedgerError::DuplicateCertificate {
                certificate_id: "CERT-COMP-0".to_string(),
                block_index: 1,
            }
        );
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn genesis_id_cannot_be_registered() {
        let mut ledger = Ledger::new(1);
        let err = ledger
            .add_certificate(company(GENESIS_CERTIFICATE_ID))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::DuplicateCertificate { block_index: 0, .. }
        ));
    }

    #[test]
    fn append_rejects_stale_and_unsealed_blocks() {
        let mut ledger = Ledger::new(2);
        let now = OffsetDateTime::now_utc();

        let mut stale = ledger.prepare_block(company("CERT-COMP-A"), now).unwrap();
        stale.seal(2);
        ledger.add_certificate(company("CERT-COMP-B")).unwrap();
        assert!(matches!(
            ledger.append(stale),
            Err(LedgerError::Rejected(ChainViolation::OutOfSequence { .. }))
        ));

        let unsealed = ledger.prepare_block(company("CERT-COMP-C"), now).unwrap();
        let err = ledger.append(unsealed).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Rejected(ChainViolation::InsufficientWork { .. })
        ));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn find_by_id_and_entity() {
        let mut ledger = Ledger::new(1);
        ledger
            .add_certificate(payload("CERT-COMP-1", CertificateType::Company, "E1"))
            .unwrap();
        ledger
            .add_certificate(payload("CERT-PROD-1", CertificateType::Product, "P1"))
            .unwrap();
        ledger
            .add_certificate(payload("CERT-COMP-2", CertificateType::Company, "E1"))
            .unwrap();

        let found = ledger.find_certificate_by_certificate_id("CERT-PROD-1").unwrap();
        assert_eq!(found.index, 2);
        assert!(ledger.find_certificate_by_certificate_id("CERT-NOPE").is_none());

        let ids: Vec<&str> = ledger
            .find_certificates_by_entity_id("E1")
            .iter()
            .map(|b| b.payload.certificate_id.as_str())
            .collect();
        assert_eq!(ids, vec!["CERT-COMP-1", "CERT-COMP-2"]);
        assert!(ledger.find_certificates_by_entity_id("E404").is_empty());
    }

    #[test]
    fn stats_partition_by_type() {
        let mut ledger = Ledger::new(4);
        for i in 0..3 {
            ledger
                .add_certificate(payload(&format!("CERT-COMP-{i}"), CertificateType::Company, "E1"))
                .unwrap();
        }
        for i in 0..2 {
            ledger
                .add_certificate(payload(&format!("CERT-PROD-{i}"), CertificateType::Product, "P1"))
                .unwrap();
        }

        let stats = ledger.get_stats();
        assert_eq!(stats.total_certificates, 5);
        assert_eq!(stats.company_certificates, 3);
        assert_eq!(stats.product_certificates, 2);
        assert!(stats.is_valid);
        assert_eq!(stats.difficulty, 4);
        assert_eq!(stats.latest_certificate.certificate_id, "CERT-PROD-1");
    }

    #[test]
    fn empty_ledger_stats_report_genesis_as_latest() {
        let stats = Ledger::new(1).get_stats();
        assert_eq!(stats.total_certificates, 0);
        assert_eq!(stats.company_certificates, 0);
        assert_eq!(stats.product_certificates, 0);
        assert_eq!(stats.latest_certificate.certificate_id, GENESIS_CERTIFICATE_ID);
    }

    #[test]
    fn pagination_of_five() {
        let ledger = filled(1, 5);
        let page = ledger.get_certificates(1, 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);

        assert_eq!(ledger.get_certificates(3, 2).items.len(), 1);
        assert!(ledger.get_certificates(4, 2).items.is_empty());
    }

    #[test]
    fn pagination_covers_every_certificate_once() {
        let ledger = filled(1, 7);
        for size in 1..=8 {
            let first = ledger.get_certificates(1, size);
            let mut seen = Vec::new();
            for page in 1..=first.total_pages + 1 {
                let result = ledger.get_certificates(page, size);
                let expected = size.min(7usize.saturating_sub((page - 1) * size));
                assert_eq!(result.items.len(), expected);
                seen.extend(result.items.into_iter().map(|b| b.index));
            }
            assert_eq!(seen, (1..=7).collect::<Vec<u64>>());
        }
    }

    #[test]
    fn pagination_clamps_zero_inputs() {
        let ledger = filled(1, 3);
        let page = ledger.get_certificates(0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 1);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn verification_outcomes() {
        let mut ledger = Ledger::new(4);
        ledger.add_certificate(company("CERT-COMP-1")).unwrap();

        let ok = ledger.verify_certificate_pdf("CERT-COMP-1", &"a".repeat(64));
        assert!(ok.is_valid);
        assert_eq!(ok.outcome, VerificationOutcome::Authentic);

        let mismatch = ledger.verify_certificate_pdf("CERT-COMP-1", &"b".repeat(64));
        assert!(!mismatch.is_valid);
        assert_eq!(mismatch.outcome, VerificationOutcome::HashMismatch);
        assert!(mismatch.message.contains("does not match"));
        assert!(mismatch.block.is_some());

        let missing = ledger.verify_certificate_pdf("CERT-COMP-UNKNOWN", &"a".repeat(64));
        assert!(!missing.is_valid);
        assert!(missing.block.is_none());
        assert_eq!(missing.outcome, VerificationOutcome::NotFound);
        assert!(missing.message.contains("not found"));
    }

    #[test]
    fn corrupted_block_is_reported_after_hash_match() {
        let mut ledger = filled(1, 2);
        ledger.certificates[0].payload.entity_name = "Forged".to_string();

        let result = ledger.verify_certificate_pdf("CERT-COMP-0", &"a".repeat(64));
        assert!(!result.is_valid);
        assert_eq!(result.outcome, VerificationOutcome::BlockCorrupted);

        // mismatch still wins over corruption
        let result = ledger.verify_certificate_pdf("CERT-COMP-0", &"c".repeat(64));
        assert_eq!(result.outcome, VerificationOutcome::HashMismatch);
    }

    #[test]
    fn lowered_difficulty_fails_chain_validation() {
        let mut ledger = filled(2, 3);
        ledger.certificates[1].difficulty = 1;

        assert!(!ledger.is_chain_valid());
        assert_eq!(
            ledger.violations(),
            vec![ChainViolation::InsufficientWork {
                index: 2,
                difficulty: 2
            }]
        );
    }

    #[test]
    fn resealed_with_less_work_fails_chain_validation() {
        let mut ledger = filled(2, 3);
        let last = ledger.certificates.last_mut().unwrap();
        last.seal(0);
        assert!(last.is_valid());

        assert!(!ledger.is_chain_valid());
        assert_eq!(
            ledger.violations(),
            vec![ChainViolation::InsufficientWork {
                index: 3,
                difficulty: 2
            }]
        );
    }
}
