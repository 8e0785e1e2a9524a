//! Data model for certificate records and the sealed blocks that carry them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::ValidationError;
use crate::hash::{meets_difficulty, FieldHasher};

/// Open key-value bag attached to a certificate. Never inspected by the ledger.
pub type Metadata = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateType {
    Company,
    Product,
}

impl CertificateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateType::Company => "company",
            CertificateType::Product => "product",
        }
    }

    /// Identifier prefix the issuing side uses for this kind of certificate.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            CertificateType::Company => "CERT-COMP-",
            CertificateType::Product => "CERT-PROD-",
        }
    }

    /// Infer the type from an identifier's prefix, if it follows the convention.
    pub fn from_certificate_id(certificate_id: &str) -> Option<Self> {
        [CertificateType::Company, CertificateType::Product]
            .into_iter()
            .find(|t| certificate_id.starts_with(t.id_prefix()))
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(CertificateType::Company),
            "product" => Ok(CertificateType::Product),
            other => Err(ValidationError::InvalidCertificateType(other.to_string())),
        }
    }
}

/// Certificate record as registered in the ledger. Immutable once sealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePayload {
    pub certificate_id: String,
    pub certificate_type: CertificateType,
    /// Lowercase hex SHA-256 of the certificate document.
    pub pdf_hash: String,
    pub entity_id: String,
    pub entity_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lto_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfpr_number: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_date: OffsetDateTime,
    /// Reference to a registration on an external chain; stored as given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl CertificatePayload {
    /// Feed every field into `hasher` in declaration order.
    ///
    /// Metadata is encoded as compact JSON; object keys come out sorted, so equal
    /// maps always produce equal bytes.
    pub(crate) fn write_canonical(&self, hasher: &mut FieldHasher) {
        let metadata = self.metadata.as_ref().map(|m| {
            Value::Object(m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()).to_string()
        });

        hasher
            .write_field(self.certificate_id.as_bytes())
            .write_field(self.certificate_type.as_str().as_bytes())
            .write_field(self.pdf_hash.as_bytes())
            .write_field(self.entity_id.as_bytes())
            .write_field(self.entity_name.as_bytes())
            .write_optional(self.license_number.as_deref())
            .write_optional(self.lto_number.as_deref())
            .write_optional(self.cfpr_number.as_deref())
            .write_i128(self.issued_date.unix_timestamp_nanos())
            .write_optional(self.external_transaction_id.as_deref())
            .write_optional(metadata.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position in the chain; 0 is genesis.
    pub index: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub payload: CertificatePayload,
    /// Hash of the block at `index - 1`, `"0"` for genesis.
    pub preceding_hash: String,
    /// SHA-256 hex over (index, preceding hash, timestamp, payload, nonce).
    pub hash: String,
    pub nonce: u64,
    /// Leading zero hex digits `hash` was sealed to.
    pub difficulty: u32,
}

impl Block {
    /// Build an unsealed block (nonce 0, difficulty 0) with its hash already computed.
    pub fn new(
        index: u64,
        timestamp: OffsetDateTime,
        payload: CertificatePayload,
        preceding_hash: String,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            payload,
            preceding_hash,
            hash: String::new(),
            nonce: 0,
            difficulty: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Hasher primed with every field except the nonce.
    fn header_hasher(&self) -> FieldHasher {
        let mut hasher = FieldHasher::new();
        hasher
            .write_u64(self.index)
            .write_field(self.preceding_hash.as_bytes())
            .write_i128(self.timestamp.unix_timestamp_nanos());
        self.payload.write_canonical(&mut hasher);
        hasher
    }

    /// Recompute the hash from the block's current fields.
    pub fn compute_hash(&self) -> String {
        let mut hasher = self.header_hasher();
        hasher.write_u64(self.nonce);
        hasher.finish()
    }

    /// Proof-of-work: search nonces from 0 until the hash has `difficulty`
    /// leading zero hex digits. CPU-bound, expected 16^difficulty attempts.
    pub fn seal(&mut self, difficulty: u32) {
        let header = self.header_hasher();
        let mut nonce = 0u64;
        loop {
            let mut attempt = header.clone();
            attempt.write_u64(nonce);
            let hash = attempt.finish();
            if meets_difficulty(&hash, difficulty) {
                tracing::debug!(index = self.index, nonce, difficulty, "block sealed");
                self.nonce = nonce;
                self.hash = hash;
                self.difficulty = difficulty;
                return;
            }
            nonce += 1;
        }
    }

    /// Self-check: the stored hash is reproducible from the stored fields.
    pub fn is_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// The stored hash satisfies the stored difficulty.
    pub fn has_valid_work(&self) -> bool {
        meets_difficulty(&self.hash, self.difficulty)
    }
}
