//! Hash engine: SHA-256 digests over block fields and raw documents.

use sha2::{Digest, Sha256};

/// Number of hex characters in a SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Fingerprint of a document's raw bytes, as stored in a certificate's `pdf_hash`.
pub fn hash_document(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Incremental hash input where every field is length-prefixed, so that
/// adjacent fields can never be re-split into a different tuple with the same digest.
///
/// Cloning captures the digest state, which lets the sealer hash a fixed prefix
/// once and only feed the nonce per attempt.
#[derive(Clone, Default)]
pub struct FieldHasher {
    inner: Sha256,
}

impl FieldHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_field(&mut self, bytes: &[u8]) -> &mut Self {
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    /// Absent values get their own marker so `None` and `Some("")` differ.
    pub fn write_optional(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            None => self.inner.update([0u8]),
            Some(v) => {
                self.inner.update([1u8]);
                self.write_field(v.as_bytes());
            }
        }
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(value.to_le_bytes());
        self
    }

    pub fn write_i128(&mut self, value: i128) -> &mut Self {
        self.inner.update(value.to_le_bytes());
        self
    }

    /// Consume the hasher and return the lowercase hex digest.
    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// True if `hash` starts with at least `difficulty` `'0'` hex characters.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let needed = difficulty as usize;
    hash.len() >= needed && hash.bytes().take(needed).all(|b| b == b'0')
}

/// True if `s` is exactly 64 hex characters (either case).
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}
