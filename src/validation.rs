//! Request validation performed before anything reaches the ledger.

use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::ValidationError;
use crate::hash::is_hex_digest;
use crate::model::{CertificatePayload, CertificateType, Metadata};

/// Certificate registration request as received from a client.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCertificate {
    #[serde(default)]
    pub certificate_id: Option<String>,
    #[serde(default)]
    pub certificate_type: Option<String>,
    #[serde(default)]
    pub pdf_hash: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
    #[serde(default)]
    pub lto_number: Option<String>,
    #[serde(default)]
    pub cfpr_number: Option<String>,
    #[serde(default)]
    pub external_transaction_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Keep a field only if it has non-whitespace content.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Check the shape of a document hash and return it in lowercase.
pub fn normalize_pdf_hash(pdf_hash: &str) -> Result<String, ValidationError> {
    if !is_hex_digest(pdf_hash) {
        return Err(ValidationError::InvalidPdfHash);
    }
    Ok(pdf_hash.to_ascii_lowercase())
}

impl NewCertificate {
    /// Validate required fields, type and hash format, producing the payload to seal.
    pub fn into_payload(
        self,
        issued_date: OffsetDateTime,
    ) -> Result<CertificatePayload, ValidationError> {
        let certificate_id = present(self.certificate_id);
        let certificate_type = present(self.certificate_type);
        let pdf_hash = present(self.pdf_hash);
        let entity_id = present(self.entity_id);
        let entity_name = present(self.entity_name);

        let missing: Vec<&'static str> = [
            ("certificateId", certificate_id.is_none()),
            ("certificateType", certificate_type.is_none()),
            ("pdfHash", pdf_hash.is_none()),
            ("entityId", entity_id.is_none()),
            ("entityName", entity_name.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        let (
            Some(certificate_id),
            Some(certificate_type),
            Some(pdf_hash),
            Some(entity_id),
            Some(entity_name),
        ) = (certificate_id, certificate_type, pdf_hash, entity_id, entity_name)
        else {
            return Err(ValidationError::MissingFields(missing));
        };

        let certificate_type: CertificateType = certificate_type.parse()?;
        let pdf_hash = normalize_pdf_hash(&pdf_hash)?;

        Ok(CertificatePayload {
            certificate_id,
            certificate_type,
            pdf_hash,
            entity_id,
            entity_name,
            license_number: present(self.license_number),
            lto_number: present(self.lto_number),
            cfpr_number: present(self.cfpr_number),
            issued_date,
            external_transaction_id: present(self.external_transaction_id),
            metadata: self.metadata,
        })
    }
}
