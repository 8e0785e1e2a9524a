//! Document storage locations for certificate PDFs.
//!
//! The ledger keeps only fingerprints; the documents themselves live in an object
//! store under `certificates/<type>/<certificate_id>.pdf`.

use serde::Serialize;

use crate::model::CertificateType;

/// Where a certificate's document lives in the configured bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLocation {
    pub bucket: String,
    pub path: String,
    pub certificate_type: CertificateType,
}

/// Compute the object path for a certificate type and id.
pub fn document_path(certificate_type: CertificateType, certificate_id: &str) -> String {
    format!("certificates/{certificate_type}/{certificate_id}.pdf")
}

/// Resolve the document location from the id prefix (`CERT-COMP-` / `CERT-PROD-`).
/// `None` if the id does not follow the convention.
pub fn locate_document(bucket: &str, certificate_id: &str) -> Option<DocumentLocation> {
    let certificate_type = CertificateType::from_certificate_id(certificate_id)?;
    Some(DocumentLocation {
        bucket: bucket.to_string(),
        path: document_path(certificate_type, certificate_id),
        certificate_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_follows_type_directory() {
        assert_eq!(
            document_path(CertificateType::Company, "CERT-COMP-1"),
            "certificates/company/CERT-COMP-1.pdf"
        );
    }

    #[test]
    fn locate_uses_id_prefix() {
        let loc = locate_document("docs", "CERT-PROD-77").unwrap();
        assert_eq!(loc.certificate_type, CertificateType::Product);
        assert_eq!(loc.path, "certificates/product/CERT-PROD-77.pdf");
        assert_eq!(loc.bucket, "docs");
        assert!(locate_document("docs", "GENESIS").is_none());
    }
}
