//! HTTP routes for registering, looking up and verifying certificates.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ApiError, LedgerError, ValidationError};
use crate::hash::hash_document;
use crate::ledger::{ChainViolation, LedgerStats, VerificationOutcome};
use crate::model::{Block, CertificatePayload, CertificateType};
use crate::storage::{locate_document, DocumentLocation};
use crate::validation::{normalize_pdf_hash, NewCertificate};
use crate::AppState;

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Run a CPU-bound ledger call (sealing or a full chain scan) off the async workers.
async fn blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ApiError::Internal(format!("ledger task failed: {e}")))
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/add", post(add_certificate))
        .route("/verify", post(verify_certificate))
        .route("/certificate/:certificate_id", get(get_certificate))
        .route("/pdf/:certificate_id", get(get_certificate_document))
        .route("/entity/:entity_id", get(get_entity_certificates))
        .route("/stats", get(stats))
        .route("/validate", get(validate_chain))
        .route("/certificates", get(list_certificates))
        .route(
            "/calculate-hash",
            post(calculate_hash).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/health", get(health))
        .route("/version", get(version))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredCertificate {
    pub certificate_id: String,
    pub block_index: u64,
    pub block_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub certificate_type: CertificateType,
    pub entity_name: String,
    pub pdf_hash: String,
    pub is_chain_valid: bool,
}

#[derive(Serialize)]
pub struct AddResponse {
    pub success: bool,
    pub message: &'static str,
    pub certificate: RegisteredCertificate,
}

/// POST /add
pub async fn add_certificate(
    State(state): State<AppState>,
    body: Result<Json<NewCertificate>, JsonRejection>,
) -> Result<(StatusCode, Json<AddResponse>), ApiError> {
    let Json(request) = body?;
    let payload = request.into_payload(OffsetDateTime::now_utc())?;

    // Reject before sealing so no proof-of-work is wasted on a duplicate.
    if let Some(existing) = state
        .ledger
        .find_certificate_by_certificate_id(&payload.certificate_id)
    {
        tracing::warn!(certificate_id = %payload.certificate_id, "duplicate registration");
        return Err(LedgerError::DuplicateCertificate {
            certificate_id: payload.certificate_id,
            block_index: existing.index,
        }
        .into());
    }

    let ledger = state.ledger.clone();
    let block = blocking(move || ledger.add_certificate(payload)).await??;
    let ledger = state.ledger.clone();
    let is_chain_valid = blocking(move || ledger.is_chain_valid()).await?;

    Ok((
        StatusCode::CREATED,
        Json(AddResponse {
            success: true,
            message: "Certificate successfully added to ledger",
            certificate: RegisteredCertificate {
                certificate_id: block.payload.certificate_id,
                block_index: block.index,
                block_hash: block.hash,
                timestamp: block.timestamp,
                certificate_type: block.payload.certificate_type,
                entity_name: block.payload.entity_name,
                pdf_hash: block.payload.pdf_hash,
                is_chain_valid,
            },
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub certificate_id: Option<String>,
    #[serde(default)]
    pub pdf_hash: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub is_valid: bool,
    pub outcome: VerificationOutcome,
    pub certificate_id: String,
    pub block_index: Option<u64>,
    pub certificate_type: Option<CertificateType>,
    pub entity_name: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub issued_date: Option<OffsetDateTime>,
    pub pdf_hash_match: Option<bool>,
    pub block_integrity: Option<bool>,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub message: &'static str,
    pub verification: VerificationReport,
}

/// POST /verify: 200 when authentic, 400 otherwise.
pub async fn verify_certificate(
    State(state): State<AppState>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VerifyResponse>), ApiError> {
    let Json(request) = body?;
    let (Some(certificate_id), Some(pdf_hash)) = (
        request.certificate_id.filter(|v| !v.trim().is_empty()),
        request.pdf_hash.filter(|v| !v.trim().is_empty()),
    ) else {
        return Err(ValidationError::MissingFields(vec!["certificateId", "pdfHash"]).into());
    };

    // Stored fingerprints are lowercase; anything that is not a digest just mismatches.
    let supplied = normalize_pdf_hash(&pdf_hash).unwrap_or(pdf_hash);
    let verification = state
        .ledger
        .verify_certificate_pdf(&certificate_id, &supplied);

    if !verification.is_valid {
        tracing::warn!(%certificate_id, outcome = ?verification.outcome, "verification failed");
    }

    let block = verification.block.as_ref();
    let status = if verification.is_valid {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    Ok((
        status,
        Json(VerifyResponse {
            success: verification.is_valid,
            message: verification.message,
            verification: VerificationReport {
                is_valid: verification.is_valid,
                outcome: verification.outcome,
                block_index: block.map(|b| b.index),
                certificate_type: block.map(|b| b.payload.certificate_type),
                entity_name: block.map(|b| b.payload.entity_name.clone()),
                issued_date: block.map(|b| b.payload.issued_date),
                pdf_hash_match: block.map(|b| b.payload.pdf_hash == supplied),
                block_integrity: block.map(Block::is_valid),
                certificate_id,
            },
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    pub block_index: u64,
    pub block_hash: String,
    pub preceding_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub nonce: u64,
    pub difficulty: u32,
    #[serde(flatten)]
    pub payload: CertificatePayload,
    pub is_block_valid: bool,
}

impl From<Block> for CertificateRecord {
    fn from(block: Block) -> Self {
        let is_block_valid = block.is_valid();
        CertificateRecord {
            block_index: block.index,
            block_hash: block.hash,
            preceding_hash: block.preceding_hash,
            timestamp: block.timestamp,
            nonce: block.nonce,
            difficulty: block.difficulty,
            payload: block.payload,
            is_block_valid,
        }
    }
}

#[derive(Serialize)]
pub struct CertificateResponse {
    pub success: bool,
    pub message: &'static str,
    pub certificate: CertificateRecord,
}

fn not_found(certificate_id: &str) -> ApiError {
    ApiError::NotFound(format!("Certificate {certificate_id} not found in ledger"))
}

/// GET /certificate/:certificate_id
pub async fn get_certificate(
    State(state): State<AppState>,
    Path(certificate_id): Path<String>,
) -> Result<Json<CertificateResponse>, ApiError> {
    let block = state
        .ledger
        .find_certificate_by_certificate_id(&certificate_id)
        .ok_or_else(|| not_found(&certificate_id))?;

    Ok(Json(CertificateResponse {
        success: true,
        message: "Certificate found",
        certificate: block.into(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDocument {
    pub certificate_id: String,
    pub entity_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_date: OffsetDateTime,
    pub pdf_hash: String,
    pub block_index: u64,
    pub is_block_valid: bool,
    pub document: DocumentLocation,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub success: bool,
    pub message: &'static str,
    pub certificate: CertificateDocument,
}

/// GET /pdf/:certificate_id: where the registered document is stored.
pub async fn get_certificate_document(
    State(state): State<AppState>,
    Path(certificate_id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let block = state
        .ledger
        .find_certificate_by_certificate_id(&certificate_id)
        .ok_or_else(|| not_found(&certificate_id))?;

    let document = locate_document(&state.config.document_bucket, &certificate_id).ok_or_else(
        || {
            ApiError::BadRequest(
                "Certificate ID must start with CERT-COMP- or CERT-PROD-".to_string(),
            )
        },
    )?;

    let is_block_valid = block.is_valid();
    Ok(Json(DocumentResponse {
        success: true,
        message: "Certificate document location retrieved",
        certificate: CertificateDocument {
            certificate_id: block.payload.certificate_id,
            entity_name: block.payload.entity_name,
            issued_date: block.payload.issued_date,
            pdf_hash: block.payload.pdf_hash,
            block_index: block.index,
            is_block_valid,
            document,
        },
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedCertificate {
    pub certificate_id: String,
    pub block_index: u64,
    pub certificate_type: CertificateType,
    pub entity_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub pdf_hash: String,
    pub is_valid: bool,
}

impl From<Block> for ListedCertificate {
    fn from(block: Block) -> Self {
        let is_valid = block.is_valid();
        ListedCertificate {
            certificate_id: block.payload.certificate_id,
            block_index: block.index,
            certificate_type: block.payload.certificate_type,
            entity_name: block.payload.entity_name,
            issued_date: block.payload.issued_date,
            timestamp: block.timestamp,
            pdf_hash: block.payload.pdf_hash,
            is_valid,
        }
    }
}

#[derive(Serialize)]
pub struct EntityResponse {
    pub success: bool,
    pub message: String,
    pub certificates: Vec<ListedCertificate>,
}

/// GET /entity/:entity_id
pub async fn get_entity_certificates(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Json<EntityResponse> {
    let certificates: Vec<ListedCertificate> = state
        .ledger
        .find_certificates_by_entity_id(&entity_id)
        .into_iter()
        .map(ListedCertificate::from)
        .collect();

    Json(EntityResponse {
        success: true,
        message: format!("Found {} certificate(s) for entity", certificates.len()),
        certificates,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBody {
    #[serde(flatten)]
    pub stats: LedgerStats,
    pub total_blocks: usize,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub message: &'static str,
    pub stats: StatsBody,
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let ledger = state.ledger.clone();
    let stats = blocking(move || ledger.get_stats()).await?;
    let total_blocks = stats.total_certificates + 1;

    Ok(Json(StatsResponse {
        success: true,
        message: "Ledger statistics retrieved",
        stats: StatsBody {
            stats,
            total_blocks,
        },
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub total_blocks: usize,
    pub total_certificates: usize,
    pub difficulty: u32,
    pub violations: Vec<ChainViolation>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub message: &'static str,
    pub validation: ValidationReport,
}

/// GET /validate: full integrity scan with every violation listed.
pub async fn validate_chain(
    State(state): State<AppState>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let ledger = state.ledger.clone();
    let violations = blocking(move || ledger.violations()).await?;
    let total_certificates = state.ledger.certificate_count();
    let is_valid = violations.is_empty();

    Ok(Json(ValidateResponse {
        success: true,
        message: if is_valid {
            "Ledger is valid"
        } else {
            "Ledger integrity compromised"
        },
        validation: ValidationReport {
            is_valid,
            total_blocks: total_certificates + 1,
            total_certificates,
            difficulty: state.ledger.difficulty(),
            violations,
        },
    }))
}

/// Raw query values; unparsable or zero values fall back to the defaults.
#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

fn positive_or(value: Option<&str>, default: usize) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub items_per_page: usize,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub message: &'static str,
    pub data: Vec<ListedCertificate>,
    pub pagination: Pagination,
}

/// GET /certificates?page=&limit=
pub async fn list_certificates(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<ListResponse> {
    let page = positive_or(query.page.as_deref(), DEFAULT_PAGE);
    let limit = positive_or(query.limit.as_deref(), DEFAULT_PAGE_SIZE);
    let result = state.ledger.get_certificates(page, limit);

    Json(ListResponse {
        success: true,
        message: "Certificates retrieved",
        data: result.items.into_iter().map(ListedCertificate::from).collect(),
        pagination: Pagination {
            current_page: result.page,
            total_pages: result.total_pages,
            total_items: result.total,
            items_per_page: result.page_size,
        },
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashRequest {
    #[serde(default)]
    pub pdf_base64: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashResponse {
    pub success: bool,
    pub message: &'static str,
    pub pdf_hash: String,
    pub file_size: usize,
}

/// POST /calculate-hash: fingerprint a base64-encoded document before submission.
pub async fn calculate_hash(
    body: Result<Json<HashRequest>, JsonRejection>,
) -> Result<Json<HashResponse>, ApiError> {
    let Json(request) = body?;
    let encoded = request
        .pdf_base64
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::MissingFields(vec!["pdfBase64"]))?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ValidationError::InvalidDocumentEncoding(e.to_string()))?;

    Ok(Json(HashResponse {
        success: true,
        message: "PDF hash calculated",
        pdf_hash: hash_document(&bytes),
        file_size: bytes.len(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub total_blocks: usize,
    pub difficulty: u32,
}

/// GET /health: liveness plus the ledger's current height.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        total_blocks: state.ledger.len(),
        difficulty: state.ledger.difficulty(),
    })
}

#[derive(Serialize)]
pub struct Version {
    pub name: &'static str,
    pub version: &'static str,
}

/// GET /version
pub async fn version() -> Json<Version> {
    Json(Version {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
