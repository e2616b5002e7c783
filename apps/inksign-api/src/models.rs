//! Data models for the Inksign API
//!
//! Database rows are separated from the wire types; every request and
//! response body has one explicit struct.

use chrono::{DateTime, Utc};
use inksign_core::Placement;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Application user provisioned from the identity provider.
#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub google_id: String,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Uploaded document row.
#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: i64,
    pub uploader_id: i64,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_path: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
    pub document_hash: String,
    pub uploaded_at: DateTime<Utc>,
}

/// One invited party for one document.
#[derive(Debug, Clone, FromRow)]
pub struct DbSigner {
    pub id: i64,
    pub document_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_signed: bool,
}

/// Reusable stored signature image; `user_id` is NULL for anonymous
/// drawings.
#[derive(Debug, Clone, FromRow)]
pub struct DbSignatureAsset {
    pub id: i64,
    pub user_id: Option<i64>,
    pub stored_filename: String,
    pub file_url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Signer entry in an upload request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerInvite {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Request to create a document with its signer roster.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadDocumentRequest {
    pub filename: String,
    pub pdf_base64: String,
    #[serde(default)]
    pub signers: Vec<SignerInvite>,
}

/// Document descriptor returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub original_filename: String,
    pub stored_filename: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
    pub document_hash: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<DbDocument> for DocumentResponse {
    fn from(doc: DbDocument) -> Self {
        Self {
            original_filename: doc.original_filename,
            stored_filename: doc.stored_filename,
            file_url: doc.file_url,
            file_size: doc.file_size,
            mime_type: doc.mime_type,
            document_hash: doc.document_hash,
            uploaded_at: doc.uploaded_at,
        }
    }
}

/// Signer state as exposed to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SignerResponse {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_signed: bool,
}

impl From<DbSigner> for SignerResponse {
    fn from(signer: DbSigner) -> Self {
        Self {
            id: signer.id,
            name: signer.name,
            email: signer.email,
            role: signer.role,
            is_signed: signer.is_signed,
        }
    }
}

/// Document descriptor together with its signer roster.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentDetailResponse {
    #[serde(flatten)]
    pub document: DocumentResponse,
    pub signers: Vec<SignerResponse>,
}

/// Monotonic completion-flag update; `is_signed` must be `true`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSignerStatusRequest {
    pub is_signed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignerStatusResponse {
    pub id: i64,
    pub is_signed: bool,
}

/// Finalization request: the ordered placements for one signer.
#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeRequest {
    pub placements: Vec<Placement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeResponse {
    pub signed: bool,
    pub placements_applied: usize,
    /// Unchanged across finalization; the stamped bytes live at the same
    /// location.
    pub file_url: String,
}

/// Signature-asset upload: a base64 PNG, with or without a data-URL
/// prefix.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureUploadRequest {
    pub image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignatureAssetResponse {
    pub sign_filename: String,
    pub file_url: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<DbSignatureAsset> for SignatureAssetResponse {
    fn from(asset: DbSignatureAsset) -> Self {
        Self {
            sign_filename: asset.stored_filename,
            file_url: asset.file_url,
            uploaded_at: asset.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedResponse {
    pub deleted_filename: String,
}
