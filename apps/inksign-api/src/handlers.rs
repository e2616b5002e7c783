//! HTTP handlers for the Inksign API

use axum::extract::{Path, State};
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use inksign_core::{decode_image_payload, ensure_png, get_page_count};

use crate::auth::{CurrentUser, MaybeUser};
use crate::error::ApiError;
use crate::models::*;
use crate::signing::{self, finalize_signing};
use crate::state::AppState;

/// Uploads beyond this size are rejected (50 MB).
const MAX_DOCUMENT_BYTES: usize = 50 * 1024 * 1024;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Create a document together with its signer roster
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let pdf_data = BASE64
        .decode(&req.pdf_base64)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid PDF base64: {}", e)))?;

    if pdf_data.len() > MAX_DOCUMENT_BYTES {
        return Err(ApiError::InvalidRequest(
            "Document exceeds the 50 MB limit".into(),
        ));
    }

    // Parse before anything touches storage; a broken upload must not
    // leave a blob behind.
    let page_count = get_page_count(&pdf_data)
        .map_err(|e| ApiError::InvalidRequest(format!("Not a readable PDF: {}", e)))?;

    let document_hash = hex::encode(Sha256::digest(&pdf_data));
    let blob = state
        .storage
        .store_document(&pdf_data, &req.filename)
        .map_err(|e| ApiError::Internal(e.into()))?;

    let now = Utc::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO documents
            (uploader_id, original_filename, stored_filename, file_path, file_url,
             file_size, mime_type, document_hash, uploaded_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id)
    .bind(&req.filename)
    .bind(&blob.stored_filename)
    .bind(blob.path.to_string_lossy().into_owned())
    .bind(&blob.url)
    .bind(pdf_data.len() as i64)
    .bind("application/pdf")
    .bind(&document_hash)
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await;
    if let Err(e) = inserted {
        // Do not leave an orphaned blob behind a failed insert.
        let _ = state.storage.delete(&blob.path);
        return Err(e.into());
    }

    let document = signing::fetch_document(&state.db, &blob.stored_filename)
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("document row vanished after insert")))?;

    for invite in &req.signers {
        sqlx::query(
            "INSERT INTO document_signers (document_id, name, email, role) VALUES (?, ?, ?, ?)",
        )
        .bind(document.id)
        .bind(&invite.name)
        .bind(&invite.email)
        .bind(&invite.role)
        .execute(&state.db)
        .await?;
    }

    let signers: Vec<DbSigner> =
        sqlx::query_as("SELECT * FROM document_signers WHERE document_id = ?")
            .bind(document.id)
            .fetch_all(&state.db)
            .await?;

    tracing::info!(
        "Uploaded document {} ({} pages, {} signers)",
        document.stored_filename,
        page_count,
        signers.len()
    );

    state.notifier.notify_signers(&document, &signers);

    Ok(Json(document.into()))
}

/// Documents uploaded by the caller
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<DocumentResponse>>, ApiError> {
    let documents: Vec<DbDocument> =
        sqlx::query_as("SELECT * FROM documents WHERE uploader_id = ? ORDER BY uploaded_at DESC")
            .bind(user.id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

/// Document descriptor plus its signer roster; public because signing
/// parties are not the uploader.
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(stored_filename): Path<String>,
) -> Result<Json<DocumentDetailResponse>, ApiError> {
    let document = signing::fetch_document(&state.db, &stored_filename)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document {}", stored_filename)))?;

    let signers: Vec<DbSigner> =
        sqlx::query_as("SELECT * FROM document_signers WHERE document_id = ? ORDER BY id")
            .bind(document.id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(DocumentDetailResponse {
        document: document.into(),
        signers: signers.into_iter().map(Into::into).collect(),
    }))
}

/// Delete a document; uploader only. Signers cascade with the row.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(stored_filename): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let document = signing::fetch_document(&state.db, &stored_filename)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document {}", stored_filename)))?;

    if document.uploader_id != user.id {
        return Err(ApiError::Forbidden(
            "Only the uploader may delete a document".into(),
        ));
    }

    state
        .storage
        .delete(std::path::Path::new(&document.file_path))
        .map_err(|e| ApiError::Internal(e.into()))?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document.id)
        .execute(&state.db)
        .await?;

    tracing::info!("Deleted document {}", stored_filename);
    Ok(Json(DeletedResponse {
        deleted_filename: stored_filename,
    }))
}

/// Signer roster with completion flags
pub async fn list_signers(
    State(state): State<Arc<AppState>>,
    Path(stored_filename): Path<String>,
) -> Result<Json<Vec<SignerResponse>>, ApiError> {
    let document = signing::fetch_document(&state.db, &stored_filename)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document {}", stored_filename)))?;

    let signers: Vec<DbSigner> =
        sqlx::query_as("SELECT * FROM document_signers WHERE document_id = ? ORDER BY id")
            .bind(document.id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(signers.into_iter().map(Into::into).collect()))
}

/// Monotonic completion-flag update; also the idempotent retry path when
/// a finalization stamped the file but lost the flag write.
pub async fn update_signer_status(
    State(state): State<Arc<AppState>>,
    Path((stored_filename, signer_id)): Path<(String, i64)>,
    Json(req): Json<UpdateSignerStatusRequest>,
) -> Result<Json<SignerStatusResponse>, ApiError> {
    if !req.is_signed {
        return Err(ApiError::InvalidRequest(
            "Completion cannot be reverted".into(),
        ));
    }

    let document = signing::fetch_document(&state.db, &stored_filename)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document {}", stored_filename)))?;
    let signer = signing::fetch_signer(&state.db, document.id, signer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("signer {}", signer_id)))?;

    sqlx::query("UPDATE document_signers SET is_signed = 1 WHERE id = ?")
        .bind(signer.id)
        .execute(&state.db)
        .await?;

    Ok(Json(SignerStatusResponse {
        id: signer.id,
        is_signed: true,
    }))
}

/// Finalize one signer's turn: composite the submitted placements into
/// the stored PDF and mark the signer complete.
pub async fn finalize_document(
    State(state): State<Arc<AppState>>,
    Path((stored_filename, signer_id)): Path<(String, i64)>,
    Json(req): Json<FinalizeRequest>,
) -> Result<Json<FinalizeResponse>, ApiError> {
    let outcome = finalize_signing(&state, &stored_filename, signer_id, req.placements).await?;
    Ok(Json(FinalizeResponse {
        signed: true,
        placements_applied: outcome.placements_applied,
        file_url: outcome.file_url,
    }))
}

/// Store a drawn signature image; anonymous callers get ownerless assets.
pub async fn upload_signature(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Json(req): Json<SignatureUploadRequest>,
) -> Result<Json<SignatureAssetResponse>, ApiError> {
    let bytes = decode_image_payload(&req.image)?;
    ensure_png(&bytes)?;

    let blob = state
        .storage
        .store_signature(&bytes)
        .map_err(|e| ApiError::Internal(e.into()))?;

    let now = Utc::now();
    sqlx::query(
        "INSERT INTO signature_assets (user_id, stored_filename, file_url, uploaded_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user.as_ref().map(|u| u.id))
    .bind(&blob.stored_filename)
    .bind(&blob.url)
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await?;

    tracing::info!("Stored signature asset {}", blob.stored_filename);
    Ok(Json(SignatureAssetResponse {
        sign_filename: blob.stored_filename,
        file_url: blob.url,
        uploaded_at: now,
    }))
}

/// Signature assets owned by the caller
pub async fn list_signatures(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<SignatureAssetResponse>>, ApiError> {
    let assets: Vec<DbSignatureAsset> =
        sqlx::query_as("SELECT * FROM signature_assets WHERE user_id = ? ORDER BY uploaded_at DESC")
            .bind(user.id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(assets.into_iter().map(Into::into).collect()))
}

/// Delete a signature asset; owner only.
pub async fn delete_signature(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(stored_filename): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let asset: Option<DbSignatureAsset> =
        sqlx::query_as("SELECT * FROM signature_assets WHERE stored_filename = ?")
            .bind(&stored_filename)
            .fetch_optional(&state.db)
            .await?;
    let asset = asset.ok_or_else(|| ApiError::NotFound(format!("signature {}", stored_filename)))?;

    if asset.user_id != Some(user.id) {
        return Err(ApiError::Forbidden(
            "Only the owner may delete a signature".into(),
        ));
    }

    state
        .storage
        .delete(&state.storage.signature_path(&asset.stored_filename))
        .map_err(|e| ApiError::Internal(e.into()))?;
    sqlx::query("DELETE FROM signature_assets WHERE id = ?")
        .bind(asset.id)
        .execute(&state.db)
        .await?;

    Ok(Json(DeletedResponse {
        deleted_filename: stored_filename,
    }))
}
