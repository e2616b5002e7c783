//! Signing session coordination
//!
//! Guards the one-way PENDING -> SIGNED transition per (document, signer)
//! and owns the per-document lock that serializes concurrent rewrites of
//! the same stored file. The completion flag only flips after the stored
//! document is fully rewritten (write-then-commit).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use inksign_core::{stamp_document, Placement};

use crate::error::ApiError;
use crate::models::{DbDocument, DbSigner};
use crate::state::AppState;

/// Registry of per-document async locks, keyed by stored filename.
#[derive(Default)]
pub struct DocumentLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DocumentLocks {
    /// Take the lock for one document; held for the whole rewrite.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("document lock registry poisoned");
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Debug)]
pub struct FinalizeOutcome {
    pub placements_applied: usize,
    pub file_url: String,
}

pub(crate) async fn fetch_document(
    db: &sqlx::SqlitePool,
    stored_filename: &str,
) -> Result<Option<DbDocument>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM documents WHERE stored_filename = ?")
        .bind(stored_filename)
        .fetch_optional(db)
        .await
}

pub(crate) async fn fetch_signer(
    db: &sqlx::SqlitePool,
    document_id: i64,
    signer_id: i64,
) -> Result<Option<DbSigner>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM document_signers WHERE id = ? AND document_id = ?")
        .bind(signer_id)
        .bind(document_id)
        .fetch_optional(db)
        .await
}

/// Finalize one signer's turn: stamp the submitted placements into the
/// stored document, then mark the signer complete.
pub async fn finalize_signing(
    state: &AppState,
    doc_filename: &str,
    signer_id: i64,
    placements: Vec<Placement>,
) -> Result<FinalizeOutcome, ApiError> {
    let document = fetch_document(&state.db, doc_filename)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document {}", doc_filename)))?;
    let signer = fetch_signer(&state.db, document.id, signer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("signer {}", signer_id)))?;
    if signer.is_signed {
        return Err(ApiError::AlreadySigned);
    }

    // Two finalizations of the same document must not interleave their
    // read-modify-write of the stored file. The flag is re-checked under
    // the lock so racing calls for the same signer cannot both stamp.
    let _guard = state.locks.acquire(&document.stored_filename).await;
    let signer = fetch_signer(&state.db, document.id, signer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("signer {}", signer_id)))?;
    if signer.is_signed {
        return Err(ApiError::AlreadySigned);
    }

    let submitted = placements.len();
    let path = PathBuf::from(&document.file_path);
    // CPU-bound compositing runs off the cooperative scheduler; the task
    // runs to completion even if the client disconnects mid-request.
    let applied = tokio::task::spawn_blocking(move || stamp_document(&path, &placements))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stamping task failed: {}", e)))??;

    if applied < submitted {
        tracing::warn!(
            "document {}: {} of {} placements referenced pages the document does not have",
            doc_filename,
            submitted - applied,
            submitted
        );
    }

    // Write-then-commit: the stored file is already rewritten; if the flag
    // update fails the PATCH status route is the idempotent retry.
    if let Err(e) = sqlx::query("UPDATE document_signers SET is_signed = 1 WHERE id = ?")
        .bind(signer_id)
        .execute(&state.db)
        .await
    {
        tracing::warn!(
            "document {} stamped but signer {} completion flag not persisted, retry the status update: {}",
            doc_filename,
            signer_id,
            e
        );
        return Err(ApiError::Database(e));
    }

    tracing::info!(
        "Signer {} finalized document {} ({} placements)",
        signer_id,
        doc_filename,
        applied
    );

    Ok(FinalizeOutcome {
        placements_applied: applied,
        file_url: document.file_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use lopdf::{Document, Object};
    use pretty_assertions::assert_eq;

    fn placement_on(page: u32) -> Placement {
        Placement {
            image: testutil::png_payload(),
            x: 40.0,
            y: 80.0,
            width: 20.0,
            height: 8.0,
            page,
        }
    }

    /// Content objects on `page_no`: a stamped page carries the
    /// prolog/original/overlay array instead of a single reference.
    fn page_is_stamped(pdf: &[u8], page_no: u32) -> bool {
        let doc = Document::load_mem(pdf).unwrap();
        let page_id = *doc.get_pages().get(&page_no).unwrap();
        let dict = doc.get_object(page_id).unwrap().as_dict().unwrap();
        matches!(dict.get(b"Contents"), Ok(Object::Array(_)))
    }

    #[tokio::test]
    async fn test_finalize_flips_flag_and_stamps_file() {
        let (state, _dir) = testutil::test_state().await;
        let user = testutil::seed_user(&state).await;
        let (doc, signers) = testutil::seed_document(&state, user, 3, &["alice"]).await;

        let outcome = finalize_signing(&state, &doc.stored_filename, signers[0], vec![
            placement_on(2),
        ])
        .await
        .unwrap();
        assert_eq!(outcome.placements_applied, 1);
        assert_eq!(outcome.file_url, doc.file_url);

        let signer = fetch_signer(&state.db, doc.id, signers[0])
            .await
            .unwrap()
            .unwrap();
        assert!(signer.is_signed);

        let stored = std::fs::read(&doc.file_path).unwrap();
        assert!(page_is_stamped(&stored, 2));
        assert!(!page_is_stamped(&stored, 1));
    }

    #[tokio::test]
    async fn test_second_finalize_conflicts_and_leaves_file_alone() {
        let (state, _dir) = testutil::test_state().await;
        let user = testutil::seed_user(&state).await;
        let (doc, signers) = testutil::seed_document(&state, user, 2, &["alice"]).await;

        finalize_signing(&state, &doc.stored_filename, signers[0], vec![placement_on(1)])
            .await
            .unwrap();
        let after_first = std::fs::read(&doc.file_path).unwrap();

        let err = finalize_signing(&state, &doc.stored_filename, signers[0], vec![
            placement_on(1),
        ])
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::AlreadySigned));

        // No double stamp
        assert_eq!(std::fs::read(&doc.file_path).unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_concurrent_signers_both_land() {
        let (state, _dir) = testutil::test_state().await;
        let user = testutil::seed_user(&state).await;
        let (doc, signers) = testutil::seed_document(&state, user, 3, &["alice", "bob"]).await;

        let (first, second) = tokio::join!(
            finalize_signing(&state, &doc.stored_filename, signers[0], vec![placement_on(1)]),
            finalize_signing(&state, &doc.stored_filename, signers[1], vec![placement_on(2)]),
        );
        first.unwrap();
        second.unwrap();

        // Neither rewrite clobbered the other.
        let stored = std::fs::read(&doc.file_path).unwrap();
        assert!(page_is_stamped(&stored, 1));
        assert!(page_is_stamped(&stored, 2));
        assert!(!page_is_stamped(&stored, 3));

        for id in signers {
            let signer = fetch_signer(&state.db, doc.id, id).await.unwrap().unwrap();
            assert!(signer.is_signed);
        }
    }

    #[tokio::test]
    async fn test_bad_payload_leaves_signer_pending_and_file_intact() {
        let (state, _dir) = testutil::test_state().await;
        let user = testutil::seed_user(&state).await;
        let (doc, signers) = testutil::seed_document(&state, user, 2, &["alice"]).await;
        let original = std::fs::read(&doc.file_path).unwrap();

        let bad = Placement {
            image: "!!garbage!!".into(),
            ..placement_on(1)
        };
        let err = finalize_signing(&state, &doc.stored_filename, signers[0], vec![bad])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Stamp(inksign_core::StampError::DecodeError(_))
        ));

        assert_eq!(std::fs::read(&doc.file_path).unwrap(), original);
        let signer = fetch_signer(&state.db, doc.id, signers[0])
            .await
            .unwrap()
            .unwrap();
        assert!(!signer.is_signed);
    }

    #[tokio::test]
    async fn test_unknown_document_and_signer_are_not_found() {
        let (state, _dir) = testutil::test_state().await;
        let user = testutil::seed_user(&state).await;
        let (doc, _signers) = testutil::seed_document(&state, user, 1, &["alice"]).await;

        let err = finalize_signing(&state, "missing.pdf", 1, vec![]).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = finalize_signing(&state, &doc.stored_filename, 9999, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
