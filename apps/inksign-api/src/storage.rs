//! Blob storage for uploaded documents and signature images
//!
//! Blobs live under a configurable root with `documents/` and
//! `signatures/` subdirectories and are stored under generated names only
//! (a fresh UUID plus a sanitized extension), never under user-supplied
//! names. Writes stage to a temporary sibling and rename into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DOCUMENTS_DIR: &str = "documents";
pub const SIGNATURES_DIR: &str = "signatures";

pub struct BlobStore {
    root: PathBuf,
}

/// Handle to a freshly stored blob.
pub struct StoredBlob {
    pub stored_filename: String,
    pub path: PathBuf,
    pub url: String,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(DOCUMENTS_DIR))?;
        fs::create_dir_all(root.join(SIGNATURES_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an uploaded document. Only the extension of the original
    /// filename survives, lowercased and restricted to alphanumerics.
    pub fn store_document(&self, bytes: &[u8], original_filename: &str) -> io::Result<StoredBlob> {
        let extension = sanitized_extension(original_filename).unwrap_or_else(|| "pdf".into());
        let stored_filename = format!("{}.{}", Uuid::new_v4(), extension);
        self.store(DOCUMENTS_DIR, stored_filename, bytes)
    }

    /// Store a signature image; always PNG by the time it reaches storage.
    pub fn store_signature(&self, bytes: &[u8]) -> io::Result<StoredBlob> {
        let stored_filename = format!("sign_{}.png", Uuid::new_v4());
        self.store(SIGNATURES_DIR, stored_filename, bytes)
    }

    pub fn document_path(&self, stored_filename: &str) -> PathBuf {
        self.root.join(DOCUMENTS_DIR).join(stored_filename)
    }

    pub fn signature_path(&self, stored_filename: &str) -> PathBuf {
        self.root.join(SIGNATURES_DIR).join(stored_filename)
    }

    /// Remove a blob; a missing file is not an error.
    pub fn delete(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn store(&self, dir: &str, stored_filename: String, bytes: &[u8]) -> io::Result<StoredBlob> {
        let path = self.root.join(dir).join(&stored_filename);
        write_atomic(&path, bytes)?;
        Ok(StoredBlob {
            url: format!("/resources/{}/{}", dir, stored_filename),
            stored_filename,
            path,
        })
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        e
    })
}

fn sanitized_extension(filename: &str) -> Option<String> {
    let extension = Path::new(filename).extension()?.to_str()?;
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> (BlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (BlobStore::new(dir.path().join("blobs")).unwrap(), dir)
    }

    #[test]
    fn test_documents_get_generated_names() {
        let (store, _dir) = store();
        let blob = store.store_document(b"%PDF-1.5", "My Contract.PDF").unwrap();

        assert!(!blob.stored_filename.contains("Contract"));
        assert!(blob.stored_filename.ends_with(".pdf"));
        assert_eq!(blob.url, format!("/resources/documents/{}", blob.stored_filename));
        assert_eq!(fs::read(&blob.path).unwrap(), b"%PDF-1.5");
    }

    #[test]
    fn test_traversal_attempts_stay_under_the_root() {
        let (store, _dir) = store();
        let blob = store
            .store_document(b"%PDF-1.5", "../../../../etc/passwd")
            .unwrap();

        assert!(blob.path.starts_with(store.root()));
        // "passwd" has no extension component worth keeping
        assert!(blob.stored_filename.ends_with(".pdf"));
    }

    #[test]
    fn test_hostile_extension_falls_back_to_pdf() {
        let (store, _dir) = store();
        let blob = store.store_document(b"%PDF-1.5", "doc.p/d;f").unwrap();
        assert!(blob.stored_filename.ends_with(".pdf"));
    }

    #[test]
    fn test_signature_names_are_prefixed_png() {
        let (store, _dir) = store();
        let blob = store.store_signature(b"\x89PNG\r\n\x1a\n").unwrap();
        assert!(blob.stored_filename.starts_with("sign_"));
        assert!(blob.stored_filename.ends_with(".png"));
        assert_eq!(blob.path, store.signature_path(&blob.stored_filename));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, _dir) = store();
        let blob = store.store_signature(b"\x89PNG\r\n\x1a\n").unwrap();

        store.delete(&blob.path).unwrap();
        assert!(!blob.path.exists());
        store.delete(&blob.path).unwrap();
    }

    #[test]
    fn test_no_staging_leftovers() {
        let (store, _dir) = store();
        store.store_document(b"%PDF-1.5", "a.pdf").unwrap();

        let leftovers: Vec<_> = fs::read_dir(store.root().join(DOCUMENTS_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
