//! Shared fixtures for the in-crate tests

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use lopdf::{Dictionary, Document, Object, Stream};
use std::sync::Arc;

use crate::auth;
use crate::models::DbDocument;
use crate::signing;
use crate::state::{AppState, Config};

/// State backed by a throwaway sqlite file and blob root. Keep the
/// returned TempDir alive for the duration of the test.
pub async fn test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        port: 0,
        database_url: format!("sqlite:{}/test.db?mode=rwc", dir.path().display()),
        storage_root: dir.path().join("blobs"),
        frontend_origin: "http://localhost:3000".into(),
        google_client_id: String::new(),
        google_client_secret: String::new(),
        oauth_redirect_url: "http://localhost:8000/auth/google/callback".into(),
        session_secret: "test-secret".into(),
        email_api_key: None,
        email_from: "Inksign <noreply@inksign.local>".into(),
    };
    (AppState::new(config).await.unwrap(), dir)
}

/// Minimal PDF with `num_pages` pages of identifiable text.
pub fn test_pdf(num_pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let catalog_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for page_num in 0..num_pages {
        let page_id = doc.new_object_id();
        let content_id = doc.new_object_id();

        let content = format!("BT /F1 12 Tf 50 700 Td (Page-{}) Tj ET", page_num + 1);
        doc.objects.insert(
            content_id,
            Object::Stream(Stream::new(Dictionary::new(), content.into_bytes())),
        );

        let mut page_dict = Dictionary::new();
        page_dict.set("Type", Object::Name(b"Page".to_vec()));
        page_dict.set("Parent", Object::Reference(pages_id));
        page_dict.set("Contents", Object::Reference(content_id));
        page_dict.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        );
        doc.objects.insert(page_id, Object::Dictionary(page_dict));
        page_ids.push(Object::Reference(page_id));
    }

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Count", Object::Integer(num_pages as i64));
    pages_dict.set("Kids", Object::Array(page_ids));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog_dict = Dictionary::new();
    catalog_dict.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog_dict.set("Pages", Object::Reference(pages_id));
    doc.objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// A small translucent PNG as a data-URL payload.
pub fn png_payload() -> String {
    let mut img = image::RgbaImage::new(4, 4);
    for pixel in img.pixels_mut() {
        *pixel = image::Rgba([0, 0, 0, 200]);
    }
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageOutputFormat::Png)
        .unwrap();
    format!("data:image/png;base64,{}", BASE64.encode(buf.into_inner()))
}

pub async fn seed_user(state: &AppState) -> i64 {
    seed_user_named(state, "uploader@example.com").await
}

pub async fn seed_user_named(state: &AppState, email: &str) -> i64 {
    let result = sqlx::query(
        "INSERT INTO users (email, name, google_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(email)
    .bind("Test User")
    .bind(format!("google-{}", email))
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .unwrap();
    result.last_insert_rowid()
}

/// Valid session cookie header value for `user_id`.
pub fn session_cookie(state: &Arc<AppState>, user_id: i64) -> String {
    let expires_at = Utc::now().timestamp() + auth::SESSION_TTL_SECS;
    let token =
        auth::issue_session_token(user_id, expires_at, &state.config.session_secret).unwrap();
    format!("inksign_session={}", token)
}

/// Store a test PDF and insert its document row plus a signer per name.
/// Returns the document row and the signer ids in roster order.
pub async fn seed_document(
    state: &AppState,
    uploader_id: i64,
    pages: u32,
    signer_names: &[&str],
) -> (DbDocument, Vec<i64>) {
    let pdf = test_pdf(pages);
    let blob = state.storage.store_document(&pdf, "contract.pdf").unwrap();

    sqlx::query(
        r#"
        INSERT INTO documents
            (uploader_id, original_filename, stored_filename, file_path, file_url,
             file_size, mime_type, document_hash, uploaded_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uploader_id)
    .bind("contract.pdf")
    .bind(&blob.stored_filename)
    .bind(blob.path.to_string_lossy().into_owned())
    .bind(&blob.url)
    .bind(pdf.len() as i64)
    .bind("application/pdf")
    .bind("test-hash")
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .unwrap();

    let document = signing::fetch_document(&state.db, &blob.stored_filename)
        .await
        .unwrap()
        .unwrap();

    let mut signer_ids = Vec::new();
    for name in signer_names {
        let result = sqlx::query(
            "INSERT INTO document_signers (document_id, name, email) VALUES (?, ?, ?)",
        )
        .bind(document.id)
        .bind(name)
        .bind(format!("{}@example.com", name))
        .execute(&state.db)
        .await
        .unwrap();
        signer_ids.push(result.last_insert_rowid());
    }

    (document, signer_ids)
}
