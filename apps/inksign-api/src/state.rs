//! Application state for the Inksign API

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;

use crate::notify::EmailNotifier;
use crate::realtime::SessionHub;
use crate::signing::DocumentLocks;
use crate::storage::BlobStore;

/// Runtime configuration, read once at startup from the environment
/// (a `.env` file is honored in development).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub storage_root: PathBuf,
    pub frontend_origin: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub oauth_redirect_url: String,
    pub session_secret: String,
    pub email_api_key: Option<String>,
    pub email_from: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:inksign.db?mode=rwc".to_string()),
            storage_root: PathBuf::from(
                std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "resources".to_string()),
            ),
            frontend_origin: std::env::var("FRONTEND_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            google_client_id: std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: std::env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            oauth_redirect_url: std::env::var("OAUTH_REDIRECT_URL")
                .unwrap_or_else(|_| "http://localhost:8000/auth/google/callback".to_string()),
            session_secret: std::env::var("SESSION_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".to_string()),
            email_api_key: std::env::var("EMAIL_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Inksign <noreply@inksign.local>".to_string()),
        }
    }
}

pub struct AppState {
    pub config: Config,
    pub db: SqlitePool,
    pub storage: BlobStore,
    pub locks: DocumentLocks,
    pub hub: SessionHub,
    pub notifier: EmailNotifier,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        tracing::info!("Connecting to database: {}", config.database_url);

        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::run_migrations(&db).await?;

        let storage = BlobStore::new(&config.storage_root)?;
        let notifier = EmailNotifier::new(
            config.email_api_key.clone(),
            config.email_from.clone(),
            config.frontend_origin.clone(),
        );

        Ok(Self {
            config,
            db,
            storage,
            locks: DocumentLocks::default(),
            hub: SessionHub::default(),
            notifier,
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                google_id TEXT NOT NULL UNIQUE,
                picture TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uploader_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                original_filename TEXT NOT NULL,
                stored_filename TEXT NOT NULL UNIQUE,
                file_path TEXT NOT NULL,
                file_url TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                document_hash TEXT NOT NULL,
                uploaded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_signers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                email TEXT,
                role TEXT,
                is_signed INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signature_assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
                stored_filename TEXT NOT NULL UNIQUE,
                file_url TEXT NOT NULL,
                uploaded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Indexes for the common lookups
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_uploader ON documents(uploader_id)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_signers_document ON document_signers(document_id)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_assets_user ON signature_assets(user_id)",
        )
        .execute(pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}
