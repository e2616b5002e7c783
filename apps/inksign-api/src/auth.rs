//! Identity and session layer
//!
//! Thin Google OAuth boundary: the login route redirects to the consent
//! screen, the callback exchanges the code, fetches the profile, upserts
//! the user row and sets an HMAC-SHA256-signed session cookie of the form
//! `<uid>.<exp>.<sig>` (base64url signature). The extractors below resolve
//! the caller from that cookie.

use axum::async_trait;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::{header, request::Parts};
use axum::response::{IntoResponse, Redirect, Response};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::DbUser;
use crate::state::{AppState, Config};

type HmacSha256 = Hmac<Sha256>;

/// Session lifetime in seconds (7 days)
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

const SESSION_COOKIE: &str = "inksign_session";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Sign `<uid>.<exp>` and append the base64url signature.
pub fn issue_session_token(user_id: i64, expires_at: i64, secret: &str) -> Result<String, String> {
    let payload = format!("{}.{}", user_id, expires_at);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| format!("HMAC error: {}", e))?;
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{}.{}", payload, signature))
}

/// Validate a session token; returns the user id for a well-formed,
/// untampered, unexpired token.
pub fn verify_session_token(token: &str, secret: &str, now: i64) -> Option<i64> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let user_id: i64 = parts[0].parse().ok()?;
    let expires_at: i64 = parts[1].parse().ok()?;
    if expires_at <= now {
        return None;
    }

    let payload = format!("{}.{}", parts[0], parts[1]);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.decode(parts[2]).ok()?;
    mac.verify_slice(&signature).ok()?;

    Some(user_id)
}

/// The Google consent URL for this deployment.
pub fn google_auth_url(config: &Config) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope=openid%20email%20profile",
        GOOGLE_AUTH_URL, config.google_client_id, config.oauth_redirect_url
    )
}

/// Handler: GET /auth/google/login
pub async fn google_login(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::temporary(&google_auth_url(&state.config))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: String,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Handler: GET /auth/google/callback
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, ApiError> {
    let client = reqwest::Client::new();

    let token: GoogleTokenResponse = client
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("code", callback.code.as_str()),
            ("client_id", state.config.google_client_id.as_str()),
            ("client_secret", state.config.google_client_secret.as_str()),
            ("redirect_uri", state.config.oauth_redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ApiError::InvalidRequest(format!("Code exchange failed: {}", e)))?
        .json()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Token response unreadable: {}", e)))?;

    let profile: GoogleUserInfo = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(&token.access_token)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Profile fetch failed: {}", e)))?
        .json()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Profile unreadable: {}", e)))?;

    let user = upsert_user(&state, &profile).await?;
    tracing::info!("User {} logged in via Google", user.id);

    let expires_at = Utc::now().timestamp() + SESSION_TTL_SECS;
    let token = issue_session_token(user.id, expires_at, &state.config.session_secret)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, SESSION_TTL_SECS
    );

    Ok((
        [(header::SET_COOKIE, cookie)],
        Redirect::temporary(&state.config.frontend_origin),
    )
        .into_response())
}

async fn upsert_user(state: &AppState, profile: &GoogleUserInfo) -> Result<DbUser, ApiError> {
    let display_name = profile.name.clone().unwrap_or_else(|| profile.email.clone());

    sqlx::query(
        r#"
        INSERT INTO users (email, name, google_id, picture, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(google_id) DO UPDATE SET
            email = excluded.email,
            name = excluded.name,
            picture = excluded.picture
        "#,
    )
    .bind(&profile.email)
    .bind(&display_name)
    .bind(&profile.id)
    .bind(&profile.picture)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    let user: DbUser = sqlx::query_as("SELECT * FROM users WHERE google_id = ?")
        .bind(&profile.id)
        .fetch_one(&state.db)
        .await?;
    Ok(user)
}

/// Authenticated caller, resolved from the session cookie.
pub struct CurrentUser(pub DbUser);

/// Caller for endpoints that allow anonymous access.
pub struct MaybeUser(pub Option<DbUser>);

async fn resolve_user(parts: &Parts, state: &AppState) -> Result<Option<DbUser>, ApiError> {
    let Some(cookies) = parts.headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };

    let Some(token) = cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    }) else {
        return Ok(None);
    };

    let Some(user_id) =
        verify_session_token(token, &state.config.session_secret, Utc::now().timestamp())
    else {
        return Ok(None);
    };

    let user: Option<DbUser> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?;
    Ok(user)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state)
            .await?
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve_user(parts, state).await?))
    }
}
