//! Authentication of incoming connections. Runs once per WebSocket upgrade
//! and once per protected HTTP request.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use thiserror::Error;
use tracing::{debug, error};

use mersal_auth::{SESSION_COOKIE, TokenCodec};
use mersal_types::models::{SessionUser, User};

use crate::Store;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized - No Token Provided")]
    NoCredential,

    #[error("Unauthorized - Invalid Token")]
    InvalidOrExpiredCredential,

    #[error("User not found")]
    UnknownUser,

    #[error("Unauthorized - Authentication failed")]
    Unavailable(#[source] anyhow::Error),
}

/// Session token from the `jwt` cookie, if one is present and non-empty.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Resolve the handshake credentials to a user, or reject. Never partially
/// authenticates: the caller gets a full `SessionUser` or an error.
pub async fn authenticate(
    headers: &HeaderMap,
    tokens: &TokenCodec,
    store: &Store,
) -> Result<SessionUser, AuthError> {
    let token = session_token(headers).ok_or(AuthError::NoCredential)?;

    let claims = tokens.verify(&token).map_err(|e| {
        debug!("rejecting session token: {}", e);
        AuthError::InvalidOrExpiredCredential
    })?;

    let db = store.clone();
    let uid = claims.sub.to_string();
    let row = tokio::task::spawn_blocking(move || db.get_user_by_id(&uid))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AuthError::Unavailable(e.into())
        })?
        .map_err(|e| {
            error!("DB get_user_by_id error: {}", e);
            AuthError::Unavailable(e)
        })?
        .ok_or(AuthError::UnknownUser)?;

    User::try_from(row).map_err(AuthError::Unavailable)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::header::COOKIE;
    use chrono::Duration;
    use mersal_db::Database;
    use uuid::Uuid;

    use super::*;

    fn setup() -> (Store, TokenCodec, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), "Layla", "layla@example.com", "hash")
            .unwrap();
        (db, TokenCodec::new("gate-secret", Duration::days(7)), id)
    }

    fn with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, value.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn valid_cookie_resolves_user() {
        let (db, tokens, id) = setup();
        let token = tokens.issue(id).unwrap();
        let headers = with_cookie(&format!("theme=dark; jwt={token}"));

        let user = authenticate(&headers, &tokens, &db).await.unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.full_name, "Layla");
    }

    #[tokio::test]
    async fn missing_cookie_is_no_credential() {
        let (db, tokens, _) = setup();
        let err = authenticate(&HeaderMap::new(), &tokens, &db).await.unwrap_err();
        assert!(matches!(err, AuthError::NoCredential));

        let err = authenticate(&with_cookie("jwt="), &tokens, &db).await.unwrap_err();
        assert!(matches!(err, AuthError::NoCredential));
    }

    #[tokio::test]
    async fn foreign_or_expired_token_is_invalid() {
        let (db, tokens, id) = setup();

        let forged = TokenCodec::new("other", Duration::days(7)).issue(id).unwrap();
        let err = authenticate(&with_cookie(&format!("jwt={forged}")), &tokens, &db)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredCredential));

        let expired = TokenCodec::new("gate-secret", Duration::hours(-2)).issue(id).unwrap();
        let err = authenticate(&with_cookie(&format!("jwt={expired}")), &tokens, &db)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredCredential));
    }

    #[tokio::test]
    async fn token_for_deleted_user_is_unknown_user() {
        let (db, tokens, _) = setup();
        let token = tokens.issue(Uuid::new_v4()).unwrap();
        let err = authenticate(&with_cookie(&format!("jwt={token}")), &tokens, &db)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownUser));
    }
}
