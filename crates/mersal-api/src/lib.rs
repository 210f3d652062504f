pub mod auth;
pub mod email;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{StatusCode, header::RETRY_AFTER},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tracing::{error, warn};

use mersal_auth::TokenCodec;
use mersal_db::Database;
use mersal_gateway::{Gateway, Store};
use mersal_media::MediaHost;

use crate::email::Mailer;
use crate::error::ApiError;
use crate::middleware::require_auth;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Store,
    pub tokens: TokenCodec,
    pub gateway: Gateway,
    pub media: Arc<dyn MediaHost>,
    pub mailer: Arc<dyn Mailer>,
    /// Mark the session cookie `Secure` (production only)
    pub secure_cookies: bool,
    /// Frontend origin, linked from outgoing email
    pub client_url: String,
    /// Requests per minute per client IP on `/api/auth`; 0 disables the limit
    pub auth_rate_limit: u32,
}

/// REST routes under `/api` and the WebSocket upgrade at `/ws`.
pub fn router(state: AppState) -> Router {
    let auth_public = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login));

    let auth_protected = Router::new()
        .route("/logout", post(auth::logout))
        .route("/update-profile", put(auth::update_profile))
        .route("/check-auth", get(auth::check_auth))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let messages = Router::new()
        .route("/contacts", get(messages::get_contacts))
        .route("/chat-partners", get(messages::get_chat_partners))
        .route(
            "/{user_id}",
            get(messages::get_messages).post(messages::send_message),
        )
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let mut auth = auth_public.merge(auth_protected);
    if state.auth_rate_limit > 0 {
        let config = GovernorConfigBuilder::default()
            .period(refill_period(state.auth_rate_limit))
            .burst_size(state.auth_rate_limit)
            .key_extractor(SmartIpKeyExtractor)
            .finish();
        match config {
            Some(config) => {
                auth = auth
                    .layer(GovernorLayer::new(Arc::new(config)))
                    .layer(axum_middleware::map_response(rate_limited_as_json));
            }
            None => warn!("invalid auth rate limit {}, limiter disabled", state.auth_rate_limit),
        }
    }

    Router::new()
        .nest("/api/auth", auth)
        .nest("/api/messages", messages)
        .route("/ws", get(ws::ws_upgrade))
        .with_state(state)
}

/// One request token comes back every `60s / per_minute`.
fn refill_period(per_minute: u32) -> Duration {
    (Duration::from_secs(60) / per_minute).max(Duration::from_millis(1))
}

/// The limiter answers in plain text; keep the `{ "message": ... }` contract.
async fn rate_limited_as_json(response: Response) -> Response {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }
    warn!("auth rate limit hit");
    let retry_after = response.headers().get(RETRY_AFTER).cloned();
    let mut limited = ApiError::RateLimited.into_response();
    if let Some(value) = retry_after {
        limited.headers_mut().insert(RETRY_AFTER, value);
    }
    limited
}

/// Run a blocking store call off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(|e| {
            error!("DB error: {:#}", e);
            ApiError::Internal(e)
        })
}
