use axum::{
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use tracing::warn;

use mersal_gateway::{connection, gate};

use crate::AppState;
use crate::error::ApiError;

/// Authenticate from the session cookie before upgrading; rejected
/// handshakes never become sockets.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match gate::authenticate(&headers, &state.tokens, &state.db).await {
        Ok(user) => user,
        Err(e) => {
            warn!("rejected gateway handshake: {}", e);
            return ApiError::Auth(e).into_response();
        }
    };

    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway, user))
}
