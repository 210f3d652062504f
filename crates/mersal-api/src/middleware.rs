use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use mersal_gateway::gate;

use crate::AppState;
use crate::error::ApiError;

/// Authenticate the `jwt` cookie and expose the caller as
/// `Extension<SessionUser>` to downstream handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = req.headers().clone();
    let user = match gate::authenticate(&headers, &state.tokens, &state.db).await {
        Ok(user) => user,
        Err(e) => {
            debug!("{} {} rejected: {}", req.method(), req.uri().path(), e);
            return Err(e.into());
        }
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
