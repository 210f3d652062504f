use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use mersal_db::models::{MessageRow, UserRow};
use mersal_types::api::SendMessageBody;
use mersal_types::models::{Message, SessionUser, User};

use crate::error::ApiError;
use crate::{AppState, with_db};

/// Every other registered user.
pub async fn get_contacts(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Result<Json<Vec<User>>, ApiError> {
    let uid = user.id.to_string();
    let rows = with_db(&state, move |db| db.get_contacts(&uid)).await?;
    Ok(Json(to_users(rows)))
}

/// Users the caller has exchanged messages with, most recent first.
pub async fn get_chat_partners(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Result<Json<Vec<User>>, ApiError> {
    let uid = user.id.to_string();
    let rows = with_db(&state, move |db| db.get_chat_partners(&uid)).await?;
    Ok(Json(to_users(rows)))
}

/// Conversation history with one partner, oldest first. Clients use this to
/// catch up on anything that was not delivered live.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
    Extension(user): Extension<SessionUser>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let partner_id =
        Uuid::parse_str(&partner_id).map_err(|_| ApiError::BadRequest("Invalid user id"))?;
    let (uid, pid) = (user.id.to_string(), partner_id.to_string());
    let rows = with_db(&state, move |db| db.get_conversation(&uid, &pid)).await?;
    Ok(Json(to_messages(rows)))
}

/// HTTP counterpart of the gateway's `sendMessage`; goes through the same relay,
/// which also rejects a malformed receiver id.
pub async fn send_message(
    State(state): State<AppState>,
    Path(receiver_id): Path<String>,
    Extension(user): Extension<SessionUser>,
    Json(body): Json<SendMessageBody>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .gateway
        .relay()
        .deliver(&user, body.addressed_to(receiver_id))
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

fn to_users(rows: Vec<UserRow>) -> Vec<User> {
    rows.into_iter()
        .filter_map(|row| {
            User::try_from(row)
                .inspect_err(|e| warn!("skipping user: {:#}", e))
                .ok()
        })
        .collect()
}

fn to_messages(rows: Vec<MessageRow>) -> Vec<Message> {
    rows.into_iter()
        .filter_map(|row| {
            Message::try_from(row)
                .inspect_err(|e| warn!("skipping message: {:#}", e))
                .ok()
        })
        .collect()
}
