use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use mersal_db::models::MessageRow;
use mersal_media::MediaHost;
use mersal_types::api::SendMessagePayload;
use mersal_types::events::ServerEvent;
use mersal_types::models::{Message, SessionUser};

use crate::Store;
use crate::presence::Presence;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("All fields are required")]
    MissingContent,

    #[error("You cannot send message to yourself")]
    SelfMessage,

    #[error("Receiver not found")]
    UnknownReceiver,

    #[error("Failed to upload image")]
    Upload(#[source] anyhow::Error),

    #[error("Internal server error")]
    Store(#[source] anyhow::Error),
}

/// Persists chat messages and forwards them to the receiver's live
/// connection, if there is one. Forwarding is a single best-effort hop.
#[derive(Clone)]
pub struct Relay {
    store: Store,
    media: Arc<dyn MediaHost>,
    presence: Presence,
}

impl Relay {
    pub fn new(store: Store, media: Arc<dyn MediaHost>, presence: Presence) -> Self {
        Self {
            store,
            media,
            presence,
        }
    }

    pub async fn deliver(
        &self,
        sender: &SessionUser,
        payload: SendMessagePayload,
    ) -> Result<Message, RelayError> {
        let text = non_empty(payload.text);
        let image = non_empty(payload.image);
        if text.is_none() && image.is_none() {
            return Err(RelayError::MissingContent);
        }

        // A missing or malformed id cannot name a registered user.
        let receiver_id = Uuid::parse_str(payload.receiver_id.trim())
            .map_err(|_| RelayError::UnknownReceiver)?;
        if receiver_id == sender.id {
            return Err(RelayError::SelfMessage);
        }

        if !self.user_exists(receiver_id).await? {
            return Err(RelayError::UnknownReceiver);
        }

        // Upload before persisting: a message must never point at a missing image.
        let image_url = match image {
            Some(image) => Some(self.media.upload_image(&image).await.map_err(|e| {
                error!("{} upload from {} failed: {:#}", self.media.id(), sender.id, e);
                RelayError::Upload(e)
            })?),
            None => None,
        };

        let message = Message {
            id: Uuid::new_v4(),
            sender_id: sender.id,
            receiver_id,
            text,
            image: image_url,
            created_at: Utc::now(),
        };
        self.persist(&message).await?;

        let forwarded = self
            .presence
            .send_to(receiver_id, ServerEvent::NewMessage(message.clone()))
            .await;
        info!(
            message_id = %message.id,
            from = %sender.id,
            to = %receiver_id,
            forwarded,
            "message relayed"
        );

        Ok(message)
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, RelayError> {
        let db = self.store.clone();
        let uid = user_id.to_string();
        let row = tokio::task::spawn_blocking(move || db.get_user_by_id(&uid))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                RelayError::Store(e.into())
            })?
            .map_err(|e| {
                error!("DB get_user_by_id error: {}", e);
                RelayError::Store(e)
            })?;
        Ok(row.is_some())
    }

    async fn persist(&self, message: &Message) -> Result<(), RelayError> {
        let db = self.store.clone();
        let row = MessageRow::from(message);
        tokio::task::spawn_blocking(move || db.insert_message(&row))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                RelayError::Store(e.into())
            })?
            .map_err(|e| {
                error!("DB insert_message error: {}", e);
                RelayError::Store(e)
            })?;
        debug!(message_id = %message.id, "message persisted");
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
