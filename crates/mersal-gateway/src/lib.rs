//! Realtime layer: connection authentication, presence tracking and
//! single-hop message relay.

pub mod connection;
pub mod gate;
pub mod presence;
pub mod relay;

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use mersal_db::Database;
use mersal_types::events::{ClientCommand, SendMessageResponse, ServerEvent};
use mersal_types::models::SessionUser;

pub use gate::AuthError;
pub use presence::{ConnectionId, Presence};
pub use relay::{Relay, RelayError};

const SEND_MESSAGE: &str = "sendMessage";
const INVALID_PAYLOAD: &str = "Invalid message payload";

/// Shared handle to the user/message store.
pub type Store = Arc<Database>;

/// Everything a live connection needs: presence registry and relay.
#[derive(Clone)]
pub struct Gateway {
    presence: Presence,
    relay: Relay,
}

/// One authenticated connection's view of the gateway.
pub struct Session {
    pub user: SessionUser,
    pub conn_id: ConnectionId,
    outbox: mpsc::UnboundedSender<ServerEvent>,
}

/// Event sources a connection drains towards its socket.
pub struct SessionStreams {
    /// Events targeted at this connection only
    pub targeted: mpsc::UnboundedReceiver<ServerEvent>,
    /// Events sent to every connection
    pub broadcast: broadcast::Receiver<ServerEvent>,
}

impl Gateway {
    pub fn new(presence: Presence, relay: Relay) -> Self {
        Self { presence, relay }
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Register an authenticated connection. The broadcast subscription is
    /// taken before the presence entry is recorded, so the returned streams
    /// include the `getOnlineUsers` event announcing this user.
    pub async fn attach(&self, user: SessionUser) -> (Session, SessionStreams) {
        let conn_id = Uuid::new_v4();
        let (outbox, targeted) = mpsc::unbounded_channel();
        let broadcast = self.presence.subscribe();

        if let Some(evicted) = self.presence.record(user.id, conn_id, outbox.clone()).await {
            info!(
                "{} ({}) reconnected, connection {} superseded",
                user.full_name, user.id, evicted
            );
        }

        let session = Session {
            user,
            conn_id,
            outbox,
        };
        (session, SessionStreams { targeted, broadcast })
    }

    /// Process one raw text frame. A `sendMessage` frame whose data cannot be
    /// read is still answered, with a failed `sendMessageResponse`.
    pub async fn handle_frame(&self, session: &Session, raw: &str) {
        match serde_json::from_str::<ClientCommand>(raw) {
            Ok(cmd) => self.handle_command(session, cmd).await,
            Err(e) => {
                let preview: String = raw.chars().take(200).collect();
                warn!(
                    "{} ({}) bad command: {} -- raw: {}",
                    session.user.full_name, session.user.id, e, preview
                );
                if command_kind(raw).as_deref() == Some(SEND_MESSAGE) {
                    respond(session, SendMessageResponse::failed(INVALID_PAYLOAD));
                }
            }
        }
    }

    /// Process one client command. Commands of a session are handled one at
    /// a time, in arrival order.
    pub async fn handle_command(&self, session: &Session, cmd: ClientCommand) {
        match cmd {
            ClientCommand::SendMessage(payload) => {
                let response = match self.relay.deliver(&session.user, payload).await {
                    Ok(message) => SendMessageResponse::sent(message),
                    Err(e) => {
                        warn!("{} ({}) send failed: {}", session.user.full_name, session.user.id, e);
                        SendMessageResponse::failed(e.to_string())
                    }
                };
                respond(session, response);
            }
        }
    }

    /// Remove the connection from presence, unless a newer connection of the
    /// same user has taken over.
    pub async fn detach(&self, session: &Session) {
        self.presence.release(session.user.id, session.conn_id).await;
    }
}

fn respond(session: &Session, response: SendMessageResponse) {
    // The sender may already be gone; the response is then dropped.
    let _ = session
        .outbox
        .send(ServerEvent::SendMessageResponse(response));
}

/// The `type` of a raw frame, read without looking at its `data`.
fn command_kind(raw: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Envelope {
        #[serde(rename = "type")]
        kind: String,
    }

    serde_json::from_str::<Envelope>(raw).ok().map(|e| e.kind)
}
