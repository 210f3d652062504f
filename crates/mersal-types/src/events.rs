use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::SendMessagePayload;
use crate::models::Message;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full set of online user ids, sent to everyone on every presence change
    GetOnlineUsers(Vec<Uuid>),

    /// A user's last connection went away
    UserDisconnected(Uuid),

    /// Result of a `sendMessage` command, sent only to the connection that issued it
    SendMessageResponse(SendMessageResponse),

    /// Live delivery of a message to its receiver
    NewMessage(Message),
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    SendMessage(SendMessagePayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub info: SendOutcome,
}

/// Either the persisted message or a human-readable failure reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendOutcome {
    Sent(Message),
    Failed(String),
}

impl SendMessageResponse {
    pub fn sent(message: Message) -> Self {
        Self {
            success: true,
            info: SendOutcome::Sent(message),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            info: SendOutcome::Failed(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_events_use_socket_event_names() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(ServerEvent::UserDisconnected(id)).unwrap();
        assert_eq!(json["type"], "userDisconnected");
        assert_eq!(json["data"], id.to_string());

        let json = serde_json::to_value(ServerEvent::GetOnlineUsers(vec![id])).unwrap();
        assert_eq!(json["type"], "getOnlineUsers");
        assert_eq!(json["data"][0], id.to_string());
    }

    #[test]
    fn failed_response_carries_plain_string_info() {
        let event = ServerEvent::SendMessageResponse(SendMessageResponse::failed(
            "You cannot send message to yourself",
        ));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sendMessageResponse");
        assert_eq!(json["data"]["success"], false);
        assert_eq!(json["data"]["info"], "You cannot send message to yourself");
    }

    #[test]
    fn send_message_command_parses_camel_case_payload() {
        let receiver = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"sendMessage","data":{{"receiverId":"{receiver}","text":"hi"}}}}"#
        );
        let command: ClientCommand = serde_json::from_str(&raw).unwrap();
        let ClientCommand::SendMessage(payload) = command;
        assert_eq!(payload.receiver_id, receiver.to_string());
        assert_eq!(payload.text.as_deref(), Some("hi"));
        assert!(payload.image.is_none());
    }

    #[test]
    fn send_message_command_tolerates_bad_receiver() {
        let command: ClientCommand =
            serde_json::from_str(r#"{"type":"sendMessage","data":{"receiverId":"u2","text":"hi"}}"#)
                .unwrap();
        let ClientCommand::SendMessage(payload) = command;
        assert_eq!(payload.receiver_id, "u2");

        let command: ClientCommand =
            serde_json::from_str(r#"{"type":"sendMessage","data":{"text":"hi"}}"#).unwrap();
        let ClientCommand::SendMessage(payload) = command;
        assert!(payload.receiver_id.is_empty());
    }
}
