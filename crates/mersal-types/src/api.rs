use serde::{Deserialize, Serialize};

// -- Auth --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub profile_pic: Option<String>,
}

/// Plain `{ "message": ... }` body used for acknowledgements and errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// -- Messages --

/// Body of `POST /api/messages/{receiver_id}`; the receiver comes from the path.
#[derive(Debug, Default, Deserialize)]
pub struct SendMessageBody {
    pub text: Option<String>,
    pub image: Option<String>,
}

/// A chat message as submitted by a client, before validation.
/// `image` is raw image data (usually a data URI) that still has to be uploaded.
///
/// `receiver_id` stays a raw string so that a missing or malformed id is
/// answered by the relay like any other rejected send.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    #[serde(default)]
    pub receiver_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl SendMessageBody {
    pub fn addressed_to(self, receiver_id: impl Into<String>) -> SendMessagePayload {
        SendMessagePayload {
            receiver_id: receiver_id.into(),
            text: self.text,
            image: self.image,
        }
    }
}
