//! Database row types. These map directly to SQLite rows and are kept apart
//! from the `mersal-types` API models so the wire format can evolve freely.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use mersal_types::models::{Message, User};

pub struct UserRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub profile_pic: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub created_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row
                .id
                .parse()
                .with_context(|| format!("corrupt user id '{}'", row.id))?,
            full_name: row.full_name,
            email: row.email,
            profile_pic: row.profile_pic,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let context = |field: &str| format!("corrupt {field} on message '{}'", row.id);
        Ok(Message {
            id: row.id.parse().with_context(|| context("id"))?,
            sender_id: row.sender_id.parse().with_context(|| context("sender_id"))?,
            receiver_id: row
                .receiver_id
                .parse()
                .with_context(|| context("receiver_id"))?,
            created_at: parse_timestamp(&row.created_at).with_context(|| context("created_at"))?,
            text: row.text,
            image: row.image,
        })
    }
}

impl From<&Message> for MessageRow {
    fn from(message: &Message) -> Self {
        MessageRow {
            id: message.id.to_string(),
            sender_id: message.sender_id.to_string(),
            receiver_id: message.receiver_id.to_string(),
            text: message.text.clone(),
            image: message.image.clone(),
            created_at: format_timestamp(message.created_at),
        }
    }
}

/// Timestamps are stored as RFC 3339 with millisecond precision so that the
/// text column sorts chronologically.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
