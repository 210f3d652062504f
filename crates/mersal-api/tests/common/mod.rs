use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use mersal_api::email::LogMailer;
use mersal_api::{AppState, AppStateInner};
use mersal_auth::TokenCodec;
use mersal_db::Database;
use mersal_gateway::{Gateway, Presence, Relay, Store};
use mersal_media::MediaHost;

/// Generous enough that only the dedicated limiter test ever hits it.
pub const RELAXED_RATE_LIMIT: u32 = 1000;

pub struct StaticMedia;

#[async_trait]
impl MediaHost for StaticMedia {
    fn id(&self) -> &'static str {
        "static"
    }

    async fn upload_image(&self, _image: &str) -> Result<String> {
        Ok("https://media.test/avatar.png".to_string())
    }
}

pub fn state(auth_rate_limit: u32) -> AppState {
    let db: Store = Arc::new(Database::open_in_memory().unwrap());
    let media: Arc<dyn MediaHost> = Arc::new(StaticMedia);
    let presence = Presence::new();
    let relay = Relay::new(db.clone(), media.clone(), presence.clone());
    Arc::new(AppStateInner {
        db,
        tokens: TokenCodec::new("api-test-secret", chrono::Duration::days(7)),
        gateway: Gateway::new(presence, relay),
        media,
        mailer: Arc::new(LogMailer),
        secure_cookies: false,
        client_url: "http://localhost:5173".to_string(),
        auth_rate_limit,
    })
}
