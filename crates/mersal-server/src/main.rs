mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mersal_api::email::{LogMailer, Mailer, SmtpMailer};
use mersal_api::{AppState, AppStateInner};
use mersal_auth::TokenCodec;
use mersal_auth::token::DEFAULT_TTL_DAYS;
use mersal_db::Database;
use mersal_gateway::{Gateway, Presence, Relay};
use mersal_media::{Cloudinary, DisabledMediaHost, MediaHost};

use crate::config::Config;

/// Profile pictures and chat images arrive inline as data URIs.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mersal=debug,mersal_gateway=debug,mersal_api=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if !config.production {
        warn!("running in development mode: session cookies are not marked Secure");
    }

    let db = Arc::new(Database::open(&config.db_path)?);
    let tokens = TokenCodec::new(&config.jwt_secret, chrono::Duration::days(DEFAULT_TTL_DAYS));

    let media: Arc<dyn MediaHost> = match config.cloudinary.clone() {
        Some(cloudinary) => Arc::new(Cloudinary::new(cloudinary)?),
        None => {
            warn!("Cloudinary is not configured, image uploads will be rejected");
            Arc::new(DisabledMediaHost)
        }
    };
    let mailer: Arc<dyn Mailer> = match config.smtp.clone() {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            info!("SMTP is not configured, emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let presence = Presence::new();
    let relay = Relay::new(db.clone(), media.clone(), presence.clone());
    let state: AppState = Arc::new(AppStateInner {
        db,
        tokens,
        gateway: Gateway::new(presence, relay),
        media,
        mailer,
        secure_cookies: config.production,
        client_url: config.client_url.clone(),
        auth_rate_limit: config.auth_rate_limit,
    });

    let cors = CorsLayer::new()
        .allow_origin([config.client_url.parse::<HeaderValue>()?])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    let mut app = mersal_api::router(state);
    if let Some(dir) = &config.static_dir {
        info!("serving client from {}", dir.display());
        let client = ServeDir::new(dir).not_found_service(ServeFile::new(dir.join("index.html")));
        app = app.fallback_service(client);
    }

    let app = app
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Mersal server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Peer addresses key the auth rate limiter when no proxy header is present
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!("failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
