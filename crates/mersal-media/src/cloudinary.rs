//! Cloudinary upload API provider.
//!
//! Uses the signed upload endpoint: parameters are signed with SHA-1 over the
//! alphabetically sorted `key=value` pairs followed by the API secret.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::MediaHost;

/// Cloudinary API base URL.
const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Upper bound for a single upload round trip.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: Option<String>,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("folder", &self.folder)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Cloudinary {
    client: Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl Cloudinary {
    pub fn new(config: CloudinaryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    fn upload_url(&self) -> String {
        format!("{API_BASE}/{}/image/upload", self.config.cloud_name)
    }

    /// Parameters that take part in the signature, sorted by key.
    fn signed_params(&self, timestamp: i64) -> Vec<(&'static str, String)> {
        let mut params = vec![("timestamp", timestamp.to_string())];
        if let Some(folder) = &self.config.folder {
            params.push(("folder", folder.clone()));
        }
        params.sort_by(|a, b| a.0.cmp(b.0));
        params
    }
}

fn string_to_sign(sorted_params: &[(&str, String)], api_secret: &str) -> String {
    let joined = sorted_params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{joined}{api_secret}")
}

fn signature(sorted_params: &[(&str, String)], api_secret: &str) -> String {
    let digest = Sha1::digest(string_to_sign(sorted_params, api_secret).as_bytes());
    hex::encode(digest)
}

#[async_trait]
impl MediaHost for Cloudinary {
    fn id(&self) -> &'static str {
        "cloudinary"
    }

    async fn upload_image(&self, image: &str) -> Result<String> {
        let params = self.signed_params(chrono::Utc::now().timestamp());
        let signature = signature(&params, &self.config.api_secret);

        let mut form: Vec<(&str, String)> = params;
        form.push(("file", image.to_string()));
        form.push(("api_key", self.config.api_key.clone()));
        form.push(("signature", signature));

        let response = self
            .client
            .post(self.upload_url())
            .form(&form)
            .send()
            .await
            .context("cloudinary request failed")?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "unreadable error body".into());
            return Err(anyhow!("cloudinary upload failed ({status}): {message}"));
        }

        let body: UploadResponse = response
            .json()
            .await
            .context("cloudinary returned an unexpected body")?;
        debug!(url = %body.secure_url, "image uploaded");
        Ok(body.secure_url)
    }
}
