//! Image hosting. Chat images and profile pictures are handed to a third-party
//! media host; only the returned public URL is persisted.

pub mod cloudinary;

use anyhow::{Result, bail};
use async_trait::async_trait;

pub use cloudinary::{Cloudinary, CloudinaryConfig};

#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Short identifier used in logs.
    fn id(&self) -> &'static str;

    /// Upload an image given as a data URI or a remote URL and return the
    /// public HTTPS URL it is served from.
    async fn upload_image(&self, image: &str) -> Result<String>;
}

/// Used when no media host is configured: every upload fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMediaHost;

#[async_trait]
impl MediaHost for DisabledMediaHost {
    fn id(&self) -> &'static str {
        "disabled"
    }

    async fn upload_image(&self, _image: &str) -> Result<String> {
        bail!("no media host configured")
    }
}
