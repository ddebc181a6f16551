// src/hashing/http_image.rs
//! HTTP image hasher.
//!
//! Downloads the image at a URL and computes a blockhash of it.
//!
//! # Features
//! - Whole-request timeout from [`HasherSettings`]
//! - Any decodable raster format the `image` crate supports
//! - Decoding and hashing on the blocking pool, off the async executor
//!
//! The default 16x16 grid yields a 256-bit hash rendered as 64 lowercase hex
//! characters.

use crate::config::HasherSettings;
use crate::error::{NametagError, Result};
use crate::hashing::PerceptualHasher;
use async_trait::async_trait;
use image_hasher::{HashAlg, HasherConfig};
use log::debug;
use std::time::Duration;
use tokio::task;

/// Perceptual hasher that fetches images over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpImageHasher {
    client: reqwest::Client,
    hash_width: u32,
    hash_height: u32,
}

impl HttpImageHasher {
    /// Creates a hasher with default settings (30s timeout, 16x16 grid).
    pub fn new() -> Result<Self> {
        Self::from_settings(&HasherSettings::default())
    }

    /// Creates a hasher from explicit settings.
    ///
    /// # Errors
    /// `HashFailure` if the grid is empty or the HTTP client cannot be built.
    pub fn from_settings(settings: &HasherSettings) -> Result<Self> {
        if settings.hash_width == 0 || settings.hash_height == 0 {
            return Err(NametagError::hash(format!(
                "hash grid must be non-empty, got {}x{}",
                settings.hash_width, settings.hash_height
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .build()
            .map_err(NametagError::hash)?;
        Ok(Self {
            client,
            hash_width: settings.hash_width,
            hash_height: settings.hash_height,
        })
    }

    /// Hashes already-downloaded image bytes.
    pub fn hash_bytes(&self, bytes: &[u8]) -> Result<String> {
        hash_image_bytes(bytes, self.hash_width, self.hash_height)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| NametagError::hash(format!("cannot fetch {url}: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| NametagError::hash(format!("cannot read body of {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl PerceptualHasher for HttpImageHasher {
    async fn hash(&self, url: &str) -> Result<String> {
        let bytes = self.fetch(url).await?;
        debug!("fetched {} bytes from {url}", bytes.len());

        let (width, height) = (self.hash_width, self.hash_height);
        task::spawn_blocking(move || hash_image_bytes(&bytes, width, height))
            .await
            .map_err(|e| NametagError::hash(format!("hash worker failed: {e}")))?
    }
}

fn hash_image_bytes(bytes: &[u8], width: u32, height: u32) -> Result<String> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| NametagError::hash(format!("cannot decode image: {e}")))?;
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Blockhash)
        .hash_size(width, height)
        .to_hasher();
    let hash = hasher.hash_image(&image);
    Ok(hex::encode(hash.as_bytes()))
}
