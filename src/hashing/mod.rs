// src/hashing/mod.rs
//! The perceptual hasher seam.
//!
//! `create` binds the certificate to an image by signing a perceptual hash of
//! it rather than the URL alone. The hash must be stable for identical image
//! bytes.

pub mod http_image;

use crate::error::Result;
use async_trait::async_trait;

pub use self::http_image::HttpImageHasher;

/// Computes a fixed-length hex perceptual hash of the image at a URL.
#[async_trait]
pub trait PerceptualHasher: Send + Sync {
    /// Fetch/decode problems surface as `HashFailure`.
    async fn hash(&self, url: &str) -> Result<String>;
}
