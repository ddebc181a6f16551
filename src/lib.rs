// src/lib.rs

//! # Nametag - Certificate Envelope Protocol
//!
//! A granter attests facts about a grantee (text, an image hash, references
//! to prior certificates) through a three-step OpenPGP handshake:
//!
//! 1. **create**: the granter signs the body and encrypts it for the grantee
//! 2. **approve**: the grantee countersigns over the body plus the granter's
//!    signature and encrypts it back
//! 3. **finalize**: the granter decrypts and obtains the plaintext record
//!    carrying both signatures and both public keys
//!
//! ## Architecture Overview
//! 1. **Crypto Layer**: `CryptoProvider` trait, `OpenPgpProvider` on Sequoia
//! 2. **Hashing Layer**: `PerceptualHasher` trait, `HttpImageHasher`
//! 3. **Envelope Layer**: split/merge/rebuild of cleartext-signed messages
//! 4. **Services Layer**: `CertificateProtocol` and `RecordVerifier`
//!
//! Key storage, transport and persistence are left to the caller. Armored
//! text is the only interchange format.
//!
//! ## Example
//! ```no_run
//! use nametag::{CertificateBody, CertificateProtocol, Settings, UserIdentity};
//!
//! # async fn run() -> nametag::Result<()> {
//! let protocol = CertificateProtocol::from_settings(&Settings::from_env()?)?;
//! let granter = protocol.generate_keys(&[UserIdentity::new("Nametag", "test@ntag.id")]).await?;
//! let grantee = protocol.generate_keys(&[UserIdentity::new("Jon Smith", "jon@example.com")]).await?;
//!
//! let body = CertificateBody::new()
//!     .with_description("A headline")
//!     .with_text("A description")
//!     .with_image_url("https://example.org/x.png");
//!
//! let created = protocol
//!     .create(&body, &granter.private_key_armored, &grantee.public_key_armored)
//!     .await?;
//! let approved = protocol
//!     .approve(&created, &grantee.private_key_armored, &granter.public_key_armored)
//!     .await?;
//! let record = protocol
//!     .finalize(
//!         &approved,
//!         &granter.private_key_armored,
//!         &grantee.public_key_armored,
//!         &granter.public_key_armored,
//!     )
//!     .await?;
//! assert!(protocol.validate(&record).await?.is_valid());
//! # Ok(())
//! # }
//! ```

// Module declarations (organized by functional domain)
pub mod config;    // Settings loading
pub mod crypto;    // OpenPGP provider
pub mod envelope;  // Signed-cleartext codec
pub mod error;     // Error types
pub mod hashing;   // Perceptual image hashing
pub mod models;    // Data structures
pub mod services;  // Certificate protocol and record verification
pub mod utils;     // Helper functions

pub use crate::config::Settings;
pub use crate::crypto::{CryptoProvider, OpenPgpProvider};
pub use crate::error::{NametagError, Result};
pub use crate::hashing::{HttpImageHasher, PerceptualHasher};
pub use crate::models::{
    CertificateBody, CertificateRecord, DecryptedMessage, EncryptedEnvelope, GeneratedKeyPair,
    UserIdentity, VerifiedMessage,
};
pub use crate::services::{CertificateProtocol, RecordVerification, RecordVerifier};
