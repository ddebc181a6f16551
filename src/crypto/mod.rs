// src/crypto/mod.rs
//! The crypto provider seam.
//!
//! The certificate protocol never touches key internals. It forwards armored
//! key strings to a [`CryptoProvider`] and composes the results. Tests and
//! alternative backends substitute their own implementation.

pub mod openpgp;

use crate::error::Result;
use crate::models::{
    DecryptedMessage, EncryptedEnvelope, GeneratedKeyPair, UserIdentity, VerifiedMessage,
};
use async_trait::async_trait;

pub use self::openpgp::OpenPgpProvider;

/// Sign, verify, encrypt, decrypt and key generation over armored OpenPGP
/// material.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Generates a key bound to every identity in `user_ids`.
    async fn generate_key_pair(&self, user_ids: &[UserIdentity]) -> Result<GeneratedKeyPair>;

    /// Produces a cleartext-signed message (`-----BEGIN PGP SIGNED MESSAGE-----`
    /// with `Hash: SHA512`) over `plaintext`.
    async fn sign(&self, plaintext: &str, private_key: &str) -> Result<String>;

    /// Checks a cleartext-signed message against `public_key`.
    ///
    /// A well-formed message signed by some other key is `Ok` with
    /// `verified == false`.
    async fn verify(&self, signed: &str, public_key: &str) -> Result<VerifiedMessage>;

    /// Encrypts `plaintext` for `recipient_public_key`, signed by
    /// `sender_private_key` when one is given.
    async fn encrypt(
        &self,
        plaintext: &str,
        recipient_public_key: &str,
        sender_private_key: Option<&str>,
    ) -> Result<EncryptedEnvelope>;

    /// Decrypts `ciphertext` with `recipient_private_key`.
    ///
    /// With `require_signature`, fails unless a signature by
    /// `sender_public_key` verifies.
    async fn decrypt(
        &self,
        ciphertext: &str,
        recipient_private_key: &str,
        sender_public_key: &str,
        require_signature: bool,
    ) -> Result<DecryptedMessage>;
}
