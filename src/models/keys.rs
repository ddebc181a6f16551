// src/models/keys.rs
//! Key material and provider result types.
//!
//! Keys travel as armored strings. Nothing in this crate looks inside them;
//! they are handed to the [`CryptoProvider`](crate::crypto::CryptoProvider)
//! as-is.

use serde::{Deserialize, Serialize};

/// A user identity bound into a generated key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub name: String,
    pub email: String,
}

impl UserIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// RFC 2822 style `Name <email>` form used as the OpenPGP User ID.
    pub fn user_id(&self) -> String {
        match (self.name.is_empty(), self.email.is_empty()) {
            (false, false) => format!("{} <{}>", self.name, self.email),
            (true, false) => format!("<{}>", self.email),
            _ => self.name.clone(),
        }
    }
}

/// Armored output of key generation.
///
/// `Debug` is implemented by hand so the private key never ends up in logs.
#[derive(Serialize, Deserialize, Clone)]
pub struct GeneratedKeyPair {
    pub private_key_armored: String,
    pub public_key_armored: String,
    pub revocation_certificate_armored: String,
}

impl std::fmt::Debug for GeneratedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedKeyPair")
            .field("private_key_armored", &"<redacted>")
            .field("public_key_armored", &self.public_key_armored)
            .finish_non_exhaustive()
    }
}

/// Result of checking a cleartext-signed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMessage {
    /// Whether a signature by the expected key verified.
    pub verified: bool,
    /// The signed text.
    pub payload: String,
}

/// Result of decrypting an encrypted envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub plaintext: String,
    /// Hex fingerprints of the keys whose signatures verified.
    pub signatures: Vec<String>,
}
