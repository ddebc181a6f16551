// src/models/envelope.rs
//! Encrypted envelope: the armored ciphertext exchanged between granter and
//! grantee.

use serde::{Deserialize, Serialize};
use std::fmt;

/// First line of every armored OpenPGP message.
pub const MESSAGE_HEADER: &str = "-----BEGIN PGP MESSAGE-----";

/// Armored OpenPGP message text, opaque to everyone but the holder of the
/// recipient's private key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct EncryptedEnvelope(String);

impl EncryptedEnvelope {
    pub fn new(armored: impl Into<String>) -> Self {
        Self(armored.into())
    }

    pub fn as_armored(&self) -> &str {
        &self.0
    }

    pub fn into_armored(self) -> String {
        self.0
    }

    /// Whether the text carries the armored message header.
    pub fn is_armored_message(&self) -> bool {
        self.0.trim_start().starts_with(MESSAGE_HEADER)
    }
}

impl From<String> for EncryptedEnvelope {
    fn from(armored: String) -> Self {
        Self(armored)
    }
}

impl AsRef<str> for EncryptedEnvelope {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncryptedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
