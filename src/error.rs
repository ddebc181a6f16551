// src/error.rs
//! Error types for the certificate envelope protocol.
//!
//! Every protocol phase is fail-fast: the first error aborts the phase and is
//! returned to the caller unchanged. Nothing here is retried.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NametagError>;

/// Top-level error type for the Nametag certificate protocol.
#[derive(Error, Debug)]
pub enum NametagError {
    /// A signed envelope or certificate record did not have the expected shape:
    /// missing delimiters, extra delimiters, unparseable JSON, or a missing
    /// protocol field.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The OpenPGP provider rejected an operation (bad key, failed decryption,
    /// missing or invalid signature).
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// The perceptual hasher could not fetch or decode the image.
    #[error("image hash failure: {0}")]
    HashFailure(String),

    /// A certificate body tried to set a key the protocol writes itself.
    #[error("certificate body uses reserved key `{0}`")]
    ReservedKey(String),

    /// Settings could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl NametagError {
    /// Wraps any displayable provider error as a [`NametagError::CryptoFailure`].
    pub(crate) fn crypto(err: impl std::fmt::Display) -> Self {
        NametagError::CryptoFailure(err.to_string())
    }

    pub(crate) fn hash(err: impl std::fmt::Display) -> Self {
        NametagError::HashFailure(err.to_string())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        NametagError::MalformedEnvelope(msg.into())
    }
}
