// src/config.rs
//! Runtime settings for the default protocol collaborators.
//!
//! Settings are layered: built-in defaults first, then any extra source the
//! caller supplies, then `NAMETAG__*` environment variables (a `.env` file is
//! honoured). Nested keys use a double underscore, e.g.
//! `NAMETAG__HASHER__FETCH_TIMEOUT_SECS=10`.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `NAMETAG__HASHER__FETCH_TIMEOUT_SECS` | `30` |
//! | `NAMETAG__HASHER__HASH_WIDTH` | `16` |
//! | `NAMETAG__HASHER__HASH_HEIGHT` | `16` |
//! | `NAMETAG__OPENPGP__CIPHER_SUITE` | `cv25519` |
//! | `NAMETAG__OPENPGP__KEY_PASSPHRASE` | unset |

use crate::error::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment};
use dotenv::dotenv;
use serde::Deserialize;

/// Top-level settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub hasher: HasherSettings,
    #[serde(default)]
    pub openpgp: OpenPgpSettings,
}

/// Settings for [`HttpImageHasher`](crate::hashing::HttpImageHasher).
#[derive(Debug, Clone, Deserialize)]
pub struct HasherSettings {
    /// Whole-request timeout for the image download.
    pub fetch_timeout_secs: u64,
    /// Blockhash grid width. Width times height is the hash size in bits.
    pub hash_width: u32,
    /// Blockhash grid height.
    pub hash_height: u32,
}

impl Default for HasherSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            hash_width: 16,
            hash_height: 16,
        }
    }
}

/// Settings for [`OpenPgpProvider`](crate::crypto::OpenPgpProvider).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OpenPgpSettings {
    /// Algorithm family for generated keys.
    #[serde(default)]
    pub cipher_suite: KeyCipherSuite,
    /// Passphrase used to protect generated keys and to unlock protected
    /// secret keys passed into sign/decrypt.
    #[serde(default)]
    pub key_passphrase: Option<String>,
}

/// Algorithm family for generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyCipherSuite {
    #[default]
    Cv25519,
    Rsa2k,
    Rsa3k,
    Rsa4k,
    P256,
    P384,
    P521,
}

impl Settings {
    /// Loads settings from defaults, `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_builder(Self::defaults()?)
    }

    /// Loads settings from defaults, then `builder`'s extra sources, then the
    /// process environment.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder
            .add_source(
                Environment::with_prefix("NAMETAG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// A builder pre-seeded with the default values.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let hasher = HasherSettings::default();
        Ok(Config::builder()
            .set_default("hasher.fetch_timeout_secs", hasher.fetch_timeout_secs as i64)?
            .set_default("hasher.hash_width", hasher.hash_width as i64)?
            .set_default("hasher.hash_height", hasher.hash_height as i64)?
            .set_default("openpgp.cipher_suite", "cv25519")?)
    }
}
