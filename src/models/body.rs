// src/models/body.rs
//! Certificate body data model.
//!
//! A certificate body is the free-form mapping a granter attests to. It is
//! never mutated in place: every protocol step derives a new body (or a new
//! JSON object) from the previous one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Headline of the certification.
pub const DESC_KEY: &str = "desc";
/// Longer description text.
pub const TEXT_KEY: &str = "text";
/// Optional URL of an image associated with the certification.
pub const IMAGE_URL_KEY: &str = "img_url";
/// Accepted alias for [`IMAGE_URL_KEY`].
pub const IMAGE_URL_ALIAS_KEY: &str = "image_url";
/// Optional URL of supporting reference data.
pub const DATA_URL_KEY: &str = "data_url";
/// Identifiers of prior certificates vouching for this one.
pub const VERIFIED_BY_KEY: &str = "verified_by";
/// Identifiers of certificates this one updates.
pub const UPDATES_KEY: &str = "updates";

/// Reserved: perceptual hash of the image at the image URL.
pub const IMAGE_HASH_KEY: &str = "img_url_hash";
/// Reserved: granter's detached signature block.
pub const GRANTER_SIG_KEY: &str = "granter_sig";
/// Reserved: grantee's detached signature block.
pub const GRANTEE_SIG_KEY: &str = "grantee_sig";
/// Reserved: grantee's armored public key.
pub const GRANTEE_PUBLIC_KEY_KEY: &str = "publicGranteeKey";
/// Reserved: granter's armored public key.
pub const GRANTER_PUBLIC_KEY_KEY: &str = "publicGranterKey";

/// Keys a granter may not set; the protocol writes them itself.
pub const PROTOCOL_KEYS: [&str; 4] = [
    GRANTER_SIG_KEY,
    GRANTEE_SIG_KEY,
    GRANTEE_PUBLIC_KEY_KEY,
    GRANTER_PUBLIC_KEY_KEY,
];

/// The attributes a granter attests about a grantee.
///
/// Serializes as the bare JSON object, so arbitrary extra keys survive the
/// handshake untouched.
///
/// # Example
/// ```
/// use nametag::models::CertificateBody;
///
/// let body = CertificateBody::new()
///     .with_description("A headline")
///     .with_text("A description")
///     .with_verified_by(["cert1"]);
/// assert_eq!(body.get("desc").and_then(|v| v.as_str()), Some("A headline"));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct CertificateBody(Map<String, Value>);

impl CertificateBody {
    /// Creates an empty body.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps an existing JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Returns a copy of this body with `key` set to `value`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = self.0.clone();
        map.insert(key.into(), value.into());
        Self(map)
    }

    pub fn with_description(&self, desc: impl Into<String>) -> Self {
        self.with(DESC_KEY, Value::String(desc.into()))
    }

    pub fn with_text(&self, text: impl Into<String>) -> Self {
        self.with(TEXT_KEY, Value::String(text.into()))
    }

    pub fn with_image_url(&self, url: impl Into<String>) -> Self {
        self.with(IMAGE_URL_KEY, Value::String(url.into()))
    }

    pub fn with_data_url(&self, url: impl Into<String>) -> Self {
        self.with(DATA_URL_KEY, Value::String(url.into()))
    }

    pub fn with_verified_by<I, S>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(VERIFIED_BY_KEY, string_array(ids))
    }

    pub fn with_updates<I, S>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(UPDATES_KEY, string_array(ids))
    }

    /// Returns a copy of this body carrying `hash` under `img_url_hash`.
    pub fn with_image_hash(&self, hash: impl Into<String>) -> Self {
        self.with(IMAGE_HASH_KEY, Value::String(hash.into()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The image URL to hash, if one was supplied and is non-empty.
    ///
    /// `img_url` wins over the `image_url` alias when both are present.
    pub fn image_url(&self) -> Option<&str> {
        [IMAGE_URL_KEY, IMAGE_URL_ALIAS_KEY]
            .iter()
            .filter_map(|key| self.0.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|url| !url.is_empty())
    }

    /// First protocol-reserved key present in this body, if any.
    pub fn reserved_key(&self) -> Option<&'static str> {
        PROTOCOL_KEYS.iter().copied().find(|key| self.0.contains_key(*key))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for CertificateBody {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn string_array<I, S>(ids: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::Array(ids.into_iter().map(|id| Value::String(id.into())).collect())
}
