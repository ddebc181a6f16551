// src/models/record.rs
//! Finalized certificate record.
//!
//! The record is the plaintext result of the handshake. It carries the
//! granter's body, both detached signature blocks as ordinary string fields,
//! and both armored public keys. Because each signature was made over the
//! record as it stood at that step, the signed payloads can be recovered by
//! dropping the fields added afterwards and re-serializing.

use crate::error::{NametagError, Result};
use crate::models::body::{
    CertificateBody, GRANTEE_PUBLIC_KEY_KEY, GRANTEE_SIG_KEY, GRANTER_PUBLIC_KEY_KEY,
    GRANTER_SIG_KEY, PROTOCOL_KEYS,
};
use crate::utils::serialization::to_json_text;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields appended by `finalize`, after the grantee signed.
const FINALIZE_KEYS: [&str; 3] = [GRANTEE_SIG_KEY, GRANTEE_PUBLIC_KEY_KEY, GRANTER_PUBLIC_KEY_KEY];

/// A finalized certificate, ready for storage or validation by the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct CertificateRecord(Map<String, Value>);

impl CertificateRecord {
    /// Assembles a record from the grantee-signed JSON object.
    pub(crate) fn from_parts(
        grantee_signed: Map<String, Value>,
        grantee_sig: &str,
        grantee_public_key: &str,
        granter_public_key: &str,
    ) -> Self {
        let mut map = grantee_signed;
        map.insert(GRANTEE_SIG_KEY.to_string(), Value::from(grantee_sig));
        map.insert(GRANTEE_PUBLIC_KEY_KEY.to_string(), Value::from(grantee_public_key));
        map.insert(GRANTER_PUBLIC_KEY_KEY.to_string(), Value::from(granter_public_key));
        Self(map)
    }

    /// Wraps a record loaded back from storage.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn granter_signature(&self) -> Result<&str> {
        self.require_str(GRANTER_SIG_KEY)
    }

    pub fn grantee_signature(&self) -> Result<&str> {
        self.require_str(GRANTEE_SIG_KEY)
    }

    pub fn public_granter_key(&self) -> Result<&str> {
        self.require_str(GRANTER_PUBLIC_KEY_KEY)
    }

    pub fn public_grantee_key(&self) -> Result<&str> {
        self.require_str(GRANTEE_PUBLIC_KEY_KEY)
    }

    /// The attested body, including `img_url_hash`, without protocol fields.
    pub fn body(&self) -> CertificateBody {
        CertificateBody::from_map(without(&self.0, &PROTOCOL_KEYS))
    }

    /// JSON text the grantee signed during `approve`.
    pub fn grantee_signed_payload(&self) -> Result<String> {
        to_json_text(&without(&self.0, &FINALIZE_KEYS))
    }

    /// JSON text the granter signed during `create`.
    pub fn granter_signed_payload(&self) -> Result<String> {
        to_json_text(&without(&self.0, &PROTOCOL_KEYS))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    fn require_str(&self, key: &str) -> Result<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NametagError::malformed(format!("certificate record has no `{key}`")))
    }
}

// `retain` keeps insertion order when serde_json's `preserve_order` is on.
fn without(map: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    let mut copy = map.clone();
    copy.retain(|key, _| !keys.contains(&key.as_str()));
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::body::IMAGE_HASH_KEY;
    use crate::utils::serialization::parse_object;
    use serde_json::json;

    fn sample_record() -> CertificateRecord {
        let granter_payload = r#"{"desc":"A headline","img_url_hash":""}"#;
        let mut approved = parse_object(granter_payload).unwrap();
        approved.insert(GRANTER_SIG_KEY.into(), json!("GRANTERSIG"));
        CertificateRecord::from_parts(approved, "GRANTEESIG", "GRANTEE-PUB", "GRANTER-PUB")
    }

    #[test]
    fn test_accessors() {
        let record = sample_record();
        assert_eq!(record.granter_signature().unwrap(), "GRANTERSIG");
        assert_eq!(record.grantee_signature().unwrap(), "GRANTEESIG");
        assert_eq!(record.public_grantee_key().unwrap(), "GRANTEE-PUB");
        assert_eq!(record.public_granter_key().unwrap(), "GRANTER-PUB");
    }

    #[test]
    fn test_signed_payloads_peel_back_each_step() {
        let record = sample_record();
        assert_eq!(
            record.granter_signed_payload().unwrap(),
            r#"{"desc":"A headline","img_url_hash":""}"#
        );
        let grantee_payload = record.grantee_signed_payload().unwrap();
        assert_eq!(
            Value::Object(parse_object(&grantee_payload).unwrap()),
            json!({"desc": "A headline", "granter_sig": "GRANTERSIG", "img_url_hash": ""})
        );
    }

    #[test]
    fn test_body_drops_protocol_fields_only() {
        let body = sample_record().body();
        assert_eq!(body.get("desc"), Some(&json!("A headline")));
        assert_eq!(body.get(IMAGE_HASH_KEY), Some(&json!("")));
        assert!(body.get(GRANTER_SIG_KEY).is_none());
        assert!(body.get(GRANTER_PUBLIC_KEY_KEY).is_none());
    }

    #[test]
    fn test_missing_signature_is_malformed() {
        let record = CertificateRecord::from_map(parse_object(r#"{"desc":"x"}"#).unwrap());
        assert!(matches!(
            record.granter_signature(),
            Err(NametagError::MalformedEnvelope(_))
        ));
    }
}
