// src/envelope/codec.rs
//! Signed-cleartext envelope codec.
//!
//! A signed envelope is the provider's cleartext-signed message:
//!
//! ```text
//! -----BEGIN PGP SIGNED MESSAGE-----
//! Hash: SHA512
//!
//! {"desc":"A headline",...}
//! -----BEGIN PGP SIGNATURE-----
//!
//! wnUEARYKACcFgm...
//! =Xb3L
//! -----END PGP SIGNATURE-----
//! ```
//!
//! [`split`] flattens it and cuts it on the three fixed markers into the JSON
//! payload and the signature body. The signature body is then carried as
//! ordinary JSON data ([`merge`]) so the next party signs over it. [`rebuild`]
//! goes the other way for re-verifying a recorded signature.
//!
//! The markers are matched literally. Any other framing is rejected.

use crate::error::{NametagError, Result};
use crate::utils::serialization::parse_object;
use serde_json::{Map, Value};

/// Header of a cleartext-signed message once line breaks are removed.
pub const SIGNED_MESSAGE_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----Hash: SHA512";
/// Separates the signed text from the signature block.
pub const SIGNATURE_MARKER: &str = "-----BEGIN PGP SIGNATURE-----";
/// Closes the signature block.
pub const SIGNATURE_TRAILER: &str = "-----END PGP SIGNATURE-----";

const ARMOR_LINE_WIDTH: usize = 64;

/// A signed envelope cut into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedParts {
    /// The signed JSON text exactly as it appeared in the envelope.
    pub payload: String,
    /// `payload` parsed as a JSON object.
    pub body: Map<String, Value>,
    /// Signature body with line breaks removed (base64, plus the armor
    /// checksum glued on the end when the provider emitted one).
    pub signature: String,
}

/// Splits a cleartext-signed message into JSON payload and signature body.
///
/// # Errors
/// `MalformedEnvelope` when the text does not start with the header or end
/// with the trailer, when the
/// signature marker does not cut the text into exactly two non-empty parts,
/// or when the first part is not a JSON object.
pub fn split(signed_text: &str) -> Result<SignedParts> {
    let flat: String = signed_text
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect();

    let stripped = flat
        .strip_prefix(SIGNED_MESSAGE_HEADER)
        .ok_or_else(|| NametagError::malformed("missing cleartext signature header"))?
        .trim_end()
        .strip_suffix(SIGNATURE_TRAILER)
        .ok_or_else(|| NametagError::malformed("missing signature trailer"))?;

    let parts: Vec<&str> = stripped.split(SIGNATURE_MARKER).collect();
    let (payload, signature) = match parts.as_slice() {
        [payload, signature] if !payload.is_empty() && !signature.is_empty() => {
            (*payload, *signature)
        }
        _ => {
            return Err(NametagError::malformed(format!(
                "expected payload and signature around one signature marker, found {} part(s)",
                parts.len()
            )))
        }
    };

    let body = parse_object(payload)?;
    Ok(SignedParts {
        payload: payload.to_string(),
        body,
        signature: signature.to_string(),
    })
}

/// Returns a copy of `object` with `key` set to the raw `signature` text.
pub fn merge(object: &Map<String, Value>, key: &str, signature: &str) -> Map<String, Value> {
    let mut merged = object.clone();
    merged.insert(key.to_string(), Value::String(signature.to_string()));
    merged
}

/// Whether `payload` can be signed and later cut apart again by [`split`].
///
/// The header and trailer are matched only at the ends of the envelope, so
/// only the signature marker is ambiguous inside the payload.
pub fn is_splittable(payload: &str) -> bool {
    !payload.contains(SIGNATURE_MARKER)
}

/// Reassembles a cleartext-signed message from a payload and a signature
/// body produced by [`split`].
///
/// The payload must be a single line; the signature body must be base64,
/// optionally followed by a five character `=XXXX` armor checksum.
pub fn rebuild(payload: &str, signature: &str) -> Result<String> {
    if payload.contains(['\r', '\n']) {
        return Err(NametagError::malformed("signed payload spans several lines"));
    }
    let (data, checksum) = split_checksum(signature.trim());
    if data.is_empty() {
        return Err(NametagError::malformed("empty signature body"));
    }
    base64::decode(data)
        .map_err(|e| NametagError::malformed(format!("signature body is not base64: {e}")))?;

    let mut out = String::with_capacity(payload.len() + signature.len() + 160);
    out.push_str("-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA512\n\n");
    out.push_str(payload);
    out.push('\n');
    out.push_str(SIGNATURE_MARKER);
    out.push_str("\n\n");
    // base64 is ASCII, so byte chunks are char boundaries.
    for line in data.as_bytes().chunks(ARMOR_LINE_WIDTH) {
        let line = std::str::from_utf8(line)
            .map_err(|e| NametagError::malformed(format!("signature body is not ASCII: {e}")))?;
        out.push_str(line);
        out.push('\n');
    }
    if let Some(checksum) = checksum {
        out.push_str(checksum);
        out.push('\n');
    }
    out.push_str(SIGNATURE_TRAILER);
    out.push('\n');
    Ok(out)
}

// Padded base64 has a length divisible by four, so a trailing `=XXXX`
// checksum leaves a remainder of one.
fn split_checksum(signature: &str) -> (&str, Option<&str>) {
    let len = signature.len();
    if len > 5 && len % 4 == 1 && signature.as_bytes()[len - 5] == b'=' {
        let (data, checksum) = signature.split_at(len - 5);
        (data, Some(checksum))
    } else {
        (signature, None)
    }
}
