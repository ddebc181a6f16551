// src/services/verifier.rs
//! Certificate record verification.
//!
//! A finalized record carries both detached signatures as plain JSON fields.
//! This module recovers what each party signed, re-attaches the signature and
//! asks the crypto provider to verify it against the public key stored in the
//! record.

use crate::crypto::CryptoProvider;
use crate::envelope::codec;
use crate::error::Result;
use crate::models::CertificateRecord;
use log::{debug, warn};

/// Outcome of checking both signatures embedded in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordVerification {
    /// The granter's signature verifies over the body it created.
    pub granter_signature_valid: bool,
    /// The grantee's signature verifies over the body plus `granter_sig`.
    pub grantee_signature_valid: bool,
}

impl RecordVerification {
    /// Both links of the chain hold.
    pub fn is_valid(&self) -> bool {
        self.granter_signature_valid && self.grantee_signature_valid
    }
}

/// Re-verifies the signature chain of finalized certificate records.
pub struct RecordVerifier<'a, C> {
    crypto: &'a C,
}

impl<'a, C: CryptoProvider> RecordVerifier<'a, C> {
    pub fn new(crypto: &'a C) -> Self {
        Self { crypto }
    }

    /// Verifies both embedded signatures of `record`.
    ///
    /// # Returns
    /// - `Ok(RecordVerification)` with one flag per signature
    /// - `Err(MalformedEnvelope)` if a protocol field is missing or a
    ///   signature body is not base64
    /// - `Err(CryptoFailure)` if a stored public key cannot be read
    pub async fn verify_record(&self, record: &CertificateRecord) -> Result<RecordVerification> {
        let granter_signature_valid = self
            .verify_signature(
                &record.granter_signed_payload()?,
                record.granter_signature()?,
                record.public_granter_key()?,
            )
            .await?;
        let grantee_signature_valid = self
            .verify_signature(
                &record.grantee_signed_payload()?,
                record.grantee_signature()?,
                record.public_grantee_key()?,
            )
            .await?;

        let verification = RecordVerification {
            granter_signature_valid,
            grantee_signature_valid,
        };
        if !verification.is_valid() {
            warn!("certificate record failed verification: {verification:?}");
        }
        Ok(verification)
    }

    async fn verify_signature(&self, payload: &str, signature: &str, public_key: &str) -> Result<bool> {
        let signed = codec::rebuild(payload, signature)?;
        let verified = self.crypto.verify(&signed, public_key).await?;
        let same_payload = verified.payload.trim_end_matches(['\r', '\n']) == payload;
        debug!(
            "signature check: verified={} payload_match={same_payload}",
            verified.verified
        );
        Ok(verified.verified && same_payload)
    }
}
