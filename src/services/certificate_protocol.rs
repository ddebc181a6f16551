// src/services/certificate_protocol.rs
//! Certificate Protocol Service
//!
//! Drives the three-phase certificate handshake between a granter and a
//! grantee:
//!
//! 1. **create** (granter): hash the image, sign the body, encrypt for the
//!    grantee.
//! 2. **approve** (grantee): decrypt, move the granter's signature into the
//!    body as `granter_sig`, sign that, encrypt for the granter.
//! 3. **finalize** (granter): decrypt, move the grantee's signature into the
//!    body as `grantee_sig` and attach both public keys.
//!
//! Each phase strips the previous signature out of its OpenPGP envelope and
//! re-embeds it as ordinary data, so the next signer signs over it. The
//! finalized record therefore holds a verifiable chain: granter attests,
//! grantee acknowledges.
//!
//! The service holds no state between calls. Phases are fail-fast and never
//! return partial results; on error, restart the phase from its inputs.

use crate::config::Settings;
use crate::crypto::{CryptoProvider, OpenPgpProvider};
use crate::envelope::codec;
use crate::error::{NametagError, Result};
use crate::hashing::{HttpImageHasher, PerceptualHasher};
use crate::models::body::GRANTER_SIG_KEY;
use crate::models::{
    CertificateBody, CertificateRecord, DecryptedMessage, EncryptedEnvelope, GeneratedKeyPair,
    UserIdentity, VerifiedMessage,
};
use crate::services::verifier::{RecordVerification, RecordVerifier};
use crate::utils::serialization::to_json_text;
use log::{debug, info};

/// Service running the create → approve → finalize handshake.
///
/// Generic over its two collaborators so tests can substitute fakes:
/// - `C`: the OpenPGP crypto provider
/// - `H`: the perceptual image hasher
#[derive(Clone, Debug)]
pub struct CertificateProtocol<C, H> {
    crypto: C,
    hasher: H,
}

impl CertificateProtocol<OpenPgpProvider, HttpImageHasher> {
    /// Wires the Sequoia provider and the HTTP image hasher from settings.
    ///
    /// # Errors
    /// `HashFailure` if the HTTP client cannot be built.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            OpenPgpProvider::from_settings(&settings.openpgp),
            HttpImageHasher::from_settings(&settings.hasher)?,
        ))
    }
}

impl<C: CryptoProvider, H: PerceptualHasher> CertificateProtocol<C, H> {
    pub fn new(crypto: C, hasher: H) -> Self {
        Self { crypto, hasher }
    }

    pub fn crypto(&self) -> &C {
        &self.crypto
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Creates a certificate: `None -> Created`.
    ///
    /// # Arguments
    /// * `body` - Attributes the granter attests; left untouched
    /// * `granter_private_key` - Armored secret key that signs the body
    /// * `grantee_public_key` - Armored public key the envelope is encrypted for
    ///
    /// # Process Flow
    /// 1. Hash the image at `img_url` (empty hash when there is none)
    /// 2. Sign the body plus `img_url_hash` with the granter's key
    /// 3. Encrypt the signed text for the grantee, signed by the granter
    ///
    /// # Errors
    /// - `ReservedKey` if the body sets a protocol field
    /// - `MalformedEnvelope` if the body text contains the signature marker,
    ///   which no later phase could split off again
    /// - `HashFailure` if the image cannot be fetched or decoded
    /// - `CryptoFailure` for any provider failure
    pub async fn create(
        &self,
        body: &CertificateBody,
        granter_private_key: &str,
        grantee_public_key: &str,
    ) -> Result<EncryptedEnvelope> {
        if let Some(key) = body.reserved_key() {
            return Err(NametagError::ReservedKey(key.to_string()));
        }
        if !codec::is_splittable(&to_json_text(body)?) {
            return Err(NametagError::malformed(format!(
                "body text contains `{}`",
                codec::SIGNATURE_MARKER
            )));
        }

        let image_hash = match body.image_url() {
            Some(url) => {
                debug!("hashing image at {url}");
                self.hasher.hash(url).await?
            }
            None => String::new(),
        };
        let hashed = body.with_image_hash(image_hash);

        let payload = to_json_text(&hashed)?;
        let signed = self.crypto.sign(&payload, granter_private_key).await?;
        let envelope = self
            .crypto
            .encrypt(&signed, grantee_public_key, Some(granter_private_key))
            .await?;

        info!("certificate created ({} body fields)", hashed.as_map().len());
        Ok(envelope)
    }

    /// Approves a created certificate as the grantee: `Created -> Approved`.
    ///
    /// # Process Flow
    /// 1. Decrypt with the grantee's key; the granter's signature must verify
    /// 2. Split the signed body from the granter's signature block
    /// 3. Store that block under `granter_sig`
    /// 4. Sign the result with the grantee's key
    /// 5. Encrypt for the granter, signed by the grantee
    ///
    /// # Errors
    /// - `CryptoFailure` if decryption or the granter signature check fails
    /// - `MalformedEnvelope` if the decrypted text is not a signed JSON body
    pub async fn approve(
        &self,
        created: &EncryptedEnvelope,
        grantee_private_key: &str,
        granter_public_key: &str,
    ) -> Result<EncryptedEnvelope> {
        let decrypted = self
            .crypto
            .decrypt(created.as_armored(), grantee_private_key, granter_public_key, true)
            .await?;
        let parts = codec::split(&decrypted.plaintext)?;
        debug!("granter signature extracted ({} chars)", parts.signature.len());

        let approved = codec::merge(&parts.body, GRANTER_SIG_KEY, &parts.signature);
        let payload = to_json_text(&approved)?;
        let signed = self.crypto.sign(&payload, grantee_private_key).await?;
        let envelope = self
            .crypto
            .encrypt(&signed, granter_public_key, Some(grantee_private_key))
            .await?;

        info!("certificate approved by grantee");
        Ok(envelope)
    }

    /// Finalizes an approved certificate as the granter:
    /// `Approved -> Finalized`.
    ///
    /// The returned record is plaintext. Storing or publishing it is up to
    /// the caller.
    ///
    /// # Errors
    /// - `CryptoFailure` if decryption or the grantee signature check fails
    /// - `MalformedEnvelope` if the decrypted text is not a signed JSON body
    pub async fn finalize(
        &self,
        approved: &EncryptedEnvelope,
        granter_private_key: &str,
        grantee_public_key: &str,
        granter_public_key: &str,
    ) -> Result<CertificateRecord> {
        let decrypted = self
            .crypto
            .decrypt(approved.as_armored(), granter_private_key, grantee_public_key, true)
            .await?;
        let parts = codec::split(&decrypted.plaintext)?;

        info!("certificate finalized");
        Ok(CertificateRecord::from_parts(
            parts.body,
            &parts.signature,
            grantee_public_key,
            granter_public_key,
        ))
    }

    /// Re-verifies both signatures embedded in a finalized record against the
    /// public keys the record carries.
    pub async fn validate(&self, record: &CertificateRecord) -> Result<RecordVerification> {
        RecordVerifier::new(&self.crypto).verify_record(record).await
    }

    /// Decrypts `message` with `decryption_key`, requiring a valid signature
    /// by `signing_key`.
    pub async fn decrypt_and_verify(
        &self,
        message: &EncryptedEnvelope,
        signing_key: &str,
        decryption_key: &str,
    ) -> Result<DecryptedMessage> {
        self.crypto
            .decrypt(message.as_armored(), decryption_key, signing_key, true)
            .await
    }

    pub async fn generate_keys(&self, user_ids: &[UserIdentity]) -> Result<GeneratedKeyPair> {
        self.crypto.generate_key_pair(user_ids).await
    }

    pub async fn sign(&self, plaintext: &str, private_key: &str) -> Result<String> {
        self.crypto.sign(plaintext, private_key).await
    }

    pub async fn verify(&self, signed: &str, public_key: &str) -> Result<VerifiedMessage> {
        self.crypto.verify(signed, public_key).await
    }

    pub async fn encrypt(
        &self,
        plaintext: &str,
        recipient_public_key: &str,
        sender_private_key: Option<&str>,
    ) -> Result<EncryptedEnvelope> {
        self.crypto
            .encrypt(plaintext, recipient_public_key, sender_private_key)
            .await
    }

    pub async fn decrypt(
        &self,
        ciphertext: &EncryptedEnvelope,
        recipient_private_key: &str,
        sender_public_key: &str,
        require_signature: bool,
    ) -> Result<DecryptedMessage> {
        self.crypto
            .decrypt(
                ciphertext.as_armored(),
                recipient_private_key,
                sender_public_key,
                require_signature,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::body::{
        GRANTEE_PUBLIC_KEY_KEY, GRANTEE_SIG_KEY, GRANTER_PUBLIC_KEY_KEY, IMAGE_HASH_KEY,
    };
    use crate::utils::serialization::parse_object;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const IMAGE_HASH: &str = "fc3ff00fe007c007c011cfd11fe01ff009700df08ff187f180e1c1e3e0c7f81f";

    /// Returns a fixed hash and counts calls.
    #[derive(Default)]
    struct FixedHasher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PerceptualHasher for FixedHasher {
        async fn hash(&self, _url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(IMAGE_HASH.to_string())
        }
    }

    struct FailingHasher;

    #[async_trait]
    impl PerceptualHasher for FailingHasher {
        async fn hash(&self, url: &str) -> Result<String> {
            Err(NametagError::HashFailure(format!("cannot fetch {url}")))
        }
    }

    struct Parties {
        granter: GeneratedKeyPair,
        grantee: GeneratedKeyPair,
        stranger: GeneratedKeyPair,
    }

    fn protocol() -> CertificateProtocol<OpenPgpProvider, FixedHasher> {
        let _ = env_logger::builder().is_test(true).try_init();
        CertificateProtocol::new(OpenPgpProvider::new(), FixedHasher::default())
    }

    async fn parties<H: PerceptualHasher>(protocol: &CertificateProtocol<OpenPgpProvider, H>) -> Parties {
        let granter = protocol
            .generate_keys(&[UserIdentity::new("Nametag", "test@ntag.id")])
            .await
            .unwrap();
        let grantee = protocol
            .generate_keys(&[UserIdentity::new("Jon Smith", "jon@example.com")])
            .await
            .unwrap();
        let stranger = protocol
            .generate_keys(&[UserIdentity::new("Mallory", "mallory@example.com")])
            .await
            .unwrap();
        Parties {
            granter,
            grantee,
            stranger,
        }
    }

    fn scenario_body() -> CertificateBody {
        CertificateBody::new()
            .with_description("A headline")
            .with_text("A description")
            .with_image_url("https://example.org/x.png")
            .with_verified_by(["cert1"])
    }

    async fn run_handshake(
        protocol: &CertificateProtocol<OpenPgpProvider, FixedHasher>,
        parties: &Parties,
        body: &CertificateBody,
    ) -> CertificateRecord {
        let created = protocol
            .create(body, &parties.granter.private_key_armored, &parties.grantee.public_key_armored)
            .await
            .unwrap();
        let approved = protocol
            .approve(&created, &parties.grantee.private_key_armored, &parties.granter.public_key_armored)
            .await
            .unwrap();
        protocol
            .finalize(
                &approved,
                &parties.granter.private_key_armored,
                &parties.grantee.public_key_armored,
                &parties.granter.public_key_armored,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_scenario_is_readable_by_grantee() {
        let protocol = protocol();
        let parties = parties(&protocol).await;

        let created = protocol
            .create(&scenario_body(), &parties.granter.private_key_armored, &parties.grantee.public_key_armored)
            .await
            .unwrap();
        assert!(created.as_armored().starts_with("-----BEGIN PGP MESSAGE-----"));

        let decrypted = protocol
            .decrypt_and_verify(&created, &parties.granter.public_key_armored, &parties.grantee.private_key_armored)
            .await
            .unwrap();
        let verified = protocol
            .verify(&decrypted.plaintext, &parties.granter.public_key_armored)
            .await
            .unwrap();
        assert!(verified.verified);

        let body = parse_object(verified.payload.trim_end()).unwrap();
        assert_eq!(body.get("desc"), Some(&json!("A headline")));
        assert_eq!(body.get(IMAGE_HASH_KEY), Some(&json!(IMAGE_HASH)));
        assert_eq!(protocol.hasher().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_handshake_preserves_chain_of_custody() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        let body = scenario_body();

        let record = run_handshake(&protocol, &parties, &body).await;

        for (key, value) in body.as_map() {
            assert_eq!(record.get(key), Some(value), "field {key} lost");
        }
        assert_eq!(record.get(IMAGE_HASH_KEY), Some(&json!(IMAGE_HASH)));
        assert!(!record.granter_signature().unwrap().is_empty());
        assert!(!record.grantee_signature().unwrap().is_empty());
        assert_eq!(
            record.get(GRANTEE_PUBLIC_KEY_KEY),
            Some(&Value::from(parties.grantee.public_key_armored.as_str()))
        );
        assert_eq!(
            record.get(GRANTER_PUBLIC_KEY_KEY),
            Some(&Value::from(parties.granter.public_key_armored.as_str()))
        );

        let verification = protocol.validate(&record).await.unwrap();
        assert!(verification.granter_signature_valid);
        assert!(verification.grantee_signature_valid);
        assert!(verification.is_valid());
    }

    #[tokio::test]
    async fn test_missing_image_merges_empty_hash() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        let body = CertificateBody::new()
            .with_text("Description of the certification.")
            .with_verified_by(["cert1", "cert2"]);

        let record = run_handshake(&protocol, &parties, &body).await;

        assert_eq!(record.get(IMAGE_HASH_KEY), Some(&json!("")));
        assert_eq!(protocol.hasher().calls.load(Ordering::SeqCst), 0);
        assert!(protocol.validate(&record).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_hash_failure_propagates() {
        let protocol = CertificateProtocol::new(OpenPgpProvider::new(), FailingHasher);
        let parties = parties(&protocol).await;

        let result = protocol
            .create(&scenario_body(), &parties.granter.private_key_armored, &parties.grantee.public_key_armored)
            .await;
        assert!(matches!(result, Err(NametagError::HashFailure(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_reserved_keys() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        let body = scenario_body().with(GRANTEE_SIG_KEY, "forged");

        let result = protocol
            .create(&body, &parties.granter.private_key_armored, &parties.grantee.public_key_armored)
            .await;
        assert!(matches!(result, Err(NametagError::ReservedKey(key)) if key == GRANTEE_SIG_KEY));
        assert_eq!(protocol.hasher().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_signature_marker_in_body() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        let body = scenario_body().with_description("see -----BEGIN PGP SIGNATURE----- here");

        let result = protocol
            .create(&body, &parties.granter.private_key_armored, &parties.grantee.public_key_armored)
            .await;
        assert!(matches!(result, Err(NametagError::MalformedEnvelope(_))));
        assert_eq!(protocol.hasher().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trailer_text_in_body_survives_handshake() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        let body = scenario_body().with_description("see -----END PGP SIGNATURE----- here");

        let record = run_handshake(&protocol, &parties, &body).await;

        assert_eq!(record.get("desc"), Some(&json!("see -----END PGP SIGNATURE----- here")));
        assert!(!record.grantee_signature().unwrap().contains("-----"));
        assert!(protocol.validate(&record).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_handshake_preserves_varied_bodies() {
        let protocol = protocol();
        let parties = parties(&protocol).await;

        let cases: Vec<(&str, Value)> = vec![
            ("float", json!({"score": 1.0715660391465826e-75, "ratio": 0.1, "big": 1.7976931348623157e308})),
            ("integers", json!({"count": 0, "neg": -42, "max": u64::MAX, "min": i64::MIN})),
            ("nested", json!({"meta": {"level": {"deep": [1, {"x": "y"}, []]}, "b": null, "a": true}})),
            ("non_ascii", json!({"desc": "Zertifikat für Jürgen", "text": "認証 ✓ 🎓", "sep": "a\u{2028}b"})),
            ("escapes", json!({"text": "line one\nline two\t\"quoted\" back\\slash", "empty": ""})),
            ("header_text", json!({"desc": "-----BEGIN PGP SIGNED MESSAGE-----Hash: SHA512"})),
            ("trailer_text", json!({"desc": "ends with -----END PGP SIGNATURE-----"})),
            ("dashes", json!({"desc": "- leading dash", "text": "--"})),
        ];

        for (name, value) in cases {
            let body = match value {
                Value::Object(map) => CertificateBody::from_map(map),
                _ => unreachable!(),
            };
            let record = run_handshake(&protocol, &parties, &body).await;

            for (key, value) in body.as_map() {
                assert_eq!(record.get(key), Some(value), "{name}: field {key} changed");
            }
            let verification = protocol.validate(&record).await.unwrap();
            assert!(verification.is_valid(), "{name}: {verification:?}");
        }
    }

    #[tokio::test]
    async fn test_approve_rejects_wrong_granter_key() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        let created = protocol
            .create(&scenario_body(), &parties.granter.private_key_armored, &parties.grantee.public_key_armored)
            .await
            .unwrap();

        let result = protocol
            .approve(&created, &parties.grantee.private_key_armored, &parties.stranger.public_key_armored)
            .await;
        assert!(matches!(result, Err(NametagError::CryptoFailure(_))));
    }

    #[tokio::test]
    async fn test_approve_rejects_envelope_for_someone_else() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        let created = protocol
            .create(&scenario_body(), &parties.granter.private_key_armored, &parties.grantee.public_key_armored)
            .await
            .unwrap();

        let result = protocol
            .approve(&created, &parties.stranger.private_key_armored, &parties.granter.public_key_armored)
            .await;
        assert!(matches!(result, Err(NametagError::CryptoFailure(_))));
    }

    #[tokio::test]
    async fn test_finalize_rejects_wrong_grantee_key() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        let created = protocol
            .create(&scenario_body(), &parties.granter.private_key_armored, &parties.grantee.public_key_armored)
            .await
            .unwrap();
        let approved = protocol
            .approve(&created, &parties.grantee.private_key_armored, &parties.granter.public_key_armored)
            .await
            .unwrap();

        let result = protocol
            .finalize(
                &approved,
                &parties.granter.private_key_armored,
                &parties.stranger.public_key_armored,
                &parties.granter.public_key_armored,
            )
            .await;
        assert!(matches!(result, Err(NametagError::CryptoFailure(_))));
    }

    #[tokio::test]
    async fn test_finalize_rejects_unsigned_plain_json() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        // Properly encrypted and signed, but the payload is bare JSON rather
        // than a cleartext-signed envelope.
        let envelope = protocol
            .encrypt(
                r#"{"desc":"A headline"}"#,
                &parties.granter.public_key_armored,
                Some(&parties.grantee.private_key_armored),
            )
            .await
            .unwrap();

        let result = protocol
            .finalize(
                &envelope,
                &parties.granter.private_key_armored,
                &parties.grantee.public_key_armored,
                &parties.granter.public_key_armored,
            )
            .await;
        assert!(matches!(result, Err(NametagError::MalformedEnvelope(_))));
    }

    #[tokio::test]
    async fn test_validate_detects_tampering() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        let record = run_handshake(&protocol, &parties, &scenario_body()).await;

        let mut edited = record.clone().into_map();
        edited.insert("desc".into(), json!("A different headline"));
        let verification = protocol
            .validate(&CertificateRecord::from_map(edited))
            .await
            .unwrap();
        assert!(!verification.granter_signature_valid);
        assert!(!verification.grantee_signature_valid);

        let mut rekeyed = record.into_map();
        rekeyed.insert(
            GRANTER_PUBLIC_KEY_KEY.into(),
            Value::from(parties.stranger.public_key_armored.as_str()),
        );
        let verification = protocol
            .validate(&CertificateRecord::from_map(rekeyed))
            .await
            .unwrap();
        assert!(!verification.granter_signature_valid);
        assert!(verification.grantee_signature_valid);
        assert!(!verification.is_valid());
    }

    #[tokio::test]
    async fn test_validate_requires_protocol_fields() {
        let protocol = protocol();
        let record = CertificateRecord::from_map(parse_object(r#"{"desc":"A headline"}"#).unwrap());
        let result = protocol.validate(&record).await;
        assert!(matches!(result, Err(NametagError::MalformedEnvelope(_))));
    }

    #[tokio::test]
    async fn test_independent_certificates_run_concurrently() {
        let protocol = protocol();
        let parties = parties(&protocol).await;
        let first = scenario_body();
        let second = CertificateBody::new().with_description("Another headline");

        let (a, b) = tokio::join!(
            run_handshake(&protocol, &parties, &first),
            run_handshake(&protocol, &parties, &second)
        );

        assert_eq!(a.get("desc"), Some(&json!("A headline")));
        assert_eq!(b.get("desc"), Some(&json!("Another headline")));
        assert!(protocol.validate(&a).await.unwrap().is_valid());
        assert!(protocol.validate(&b).await.unwrap().is_valid());
    }
}
