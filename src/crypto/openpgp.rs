// src/crypto/openpgp.rs
//! OpenPGP crypto provider backed by Sequoia.
//!
//! Keys arrive as armored strings on every call and are parsed per call; the
//! provider itself holds only configuration. All Sequoia work is CPU bound
//! and runs on tokio's blocking pool.
//!
//! Conventions:
//! - signatures are made with SHA512, which fixes the `Hash: SHA512` header
//!   the envelope codec expects
//! - encrypted output is always ASCII armored (`-----BEGIN PGP MESSAGE-----`)
//! - passphrase-protected secret keys are unlocked with the configured
//!   passphrase

use crate::config::{KeyCipherSuite, OpenPgpSettings};
use crate::crypto::CryptoProvider;
use crate::error::{NametagError, Result};
use crate::models::{
    DecryptedMessage, EncryptedEnvelope, GeneratedKeyPair, UserIdentity, VerifiedMessage,
};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use log::debug;
use sequoia_openpgp as openpgp;
use openpgp::armor;
use openpgp::cert::prelude::*;
use openpgp::crypto::{KeyPair, Password, SessionKey};
use openpgp::packet::key::{SecretParts, UnspecifiedRole};
use openpgp::packet::{Key, UserID, PKESK, SKESK};
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageLayer, MessageStructure, VerificationHelper,
    VerifierBuilder,
};
use openpgp::parse::Parse;
use openpgp::policy::{Policy, StandardPolicy};
use openpgp::serialize::stream::{Armorer, Encryptor2, LiteralWriter, Message, Signer};
use openpgp::serialize::{Serialize, SerializeInto};
use openpgp::types::{HashAlgorithm, SymmetricAlgorithm};
use openpgp::{Cert, Fingerprint, KeyHandle, Packet};
use std::fmt;
use std::io::{Read, Write};
use tokio::task;

/// [`CryptoProvider`] implementation on `sequoia-openpgp`.
#[derive(Clone, Default)]
pub struct OpenPgpProvider {
    cipher_suite: KeyCipherSuite,
    passphrase: Option<Password>,
}

impl OpenPgpProvider {
    /// Cv25519 keys, no passphrase.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &OpenPgpSettings) -> Self {
        Self {
            cipher_suite: settings.cipher_suite,
            passphrase: settings.key_passphrase.as_deref().map(Password::from),
        }
    }

    pub fn with_cipher_suite(mut self, cipher_suite: KeyCipherSuite) -> Self {
        self.cipher_suite = cipher_suite;
        self
    }

    /// Protects generated keys with `passphrase` and uses it to unlock
    /// protected secret keys.
    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(Password::from(passphrase));
        self
    }
}

impl fmt::Debug for OpenPgpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenPgpProvider")
            .field("cipher_suite", &self.cipher_suite)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl CryptoProvider for OpenPgpProvider {
    async fn generate_key_pair(&self, user_ids: &[UserIdentity]) -> Result<GeneratedKeyPair> {
        let user_ids: Vec<String> = user_ids.iter().map(UserIdentity::user_id).collect();
        let cipher_suite = to_cipher_suite(self.cipher_suite);
        let password = self.passphrase.clone();
        blocking("generate key", move || generate(user_ids, cipher_suite, password)).await
    }

    async fn sign(&self, plaintext: &str, private_key: &str) -> Result<String> {
        let plaintext = plaintext.to_owned();
        let private_key = private_key.to_owned();
        let password = self.passphrase.clone();
        blocking("sign", move || {
            let policy = StandardPolicy::new();
            let tsk = read_secret_cert(&private_key, "signing key")?;
            sign_cleartext(&plaintext, &tsk, &policy, password.as_ref())
        })
        .await
    }

    async fn verify(&self, signed: &str, public_key: &str) -> Result<VerifiedMessage> {
        let signed = signed.to_owned();
        let public_key = public_key.to_owned();
        blocking("verify", move || {
            let policy = StandardPolicy::new();
            let signer = read_cert(&public_key, "verification key")?;
            verify_cleartext(&signed, &signer, &policy)
        })
        .await
    }

    async fn encrypt(
        &self,
        plaintext: &str,
        recipient_public_key: &str,
        sender_private_key: Option<&str>,
    ) -> Result<EncryptedEnvelope> {
        let plaintext = plaintext.to_owned();
        let recipient_public_key = recipient_public_key.to_owned();
        let sender_private_key = sender_private_key.map(str::to_owned);
        let password = self.passphrase.clone();
        let armored = blocking("encrypt", move || {
            let policy = StandardPolicy::new();
            let recipient = read_cert(&recipient_public_key, "recipient key")?;
            let signer = match sender_private_key {
                Some(armored) => {
                    let tsk = read_secret_cert(&armored, "sender key")?;
                    Some(signing_keypair(&tsk, &policy, password.as_ref())?)
                }
                None => None,
            };
            encrypt_message(&plaintext, &recipient, signer, &policy)
        })
        .await?;
        Ok(EncryptedEnvelope::new(armored))
    }

    async fn decrypt(
        &self,
        ciphertext: &str,
        recipient_private_key: &str,
        sender_public_key: &str,
        require_signature: bool,
    ) -> Result<DecryptedMessage> {
        let ciphertext = ciphertext.to_owned();
        let recipient_private_key = recipient_private_key.to_owned();
        let sender_public_key = sender_public_key.to_owned();
        let password = self.passphrase.clone();
        blocking("decrypt", move || {
            let policy = StandardPolicy::new();
            let secret = read_secret_cert(&recipient_private_key, "decryption key")?;
            let sender = read_cert(&sender_public_key, "sender key")?;
            let helper = DecryptHelper {
                policy: &policy,
                secret: &secret,
                sender: &sender,
                password: password.as_ref(),
                require_signature,
                signers: Vec::new(),
            };
            decrypt_message(&ciphertext, helper, &policy)
        })
        .await
    }
}

/// Runs `op` on the blocking pool and maps every failure to `CryptoFailure`.
async fn blocking<T, F>(what: &'static str, op: F) -> Result<T>
where
    F: FnOnce() -> openpgp::Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(op)
        .await
        .map_err(|e| NametagError::crypto(format!("{what}: worker failed: {e}")))?
        .map_err(|e| NametagError::crypto(format!("{what}: {e:#}")))
}

fn to_cipher_suite(suite: KeyCipherSuite) -> CipherSuite {
    match suite {
        KeyCipherSuite::Cv25519 => CipherSuite::Cv25519,
        KeyCipherSuite::Rsa2k => CipherSuite::RSA2k,
        KeyCipherSuite::Rsa3k => CipherSuite::RSA3k,
        KeyCipherSuite::Rsa4k => CipherSuite::RSA4k,
        KeyCipherSuite::P256 => CipherSuite::P256,
        KeyCipherSuite::P384 => CipherSuite::P384,
        KeyCipherSuite::P521 => CipherSuite::P521,
    }
}

fn read_cert(armored: &str, what: &str) -> openpgp::Result<Cert> {
    Cert::from_bytes(armored.as_bytes()).map_err(|e| e.context(format!("cannot read {what}")))
}

fn read_secret_cert(armored: &str, what: &str) -> openpgp::Result<Cert> {
    let cert = read_cert(armored, what)?;
    if !cert.is_tsk() {
        bail!("{what} {} holds no secret key material", cert.fingerprint());
    }
    Ok(cert)
}

fn unlock(key: Key<SecretParts, UnspecifiedRole>, password: Option<&Password>) -> openpgp::Result<KeyPair> {
    if key.has_unencrypted_secret() {
        return key.into_keypair();
    }
    match password {
        Some(password) => key.decrypt_secret(password)?.into_keypair(),
        None => bail!("secret key {} is passphrase protected", key.fingerprint()),
    }
}

fn signing_keypair(tsk: &Cert, policy: &dyn Policy, password: Option<&Password>) -> openpgp::Result<KeyPair> {
    let key = tsk
        .keys()
        .secret()
        .with_policy(policy, None)
        .supported()
        .alive()
        .revoked(false)
        .for_signing()
        .next()
        .map(|ka| ka.key().clone())
        .ok_or_else(|| anyhow!("key {} has no usable signing key", tsk.fingerprint()))?;
    unlock(key, password)
}

fn generate(
    user_ids: Vec<String>,
    cipher_suite: CipherSuite,
    password: Option<Password>,
) -> openpgp::Result<GeneratedKeyPair> {
    if user_ids.is_empty() {
        bail!("at least one user identity is required");
    }
    let mut builder = CertBuilder::new()
        .set_cipher_suite(cipher_suite)
        .add_signing_subkey()
        .add_transport_encryption_subkey()
        .set_password(password);
    for user_id in user_ids {
        builder = builder.add_userid(UserID::from(user_id));
    }
    let (cert, revocation) = builder.generate()?;

    let mut revocation_armored = Vec::new();
    {
        let mut writer = armor::Writer::new(&mut revocation_armored, armor::Kind::Signature)?;
        Packet::from(revocation).serialize(&mut writer)?;
        writer.finalize()?;
    }

    let private_key = cert.as_tsk().armored().to_vec()?;
    let public_key = cert.armored().to_vec()?;

    debug!("generated key {}", cert.fingerprint());
    Ok(GeneratedKeyPair {
        private_key_armored: String::from_utf8(private_key)?,
        public_key_armored: String::from_utf8(public_key)?,
        revocation_certificate_armored: String::from_utf8(revocation_armored)?,
    })
}

fn sign_cleartext(
    plaintext: &str,
    tsk: &Cert,
    policy: &dyn Policy,
    password: Option<&Password>,
) -> openpgp::Result<String> {
    let keypair = signing_keypair(tsk, policy, password)?;
    let mut sink = Vec::new();
    {
        let message = Message::new(&mut sink);
        let mut signer = Signer::new(message, keypair)
            .hash_algo(HashAlgorithm::SHA512)?
            .cleartext()
            .build()?;
        signer.write_all(plaintext.as_bytes())?;
        signer.finalize()?;
    }
    Ok(String::from_utf8(sink)?)
}

fn verify_cleartext(signed: &str, signer: &Cert, policy: &dyn Policy) -> openpgp::Result<VerifiedMessage> {
    let helper = VerifyHelper {
        signer,
        signers: Vec::new(),
    };
    let mut verifier = VerifierBuilder::from_bytes(signed.as_bytes())?.with_policy(policy, None, helper)?;
    let mut payload = Vec::new();
    verifier.read_to_end(&mut payload)?;
    let verified = !verifier.into_helper().signers.is_empty();
    Ok(VerifiedMessage {
        verified,
        payload: String::from_utf8(payload)?,
    })
}

fn encrypt_message(
    plaintext: &str,
    recipient: &Cert,
    signer: Option<KeyPair>,
    policy: &dyn Policy,
) -> openpgp::Result<String> {
    let recipients: Vec<_> = recipient
        .keys()
        .with_policy(policy, None)
        .supported()
        .alive()
        .revoked(false)
        .for_transport_encryption()
        .collect();
    if recipients.is_empty() {
        bail!("key {} has no usable encryption key", recipient.fingerprint());
    }

    let mut sink = Vec::new();
    {
        let message = Message::new(&mut sink);
        let message = Armorer::new(message).build()?;
        let message = Encryptor2::for_recipients(message, recipients).build()?;
        let message = match signer {
            Some(keypair) => Signer::new(message, keypair).build()?,
            None => message,
        };
        let mut literal = LiteralWriter::new(message).build()?;
        literal.write_all(plaintext.as_bytes())?;
        literal.finalize()?;
    }
    Ok(String::from_utf8(sink)?)
}

fn decrypt_message(ciphertext: &str, helper: DecryptHelper<'_>, policy: &dyn Policy) -> openpgp::Result<DecryptedMessage> {
    let mut decryptor = DecryptorBuilder::from_bytes(ciphertext.as_bytes())?.with_policy(policy, None, helper)?;
    let mut plaintext = Vec::new();
    decryptor.read_to_end(&mut plaintext)?;
    let signatures = decryptor.into_helper().signers;
    Ok(DecryptedMessage {
        plaintext: String::from_utf8(plaintext)?,
        signatures,
    })
}

/// Fingerprints of the keys whose signatures verified.
fn good_signers(structure: MessageStructure) -> Vec<String> {
    let mut signers = Vec::new();
    for layer in structure.into_iter() {
        if let MessageLayer::SignatureGroup { results } = layer {
            for result in results {
                match result {
                    Ok(good) => signers.push(good.ka.fingerprint().to_hex()),
                    Err(e) => debug!("signature rejected: {e}"),
                }
            }
        }
    }
    signers
}

struct VerifyHelper<'a> {
    signer: &'a Cert,
    signers: Vec<String>,
}

impl VerificationHelper for VerifyHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(vec![self.signer.clone()])
    }

    // Reports rather than rejects; `verify` returns `verified: false`.
    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        self.signers = good_signers(structure);
        Ok(())
    }
}

struct DecryptHelper<'a> {
    policy: &'a dyn Policy,
    secret: &'a Cert,
    sender: &'a Cert,
    password: Option<&'a Password>,
    require_signature: bool,
    signers: Vec<String>,
}

impl VerificationHelper for DecryptHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(vec![self.sender.clone()])
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        self.signers = good_signers(structure);
        if self.require_signature && self.signers.is_empty() {
            bail!("message carries no valid signature by {}", self.sender.fingerprint());
        }
        Ok(())
    }
}

impl DecryptionHelper for DecryptHelper<'_> {
    fn decrypt<D>(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        mut decrypt: D,
    ) -> openpgp::Result<Option<Fingerprint>>
    where
        D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    {
        let keys: Vec<Key<SecretParts, UnspecifiedRole>> = self
            .secret
            .keys()
            .secret()
            .with_policy(self.policy, None)
            .supported()
            .for_transport_encryption()
            .for_storage_encryption()
            .map(|ka| ka.key().clone())
            .collect();

        for pkesk in pkesks {
            for key in &keys {
                let recipient = pkesk.recipient();
                if !recipient.is_wildcard() && *recipient != key.keyid() {
                    continue;
                }
                let mut pair = unlock(key.clone(), self.password)?;
                if let Some((algo, session_key)) = pkesk.decrypt(&mut pair, sym_algo) {
                    if decrypt(algo, &session_key) {
                        return Ok(Some(key.fingerprint()));
                    }
                }
            }
        }
        Err(anyhow!(
            "no secret key in {} can decrypt this message",
            self.secret.fingerprint()
        ))
    }
}
