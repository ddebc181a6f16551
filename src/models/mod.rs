// src/models/mod.rs
pub mod body;
pub mod envelope;
pub mod keys;
pub mod record;

pub use body::CertificateBody;
pub use envelope::EncryptedEnvelope;
pub use keys::{DecryptedMessage, GeneratedKeyPair, UserIdentity, VerifiedMessage};
pub use record::CertificateRecord;
