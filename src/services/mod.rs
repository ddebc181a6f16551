// src/services/mod.rs
pub mod certificate_protocol;
pub mod verifier;

pub use certificate_protocol::CertificateProtocol;
pub use verifier::{RecordVerification, RecordVerifier};
