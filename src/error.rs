//! Error types for certificate issuance, signing and revocation.

use crate::pki::certificate::CertificateKind;
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PkiError {
    #[error("an active {kind} certificate already exists for {owner} (serial {serial})")]
    DuplicateActiveCertificate {
        kind: CertificateKind,
        owner: String,
        serial: String,
    },

    #[error("parent certificate invalid: {0}")]
    ParentCertificateInvalid(String),

    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("certificate {serial} is not usable for signing: {reason}")]
    CertificateNotUsable { serial: String, reason: String },

    #[error("certificate {0} is already revoked")]
    AlreadyRevoked(String),

    #[error("invalid validity term: {0}")]
    InvalidValidityTerm(String),

    #[error("unknown certificate serial: {0}")]
    UnknownCertificate(String),

    #[error("certificate store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PkiError {
    fn from(e: serde_json::Error) -> Self {
        PkiError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for PkiError {
    fn from(e: bincode::Error) -> Self {
        PkiError::Serialization(e.to_string())
    }
}

impl From<csv::Error> for PkiError {
    fn from(e: csv::Error) -> Self {
        PkiError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PkiError>;
