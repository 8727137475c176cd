use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::pki::CertificateKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    RootBootstrapped,
    CertificateIssued,
    CertificateRevoked,
    RecordSigned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub serial_number: String,
    pub kind: CertificateKind,
    pub subject: String,
    pub detail: Option<String>,
    pub previous_hash: String,
    pub hash: String,
}

impl AuditEntry {
    pub fn genesis_hash() -> String {
        "0".repeat(64)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u64,
        timestamp: DateTime<Utc>,
        action: AuditAction,
        serial_number: String,
        kind: CertificateKind,
        subject: String,
        detail: Option<String>,
        previous_hash: String,
    ) -> Self {
        let mut entry = Self {
            index,
            timestamp,
            action,
            serial_number,
            kind,
            subject,
            detail,
            previous_hash,
            hash: String::new(),
        };
        entry.hash = entry.calculate_hash();
        entry
    }

    pub fn calculate_hash(&self) -> String {
        let data = format!(
            "{}|{}|{:?}|{}|{}|{}|{}|{}",
            self.index,
            self.timestamp.to_rfc3339(),
            self.action,
            self.serial_number,
            self.kind,
            self.subject,
            self.detail.as_deref().unwrap_or(""),
            self.previous_hash
        );
        format!("{:x}", Sha256::digest(data.as_bytes()))
    }
}
