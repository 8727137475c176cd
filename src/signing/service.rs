use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::payload::SignableRecord;
use crate::audit::{AuditAction, AuditLedger};
use crate::clock::Clock;
use crate::crypto::KeyMaterial;
use crate::error::{PkiError, Result};
use crate::pki::store::CertificateStore;
use crate::pki::verification::VerificationEngine;
use crate::pki::Certificate;

/// What the surrounding system attaches to a signed logbook entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSignature {
    /// The exact string that was signed.
    pub payload: String,
    /// Ed25519 signature, hex.
    pub signature: String,
    pub certificate_serial: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCheck {
    /// The stored payload equals the one rebuilt from the record's fields.
    pub payload_matches: bool,
    pub signature_valid: bool,
}

impl RecordCheck {
    pub fn is_authentic(&self) -> bool {
        self.payload_matches && self.signature_valid
    }
}

pub struct SigningService {
    store: Arc<dyn CertificateStore>,
    verifier: Arc<VerificationEngine>,
    clock: Arc<dyn Clock>,
    audit: AuditLedger,
}

impl SigningService {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        verifier: Arc<VerificationEngine>,
        clock: Arc<dyn Clock>,
        audit: AuditLedger,
    ) -> Self {
        Self {
            store,
            verifier,
            clock,
            audit,
        }
    }

    /// Sign `record` with `certificate`'s private key.
    ///
    /// Revocation state is re-read from the store, so a stale copy of a
    /// since-revoked certificate cannot sign.
    ///
    /// Only the signing certificate itself is checked. A supervisor whose
    /// club has been revoked can still sign, and the result verifies as
    /// `AncestorInvalid` from the moment it is made; callers that must
    /// refuse such signatures check
    /// [`VerificationEngine::verify_validity_at`] first.
    pub async fn sign(
        &self,
        record: &SignableRecord,
        certificate: &Certificate,
    ) -> Result<RecordSignature> {
        let now = self.clock.now();
        let current = self
            .store
            .find_by_serial(&certificate.serial_number)
            .await?
            .ok_or_else(|| PkiError::UnknownCertificate(certificate.serial_number.clone()))?;

        if !current.not_revoked_at(now) {
            warn!(
                "Refusing to sign with revoked certificate {}",
                current.serial_number
            );
            return Err(PkiError::CertificateNotUsable {
                serial: current.serial_number,
                reason: "certificate is revoked".to_string(),
            });
        }
        if !current.in_window(now) {
            warn!(
                "Refusing to sign with certificate {} outside its validity window",
                current.serial_number
            );
            return Err(PkiError::CertificateNotUsable {
                serial: current.serial_number,
                reason: "certificate is expired or not yet valid".to_string(),
            });
        }

        let payload = record.canonical_payload();
        let keys = KeyMaterial::from_private_pem(current.private_material())?;
        let signature = hex::encode(keys.sign(payload.as_bytes()));

        info!(
            "Record signed with {} certificate {} ('{}')",
            current.kind, current.serial_number, current.owner_display_name
        );
        self.audit
            .record(AuditAction::RecordSigned, &current.view(), None, now)
            .await;
        Ok(RecordSignature {
            payload,
            signature,
            certificate_serial: current.serial_number,
        })
    }

    /// Rebuild the payload from `record`'s business fields and check it and
    /// the stored signature.
    pub async fn verify_record(
        &self,
        record: &SignableRecord,
        signed: &RecordSignature,
    ) -> Result<RecordCheck> {
        let payload_matches = record.canonical_payload() == signed.payload;
        let signature_valid = self
            .verifier
            .verify_signature_by_serial(&signed.payload, &signed.signature, &signed.certificate_serial)
            .await?;
        if !payload_matches {
            warn!(
                "Stored payload differs from record fields (certificate {})",
                signed.certificate_serial
            );
        }
        Ok(RecordCheck {
            payload_matches,
            signature_valid,
        })
    }
}
