use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::SecretPem;
use crate::crypto::armor;
use crate::error::{PkiError, Result};

pub const CERTIFICATE_LABEL: &str = "LOGBOOK CERTIFICATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateKind {
    Root,
    Club,
    Supervisor,
    RangeSupervisor,
}

impl CertificateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateKind::Root => "ROOT",
            CertificateKind::Club => "CLUB",
            CertificateKind::Supervisor => "SUPERVISOR",
            CertificateKind::RangeSupervisor => "RANGE_SUPERVISOR",
        }
    }

    pub fn all() -> [CertificateKind; 4] {
        [
            CertificateKind::Root,
            CertificateKind::Club,
            CertificateKind::Supervisor,
            CertificateKind::RangeSupervisor,
        ]
    }
}

impl fmt::Display for CertificateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The external entity a certificate authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OwnerRef {
    Authority,
    Club {
        club_id: u64,
    },
    Supervisor {
        member_id: u64,
        club_id: u64,
    },
    RangeSupervisor {
        member_id: u64,
        range_id: u64,
    },
}

impl OwnerRef {
    pub fn kind(&self) -> CertificateKind {
        match self {
            OwnerRef::Authority => CertificateKind::Root,
            OwnerRef::Club { .. } => CertificateKind::Club,
            OwnerRef::Supervisor { .. } => CertificateKind::Supervisor,
            OwnerRef::RangeSupervisor { .. } => CertificateKind::RangeSupervisor,
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerRef::Authority => f.write_str("authority"),
            OwnerRef::Club { club_id } => write!(f, "club {}", club_id),
            OwnerRef::Supervisor { member_id, club_id } => {
                write!(f, "member {} at club {}", member_id, club_id)
            }
            OwnerRef::RangeSupervisor {
                member_id,
                range_id,
            } => write!(f, "member {} at range {}", member_id, range_id),
        }
    }
}

/// A certificate as held by the store, private key included.
///
/// Not `Serialize`: anything leaving the core goes through [`CertificateView`].
#[derive(Debug, Clone)]
pub struct Certificate {
    pub id: u64,
    pub kind: CertificateKind,
    pub serial_number: String,
    pub subject: String,
    pub issuer: String,
    pub public_material: String,
    pub(crate) private_material: SecretPem,
    pub fingerprint: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
    pub owner: OwnerRef,
    pub owner_display_name: String,
    pub parent_serial: Option<String>,
    /// Parent's signature over [`Certificate::tbs_bytes`], hex. ROOT signs itself.
    pub issuer_signature: String,
}

/// The fields covered by the issuer signature. Revocation state is
/// deliberately absent: it is the only thing allowed to change.
#[derive(Serialize)]
struct ToBeSigned<'a> {
    kind: CertificateKind,
    serial_number: &'a str,
    subject: &'a str,
    issuer: &'a str,
    public_material: &'a str,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
    owner: &'a OwnerRef,
    parent_serial: Option<&'a str>,
}

impl Certificate {
    /// Private key of this certificate. Handed to the issuing caller once;
    /// must never be logged or displayed.
    pub fn private_material(&self) -> &SecretPem {
        &self.private_material
    }

    pub fn is_active(&self) -> bool {
        !self.revoked
    }

    pub fn in_window(&self, at: DateTime<Utc>) -> bool {
        at >= self.valid_from && self.valid_until.is_none_or(|until| at <= until)
    }

    /// A revoked certificate without a timestamp counts as revoked for all time.
    pub fn not_revoked_at(&self, at: DateTime<Utc>) -> bool {
        if !self.revoked {
            return true;
        }
        match self.revoked_at {
            Some(revoked_at) => at < revoked_at,
            None => false,
        }
    }

    pub fn tbs_bytes(&self) -> Result<Vec<u8>> {
        let tbs = ToBeSigned {
            kind: self.kind,
            serial_number: &self.serial_number,
            subject: &self.subject,
            issuer: &self.issuer,
            public_material: &self.public_material,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            owner: &self.owner,
            parent_serial: self.parent_serial.as_deref(),
        };
        Ok(bincode::serialize(&tbs)?)
    }

    pub fn view(&self) -> CertificateView {
        CertificateView {
            id: self.id,
            kind: self.kind,
            serial_number: self.serial_number.clone(),
            subject: self.subject.clone(),
            issuer: self.issuer.clone(),
            public_material: self.public_material.clone(),
            fingerprint: self.fingerprint.clone(),
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            revoked: self.revoked,
            revoked_at: self.revoked_at,
            revocation_reason: self.revocation_reason.clone(),
            owner: self.owner.clone(),
            owner_display_name: self.owner_display_name.clone(),
            parent_serial: self.parent_serial.clone(),
            issuer_signature: self.issuer_signature.clone(),
        }
    }
}

/// The public face of a certificate: every read, list and verify result
/// carries this type. It has no private key field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateView {
    pub id: u64,
    pub kind: CertificateKind,
    pub serial_number: String,
    pub subject: String,
    pub issuer: String,
    pub public_material: String,
    pub fingerprint: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
    pub owner: OwnerRef,
    pub owner_display_name: String,
    pub parent_serial: Option<String>,
    pub issuer_signature: String,
}

impl CertificateView {
    /// Stable text encoding for display and transport.
    pub fn to_pem(&self) -> Result<String> {
        let body = serde_json::to_vec(self)?;
        Ok(armor::encode(
            CERTIFICATE_LABEL,
            &[
                ("Serial", self.serial_number.as_str()),
                ("Kind", self.kind.as_str()),
            ],
            &body,
        ))
    }

    pub fn from_pem(text: &str) -> Result<Self> {
        let armored = armor::decode(CERTIFICATE_LABEL, text)?;
        let view: CertificateView = serde_json::from_slice(&armored.body)?;
        if armored.header("Serial") != Some(view.serial_number.as_str()) {
            return Err(PkiError::InvalidEncoding(
                "serial header does not match certificate body".to_string(),
            ));
        }
        Ok(view)
    }
}
