use log::{info, warn};
use std::sync::Arc;

use super::ca::CertificateAuthority;
use super::certificate::{Certificate, CertificateKind, OwnerRef};
use super::identity::{ClubIdentity, PersonIdentity, RangeIdentity};
use super::revocation::RevocationManager;
use super::store::CertificateStore;
use crate::audit::{AuditAction, AuditLedger};
use crate::clock::Clock;
use crate::config::PkiConfig;
use crate::crypto::KeyMaterial;
use crate::crypto::keys::{fingerprint, random_serial};
use crate::error::{PkiError, Result};

/// Issues CLUB, SUPERVISOR and RANGE_SUPERVISOR certificates and records
/// each issuance in the audit ledger.
pub struct CertificateIssuer {
    store: Arc<dyn CertificateStore>,
    authority: Arc<CertificateAuthority>,
    clock: Arc<dyn Clock>,
    config: Arc<PkiConfig>,
    audit: AuditLedger,
}

impl CertificateIssuer {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        authority: Arc<CertificateAuthority>,
        clock: Arc<dyn Clock>,
        config: Arc<PkiConfig>,
        audit: AuditLedger,
    ) -> Self {
        Self {
            store,
            authority,
            clock,
            config,
            audit,
        }
    }

    pub async fn issue_club_certificate(&self, club: &ClubIdentity) -> Result<Certificate> {
        info!("Issuing club certificate for {}", club.name);
        let parent = self.root_parent().await?;
        let subject = format!(
            "CN={}, O={}, OU=Club, C={}",
            club.name, self.config.organization, self.config.country
        );
        self.issue_under(
            &parent,
            OwnerRef::Club { club_id: club.id },
            club.name.clone(),
            subject,
        )
        .await
    }

    pub async fn issue_supervisor_certificate(
        &self,
        person: &PersonIdentity,
        club: &ClubIdentity,
    ) -> Result<Certificate> {
        info!(
            "Issuing supervisor certificate for {} at club {}",
            person.full_name, club.name
        );
        let parent = self.club_parent(club).await?;
        let subject = format!(
            "CN={}, O={}, OU=Supervisor {}, C={}",
            person.full_name, self.config.organization, club.name, self.config.country
        );
        self.issue_under(
            &parent,
            OwnerRef::Supervisor {
                member_id: person.id,
                club_id: club.id,
            },
            person.full_name.clone(),
            subject,
        )
        .await
    }

    /// Ranges owned by a club chain under the club's certificate, all
    /// others directly under ROOT.
    pub async fn issue_range_supervisor_certificate(
        &self,
        person: &PersonIdentity,
        range: &RangeIdentity,
    ) -> Result<Certificate> {
        info!(
            "Issuing range supervisor certificate for {} at range {}",
            person.full_name, range.name
        );
        let parent = match &range.club {
            Some(club) => self.club_parent(club).await?,
            None => self.root_parent().await?,
        };
        let subject = format!(
            "CN={}, O={}, OU=Range Supervisor {}, C={}",
            person.full_name, self.config.organization, range.name, self.config.country
        );
        self.issue_under(
            &parent,
            OwnerRef::RangeSupervisor {
                member_id: person.id,
                range_id: range.id,
            },
            person.full_name.clone(),
            subject,
        )
        .await
    }

    /// Return the club's active certificate, issuing one if there is none.
    pub async fn ensure_club_certificate(&self, club: &ClubIdentity) -> Result<Certificate> {
        let owner = OwnerRef::Club { club_id: club.id };
        if let Some(existing) = self.store.find_active_by_owner(&owner).await? {
            return Ok(existing);
        }
        match self.issue_club_certificate(club).await {
            Err(PkiError::DuplicateActiveCertificate { .. }) => self.active_or_unknown(&owner).await,
            other => other,
        }
    }

    /// Return the supervisor's active certificate, issuing the club and
    /// supervisor certificates as needed.
    pub async fn ensure_supervisor_certificate(
        &self,
        person: &PersonIdentity,
        club: &ClubIdentity,
    ) -> Result<Certificate> {
        let owner = OwnerRef::Supervisor {
            member_id: person.id,
            club_id: club.id,
        };
        if let Some(existing) = self.store.find_active_by_owner(&owner).await? {
            return Ok(existing);
        }
        self.ensure_club_certificate(club).await?;
        match self.issue_supervisor_certificate(person, club).await {
            Err(PkiError::DuplicateActiveCertificate { .. }) => self.active_or_unknown(&owner).await,
            other => other,
        }
    }

    /// Revoke the supervisor's active certificate, if any, and issue a new one.
    pub async fn reissue_supervisor_certificate(
        &self,
        person: &PersonIdentity,
        club: &ClubIdentity,
        reason: &str,
        revocation: &RevocationManager,
    ) -> Result<Certificate> {
        let owner = OwnerRef::Supervisor {
            member_id: person.id,
            club_id: club.id,
        };
        if let Some(existing) = self.store.find_active_by_owner(&owner).await? {
            revocation
                .revoke(&existing.serial_number, reason, self.clock.now())
                .await?;
        }
        self.issue_supervisor_certificate(person, club).await
    }

    async fn active_or_unknown(&self, owner: &OwnerRef) -> Result<Certificate> {
        self.store
            .find_active_by_owner(owner)
            .await?
            .ok_or_else(|| PkiError::UnknownCertificate(owner.to_string()))
    }

    async fn root_parent(&self) -> Result<Certificate> {
        let serial = self.authority.root_for_signing().serial_number.as_str();
        // re-read: the root may have been revoked since bootstrap
        self.store.find_by_serial(serial).await?.ok_or_else(|| {
            PkiError::ParentCertificateInvalid(format!("root certificate {} not found", serial))
        })
    }

    async fn club_parent(&self, club: &ClubIdentity) -> Result<Certificate> {
        let owner = OwnerRef::Club { club_id: club.id };
        if let Some(active) = self.store.find_active_by_owner(&owner).await? {
            return Ok(active);
        }
        let reason = if self.store.find_by_owner(&owner).await?.is_empty() {
            "has no certificate"
        } else {
            "has only revoked certificates"
        };
        warn!("Cannot chain under club {}: {}", club.name, reason);
        Err(PkiError::ParentCertificateInvalid(format!(
            "club {} {}",
            club.name, reason
        )))
    }

    async fn issue_under(
        &self,
        parent: &Certificate,
        owner: OwnerRef,
        owner_display_name: String,
        subject: String,
    ) -> Result<Certificate> {
        let kind = owner.kind();
        let now = self.clock.now();

        if parent.revoked {
            return Err(PkiError::ParentCertificateInvalid(format!(
                "parent {} is revoked",
                parent.serial_number
            )));
        }
        if !parent.in_window(now) {
            return Err(PkiError::ParentCertificateInvalid(format!(
                "parent {} is outside its validity window",
                parent.serial_number
            )));
        }
        if !is_valid_parent_kind(parent.kind, kind) {
            return Err(PkiError::ParentCertificateInvalid(format!(
                "a {} certificate cannot issue a {} certificate",
                parent.kind, kind
            )));
        }

        // fast path; the store re-checks atomically on insert
        if let Some(existing) = self.store.find_active_by_owner(&owner).await? {
            return Err(PkiError::DuplicateActiveCertificate {
                kind,
                owner: owner.to_string(),
                serial: existing.serial_number,
            });
        }

        let keys = KeyMaterial::generate()?;
        let parent_keys = KeyMaterial::from_private_pem(parent.private_material())?;
        let public_key = keys.public_key_bytes();

        let mut cert = Certificate {
            id: 0,
            kind,
            serial_number: random_serial()?,
            subject,
            issuer: parent.subject.clone(),
            public_material: keys.public_pem(),
            private_material: keys.private_pem(),
            fingerprint: fingerprint(&public_key),
            valid_from: now,
            valid_until: self.config.validity.valid_until(kind, now)?,
            revoked: false,
            revoked_at: None,
            revocation_reason: None,
            owner,
            owner_display_name,
            parent_serial: Some(parent.serial_number.clone()),
            issuer_signature: String::new(),
        };
        cert.issuer_signature = hex::encode(parent_keys.sign(&cert.tbs_bytes()?));

        let cert = self.store.insert_unique(cert).await?;
        info!(
            "{} certificate issued: serial {}, subject '{}'",
            cert.kind, cert.serial_number, cert.subject
        );
        self.audit
            .record(
                AuditAction::CertificateIssued,
                &cert.view(),
                Some(format!("parent {}", parent.serial_number)),
                now,
            )
            .await;
        Ok(cert)
    }
}

fn is_valid_parent_kind(parent: CertificateKind, child: CertificateKind) -> bool {
    match child {
        CertificateKind::Root => false,
        CertificateKind::Club => parent == CertificateKind::Root,
        CertificateKind::Supervisor => parent == CertificateKind::Club,
        CertificateKind::RangeSupervisor => {
            matches!(parent, CertificateKind::Root | CertificateKind::Club)
        }
    }
}
