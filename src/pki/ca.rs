use log::info;

use super::certificate::{Certificate, CertificateKind, CertificateView, OwnerRef};
use super::store::CertificateStore;
use crate::audit::{AuditAction, AuditLedger};
use crate::clock::Clock;
use crate::config::PkiConfig;
use crate::crypto::KeyMaterial;
use crate::crypto::keys::{fingerprint, random_serial};
use crate::error::{PkiError, Result};

/// Holder of the single self-issued ROOT certificate.
///
/// Built once at startup by [`CertificateAuthority::bootstrap`] and shared
/// with the issuer; there is no global.
pub struct CertificateAuthority {
    root: Certificate,
}

impl CertificateAuthority {
    /// Reuse the persisted ROOT if there is one, otherwise create it and
    /// record the creation in `audit`.
    pub async fn bootstrap(
        store: &dyn CertificateStore,
        clock: &dyn Clock,
        config: &PkiConfig,
        audit: &AuditLedger,
    ) -> Result<Self> {
        if let Some(root) = find_root(store).await? {
            info!("Root certificate already exists (serial {})", root.serial_number);
            return Ok(Self { root });
        }

        info!("Creating root certificate...");
        let keys = KeyMaterial::generate()?;
        let now = clock.now();
        let subject = config.root_subject();
        let public_key = keys.public_key_bytes();

        let mut root = Certificate {
            id: 0,
            kind: CertificateKind::Root,
            serial_number: random_serial()?,
            subject: subject.clone(),
            issuer: subject,
            public_material: keys.public_pem(),
            private_material: keys.private_pem(),
            fingerprint: fingerprint(&public_key),
            valid_from: now,
            valid_until: config.validity.valid_until(CertificateKind::Root, now)?,
            revoked: false,
            revoked_at: None,
            revocation_reason: None,
            owner: OwnerRef::Authority,
            owner_display_name: config.organization.clone(),
            parent_serial: None,
            issuer_signature: String::new(),
        };
        root.issuer_signature = hex::encode(keys.sign(&root.tbs_bytes()?));

        match store.insert_unique(root).await {
            Ok(root) => {
                info!("Root certificate created with serial {}", root.serial_number);
                audit
                    .record(AuditAction::RootBootstrapped, &root.view(), None, now)
                    .await;
                Ok(Self { root })
            }
            // lost a bootstrap race; the winner's root is authoritative
            Err(PkiError::DuplicateActiveCertificate { .. }) => {
                let root = find_root(store).await?.ok_or_else(|| {
                    PkiError::StoreUnavailable("root vanished during bootstrap".to_string())
                })?;
                Ok(Self { root })
            }
            Err(e) => Err(e),
        }
    }

    pub fn root(&self) -> CertificateView {
        self.root.view()
    }

    pub fn root_serial(&self) -> &str {
        &self.root.serial_number
    }

    pub(crate) fn root_for_signing(&self) -> &Certificate {
        &self.root
    }
}

async fn find_root(store: &dyn CertificateStore) -> Result<Option<Certificate>> {
    Ok(store
        .find_by_kind(CertificateKind::Root)
        .await?
        .into_iter()
        .next())
}
