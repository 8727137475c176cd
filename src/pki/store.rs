use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::certificate::{Certificate, CertificateKind, OwnerRef};
use crate::error::{PkiError, Result};

/// Persistence seam for certificates.
///
/// Implementations must make `insert_unique` and `mark_revoked` atomic with
/// respect to each other and to concurrent reads.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Insert a new certificate, assigning its `id`. Fails with
    /// `DuplicateActiveCertificate` if a non-revoked certificate already
    /// exists for the same owner, or if any ROOT exists when inserting a ROOT.
    async fn insert_unique(&self, certificate: Certificate) -> Result<Certificate>;

    async fn find_by_serial(&self, serial: &str) -> Result<Option<Certificate>>;

    async fn find_active_by_owner(&self, owner: &OwnerRef) -> Result<Option<Certificate>>;

    async fn find_by_owner(&self, owner: &OwnerRef) -> Result<Vec<Certificate>>;

    async fn find_by_kind(&self, kind: CertificateKind) -> Result<Vec<Certificate>>;

    async fn find_children(&self, parent_serial: &str) -> Result<Vec<Certificate>>;

    async fn find_all(&self) -> Result<Vec<Certificate>>;

    /// Set the revocation fields in one step. Fails with `AlreadyRevoked`
    /// or `UnknownCertificate`.
    async fn mark_revoked(
        &self,
        serial: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Certificate>;
}

#[derive(Default)]
struct StoreState {
    certificates: HashMap<String, Certificate>,
    next_id: u64,
}

impl StoreState {
    fn sorted(&self, mut pred: impl FnMut(&Certificate) -> bool) -> Vec<Certificate> {
        let mut out: Vec<Certificate> = self
            .certificates
            .values()
            .filter(|c| pred(c))
            .cloned()
            .collect();
        out.sort_by_key(|c| c.id);
        out
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCertificateStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.certificates.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CertificateStore for InMemoryCertificateStore {
    async fn insert_unique(&self, mut certificate: Certificate) -> Result<Certificate> {
        let mut state = self.state.write().await;

        if state.certificates.contains_key(&certificate.serial_number) {
            return Err(PkiError::StoreUnavailable(format!(
                "serial number collision: {}",
                certificate.serial_number
            )));
        }

        let conflict = state.certificates.values().find(|existing| {
            if certificate.kind == CertificateKind::Root {
                existing.kind == CertificateKind::Root
            } else {
                existing.owner == certificate.owner && existing.is_active()
            }
        });
        if let Some(existing) = conflict {
            return Err(PkiError::DuplicateActiveCertificate {
                kind: certificate.kind,
                owner: certificate.owner.to_string(),
                serial: existing.serial_number.clone(),
            });
        }

        state.next_id += 1;
        certificate.id = state.next_id;
        state
            .certificates
            .insert(certificate.serial_number.clone(), certificate.clone());
        Ok(certificate)
    }

    async fn find_by_serial(&self, serial: &str) -> Result<Option<Certificate>> {
        Ok(self.state.read().await.certificates.get(serial).cloned())
    }

    async fn find_active_by_owner(&self, owner: &OwnerRef) -> Result<Option<Certificate>> {
        let state = self.state.read().await;
        Ok(state
            .certificates
            .values()
            .find(|c| &c.owner == owner && c.is_active())
            .cloned())
    }

    async fn find_by_owner(&self, owner: &OwnerRef) -> Result<Vec<Certificate>> {
        Ok(self.state.read().await.sorted(|c| &c.owner == owner))
    }

    async fn find_by_kind(&self, kind: CertificateKind) -> Result<Vec<Certificate>> {
        Ok(self.state.read().await.sorted(|c| c.kind == kind))
    }

    async fn find_children(&self, parent_serial: &str) -> Result<Vec<Certificate>> {
        Ok(self
            .state
            .read()
            .await
            .sorted(|c| c.parent_serial.as_deref() == Some(parent_serial)))
    }

    async fn find_all(&self) -> Result<Vec<Certificate>> {
        Ok(self.state.read().await.sorted(|_| true))
    }

    async fn mark_revoked(
        &self,
        serial: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Certificate> {
        let mut state = self.state.write().await;
        let cert = state
            .certificates
            .get_mut(serial)
            .ok_or_else(|| PkiError::UnknownCertificate(serial.to_string()))?;

        if cert.revoked {
            return Err(PkiError::AlreadyRevoked(serial.to_string()));
        }

        cert.revoked = true;
        cert.revoked_at = Some(at);
        cert.revocation_reason = Some(reason.to_string());
        Ok(cert.clone())
    }
}
