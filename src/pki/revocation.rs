use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::VecDeque;
use std::sync::Arc;

use super::certificate::CertificateView;
use super::store::CertificateStore;
use crate::audit::{AuditAction, AuditLedger};
use crate::error::{PkiError, Result};

/// One-way revocation of certificates.
///
/// Revoking a certificate never writes to its dependents; the verification
/// engine reflects a revoked ancestor through the chain walk. Every
/// revocation is written to the audit ledger.
pub struct RevocationManager {
    store: Arc<dyn CertificateStore>,
    audit: AuditLedger,
}

impl RevocationManager {
    pub fn new(store: Arc<dyn CertificateStore>, audit: AuditLedger) -> Self {
        Self { store, audit }
    }

    async fn record(&self, view: &CertificateView, reason: &str, at: DateTime<Utc>) {
        self.audit
            .record(
                AuditAction::CertificateRevoked,
                view,
                Some(reason.to_string()),
                at,
            )
            .await;
    }

    /// Revoke `serial` effective `at`. Revoking twice is an error.
    pub async fn revoke(
        &self,
        serial: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<CertificateView> {
        let serial = serial.trim();
        match self.store.mark_revoked(serial, reason, at).await {
            Ok(cert) => {
                info!(
                    "{} certificate {} revoked at {} ({})",
                    cert.kind, cert.serial_number, at, reason
                );
                let view = cert.view();
                self.record(&view, reason, at).await;
                Ok(view)
            }
            Err(PkiError::AlreadyRevoked(serial)) => {
                warn!("Duplicate revocation attempt for certificate {}", serial);
                Err(PkiError::AlreadyRevoked(serial))
            }
            Err(e) => Err(e),
        }
    }

    /// Direct children of `serial`.
    pub async fn dependents(&self, serial: &str) -> Result<Vec<CertificateView>> {
        Ok(self
            .store
            .find_children(serial.trim())
            .await?
            .iter()
            .map(|c| c.view())
            .collect())
    }

    /// Revoke `serial` and every not-yet-revoked descendant with the same
    /// reason and instant. For callers whose policy is to cascade.
    pub async fn revoke_with_dependents(
        &self,
        serial: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<CertificateView>> {
        let mut revoked = vec![self.revoke(serial, reason, at).await?];

        let mut pending: VecDeque<String> = VecDeque::new();
        pending.push_back(revoked[0].serial_number.clone());
        while let Some(parent) = pending.pop_front() {
            for child in self.store.find_children(&parent).await? {
                pending.push_back(child.serial_number.clone());
                if child.revoked {
                    continue;
                }
                match self.store.mark_revoked(&child.serial_number, reason, at).await {
                    Ok(cert) => {
                        let view = cert.view();
                        self.record(&view, reason, at).await;
                        revoked.push(view);
                    }
                    // revoked concurrently; nothing left to do for it
                    Err(PkiError::AlreadyRevoked(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        info!(
            "Cascading revocation from {} revoked {} certificate(s)",
            serial,
            revoked.len()
        );
        Ok(revoked)
    }
}
