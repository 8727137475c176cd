use chrono::{DateTime, Utc};
use log::info;
use std::sync::Arc;

use crate::audit::AuditLedger;
use crate::clock::Clock;
use crate::config::PkiConfig;
use crate::error::Result;
use crate::metrics::PkiStatistics;
use crate::pki::{
    Certificate, CertificateAuthority, CertificateIssuer, CertificateStore, CertificateView,
    ClubIdentity, PersonIdentity, RangeIdentity, RevocationManager, ValidityOutcome,
    VerificationEngine,
};
use crate::signing::{RecordCheck, RecordSignature, SignableRecord, SigningService};

/// The assembled trust hierarchy: one store, one root, and the services
/// that act on them. The services share one audit ledger, so every
/// issuance, revocation and signature lands in it whichever path caused it.
pub struct LogbookPki {
    store: Arc<dyn CertificateStore>,
    authority: Arc<CertificateAuthority>,
    issuer: CertificateIssuer,
    signer: SigningService,
    revocation: RevocationManager,
    verifier: Arc<VerificationEngine>,
    audit: AuditLedger,
    clock: Arc<dyn Clock>,
}

impl LogbookPki {
    pub async fn new(
        store: Arc<dyn CertificateStore>,
        clock: Arc<dyn Clock>,
        config: PkiConfig,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let audit = AuditLedger::new();

        let authority = Arc::new(
            CertificateAuthority::bootstrap(store.as_ref(), clock.as_ref(), &config, &audit)
                .await?,
        );
        let verifier = Arc::new(VerificationEngine::new(store.clone(), config.key_cache_size));
        let issuer = CertificateIssuer::new(
            store.clone(),
            authority.clone(),
            clock.clone(),
            config.clone(),
            audit.clone(),
        );
        let signer = SigningService::new(
            store.clone(),
            verifier.clone(),
            clock.clone(),
            audit.clone(),
        );
        let revocation = RevocationManager::new(store.clone(), audit.clone());

        info!(
            "Certificate hierarchy ready (root serial {})",
            authority.root_serial()
        );

        Ok(Self {
            store,
            authority,
            issuer,
            signer,
            revocation,
            verifier,
            audit,
            clock,
        })
    }

    pub fn root(&self) -> CertificateView {
        self.authority.root()
    }

    pub fn audit(&self) -> &AuditLedger {
        &self.audit
    }

    pub async fn issue_club_certificate(&self, club: &ClubIdentity) -> Result<Certificate> {
        self.issuer.issue_club_certificate(club).await
    }

    pub async fn issue_supervisor_certificate(
        &self,
        person: &PersonIdentity,
        club: &ClubIdentity,
    ) -> Result<Certificate> {
        self.issuer.issue_supervisor_certificate(person, club).await
    }

    pub async fn issue_range_supervisor_certificate(
        &self,
        person: &PersonIdentity,
        range: &RangeIdentity,
    ) -> Result<Certificate> {
        self.issuer
            .issue_range_supervisor_certificate(person, range)
            .await
    }

    pub async fn ensure_club_certificate(&self, club: &ClubIdentity) -> Result<Certificate> {
        self.issuer.ensure_club_certificate(club).await
    }

    pub async fn ensure_supervisor_certificate(
        &self,
        person: &PersonIdentity,
        club: &ClubIdentity,
    ) -> Result<Certificate> {
        self.issuer.ensure_supervisor_certificate(person, club).await
    }

    pub async fn reissue_supervisor_certificate(
        &self,
        person: &PersonIdentity,
        club: &ClubIdentity,
        reason: &str,
    ) -> Result<Certificate> {
        self.issuer
            .reissue_supervisor_certificate(person, club, reason, &self.revocation)
            .await
    }

    /// Sign `record` with `certificate`. Only the certificate itself is
    /// checked; see [`SigningService::sign`].
    pub async fn sign(
        &self,
        record: &SignableRecord,
        certificate: &Certificate,
    ) -> Result<RecordSignature> {
        self.signer.sign(record, certificate).await
    }

    pub async fn revoke(
        &self,
        serial: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<CertificateView> {
        self.revocation.revoke(serial, reason, at).await
    }

    pub async fn dependents(&self, serial: &str) -> Result<Vec<CertificateView>> {
        self.revocation.dependents(serial).await
    }

    pub async fn revoke_with_dependents(
        &self,
        serial: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<CertificateView>> {
        self.revocation
            .revoke_with_dependents(serial, reason, at)
            .await
    }

    pub async fn verify_validity_at(
        &self,
        serial: &str,
        at: DateTime<Utc>,
    ) -> Result<ValidityOutcome> {
        self.verifier.verify_validity_at(serial, at).await
    }

    pub async fn verify_signature(
        &self,
        payload: &str,
        signature: &str,
        serial: &str,
    ) -> Result<bool> {
        self.verifier
            .verify_signature_by_serial(payload, signature, serial)
            .await
    }

    pub async fn verify_record(
        &self,
        record: &SignableRecord,
        signed: &RecordSignature,
    ) -> Result<RecordCheck> {
        self.signer.verify_record(record, signed).await
    }

    pub async fn lookup(&self, serial: &str) -> Result<Option<CertificateView>> {
        self.verifier.lookup(serial).await
    }

    /// Public views of all certificates, oldest first.
    pub async fn list_certificates(&self) -> Result<Vec<CertificateView>> {
        Ok(self
            .store
            .find_all()
            .await?
            .iter()
            .map(Certificate::view)
            .collect())
    }

    pub async fn statistics(&self) -> Result<PkiStatistics> {
        PkiStatistics::collect(self.store.as_ref(), self.clock.now(), self.audit.len().await).await
    }
}
