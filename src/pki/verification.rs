//! Point-in-time certificate validity and raw signature checks.
//!
//! A verdict is computed only from stored certificate fields and the
//! reference instant, never from "now", so any verifier reaches the same
//! answer for the same store contents.

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use log::{debug, info};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::certificate::{Certificate, CertificateKind, CertificateView};
use super::store::CertificateStore;
use crate::crypto::keys;
use crate::error::Result;

/// ROOT -> CLUB -> SUPERVISOR is the deepest legal chain; one extra step
/// lets a malformed chain be reported instead of looping.
const MAX_CHAIN_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidReason {
    ExpiredOrNotYetValid,
    Revoked,
    AncestorInvalid,
    /// The issuer signature does not verify under the parent's key, or the
    /// issuer name does not match the parent's subject.
    IssuerSignatureInvalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reasons", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Valid,
    Invalid(Vec<InvalidReason>),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    pub fn has_reason(&self, reason: InvalidReason) -> bool {
        match self {
            Verdict::Valid => false,
            Verdict::Invalid(reasons) => reasons.contains(&reason),
        }
    }
}

/// Evaluation of one certificate in the chain, leaf first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub serial_number: String,
    pub kind: CertificateKind,
    pub subject: String,
    pub in_window: bool,
    pub not_revoked: bool,
    pub issuer_signature_valid: bool,
}

impl ChainLink {
    fn passes(&self) -> bool {
        self.in_window && self.not_revoked && self.issuer_signature_valid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub certificate: CertificateView,
    pub reference_instant: DateTime<Utc>,
    pub verdict: Verdict,
    pub chain: Vec<ChainLink>,
    /// False when a parent was missing or the walk hit the depth limit.
    pub chain_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidityOutcome {
    NotFound,
    Found(Box<VerificationReport>),
}

impl ValidityOutcome {
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            ValidityOutcome::NotFound => None,
            ValidityOutcome::Found(report) => Some(&report.verdict),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.verdict().is_some_and(Verdict::is_valid)
    }
}

pub struct VerificationEngine {
    store: Arc<dyn CertificateStore>,
    key_cache: Mutex<LruCache<String, VerifyingKey>>,
}

impl VerificationEngine {
    pub fn new(store: Arc<dyn CertificateStore>, key_cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(key_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            key_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Was `serial` valid at `at`? Blank or unknown serials are `NotFound`.
    pub async fn verify_validity_at(
        &self,
        serial: &str,
        at: DateTime<Utc>,
    ) -> Result<ValidityOutcome> {
        let serial = serial.trim();
        if serial.is_empty() {
            debug!("Verification requested with blank serial");
            return Ok(ValidityOutcome::NotFound);
        }

        let Some(leaf) = self.store.find_by_serial(serial).await? else {
            info!("Verification of unknown serial {}", serial);
            return Ok(ValidityOutcome::NotFound);
        };

        let mut chain = Vec::new();
        let mut chain_complete = false;
        let mut current = leaf.clone();
        while chain.len() < MAX_CHAIN_DEPTH {
            let parent = match &current.parent_serial {
                Some(parent_serial) => self.store.find_by_serial(parent_serial).await?,
                None => None,
            };

            let issuer_signature_valid = match (&current.parent_serial, &parent) {
                // self-issued: only a ROOT may be, and it must verify under its own key
                (None, _) => {
                    current.kind == CertificateKind::Root
                        && current.issuer == current.subject
                        && self.issuer_signature_matches(&current, &current).await
                }
                (Some(_), Some(parent)) => {
                    current.issuer == parent.subject
                        && self.issuer_signature_matches(&current, parent).await
                }
                (Some(_), None) => false,
            };

            chain.push(ChainLink {
                serial_number: current.serial_number.clone(),
                kind: current.kind,
                subject: current.subject.clone(),
                in_window: current.in_window(at),
                not_revoked: current.not_revoked_at(at),
                issuer_signature_valid,
            });

            match (current.parent_serial.is_some(), parent) {
                (false, _) => {
                    chain_complete = true;
                    break;
                }
                (true, Some(parent)) => current = parent,
                (true, None) => break,
            }
        }

        let verdict = judge(&chain, chain_complete);
        info!(
            "Verified {} at {}: {:?}",
            leaf.serial_number, at, verdict
        );

        Ok(ValidityOutcome::Found(Box::new(VerificationReport {
            certificate: leaf.view(),
            reference_instant: at,
            verdict,
            chain,
            chain_complete,
        })))
    }

    /// Was `signature` (hex) produced over `payload` by the key in
    /// `certificate`? Independent of validity and revocation.
    pub async fn verify_signature(
        &self,
        payload: &str,
        signature: &str,
        certificate: &CertificateView,
    ) -> bool {
        let Ok(signature) = hex::decode(signature.trim()) else {
            return false;
        };
        match self.verifying_key(&certificate.public_material).await {
            Some(key) => keys::verify_with_key(&key, payload.as_bytes(), &signature),
            None => false,
        }
    }

    /// Like [`Self::verify_signature`], looking the certificate up by serial.
    /// Unknown serials verify as false.
    pub async fn verify_signature_by_serial(
        &self,
        payload: &str,
        signature: &str,
        serial: &str,
    ) -> Result<bool> {
        match self.store.find_by_serial(serial.trim()).await? {
            Some(cert) => Ok(self.verify_signature(payload, signature, &cert.view()).await),
            None => Ok(false),
        }
    }

    /// Public view of a certificate for display, if it exists.
    pub async fn lookup(&self, serial: &str) -> Result<Option<CertificateView>> {
        let serial = serial.trim();
        if serial.is_empty() {
            return Ok(None);
        }
        Ok(self.store.find_by_serial(serial).await?.map(|c| c.view()))
    }

    pub async fn cached_keys(&self) -> usize {
        self.key_cache.lock().await.len()
    }

    async fn issuer_signature_matches(&self, cert: &Certificate, issuer: &Certificate) -> bool {
        let Ok(signature) = hex::decode(&cert.issuer_signature) else {
            return false;
        };
        let Ok(tbs) = cert.tbs_bytes() else {
            return false;
        };
        match self.verifying_key(&issuer.public_material).await {
            Some(key) => keys::verify_with_key(&key, &tbs, &signature),
            None => false,
        }
    }

    async fn verifying_key(&self, public_material: &str) -> Option<VerifyingKey> {
        let mut cache = self.key_cache.lock().await;
        if let Some(key) = cache.get(public_material) {
            return Some(*key);
        }
        let key = keys::decode_public_pem(public_material).ok()?;
        cache.put(public_material.to_string(), key);
        Some(key)
    }
}

fn judge(chain: &[ChainLink], chain_complete: bool) -> Verdict {
    let mut reasons = Vec::new();
    if let Some(leaf) = chain.first() {
        if !leaf.in_window {
            reasons.push(InvalidReason::ExpiredOrNotYetValid);
        }
        if !leaf.not_revoked {
            reasons.push(InvalidReason::Revoked);
        }
        if !leaf.issuer_signature_valid {
            reasons.push(InvalidReason::IssuerSignatureInvalid);
        }
    }

    let ancestors_ok = chain.iter().skip(1).all(ChainLink::passes);
    if !ancestors_ok || !chain_complete {
        reasons.push(InvalidReason::AncestorInvalid);
    }

    if reasons.is_empty() {
        Verdict::Valid
    } else {
        Verdict::Invalid(reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use crate::audit::AuditLedger;
    use crate::clock::{Clock, ManualClock};
    use crate::config::PkiConfig;
    use crate::pki::ca::CertificateAuthority;
    use crate::pki::identity::{ClubIdentity, PersonIdentity};
    use crate::pki::issuer::CertificateIssuer;
    use crate::pki::revocation::RevocationManager;
    use crate::pki::store::InMemoryCertificateStore;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        store: Arc<InMemoryCertificateStore>,
        clock: Arc<ManualClock>,
        engine: VerificationEngine,
        revocation: RevocationManager,
        root: Certificate,
        club: Certificate,
        supervisor: Certificate,
    }

    async fn fixture(config: PkiConfig) -> Fixture {
        let store = Arc::new(InMemoryCertificateStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let config = Arc::new(config);
        let audit = AuditLedger::new();
        let authority = Arc::new(
            CertificateAuthority::bootstrap(store.as_ref(), clock.as_ref(), &config, &audit)
                .await
                .unwrap(),
        );
        let issuer = CertificateIssuer::new(
            store.clone(),
            authority.clone(),
            clock.clone(),
            config,
            audit.clone(),
        );

        let club_id = ClubIdentity {
            id: 1,
            name: "Club A".to_string(),
        };
        clock.advance(Duration::days(1));
        let club = issuer.issue_club_certificate(&club_id).await.unwrap();
        clock.advance(Duration::days(1));
        let supervisor = issuer
            .issue_supervisor_certificate(
                &PersonIdentity {
                    id: 10,
                    full_name: "Alice".to_string(),
                    email: "alice@example.com".to_string(),
                },
                &club_id,
            )
            .await
            .unwrap();

        Fixture {
            engine: VerificationEngine::new(store.clone(), 16),
            revocation: RevocationManager::new(store.clone(), audit),
            root: authority.root_for_signing().clone(),
            store,
            clock,
            club,
            supervisor,
        }
    }

    #[tokio::test]
    async fn fresh_chain_is_valid() {
        let f = fixture(PkiConfig::default()).await;
        let outcome = f
            .engine
            .verify_validity_at(&f.supervisor.serial_number, f.clock.now())
            .await
            .unwrap();
        let ValidityOutcome::Found(report) = outcome else {
            panic!("supervisor certificate not found");
        };
        assert_eq!(report.verdict, Verdict::Valid);
        assert!(report.chain_complete);
        let kinds: Vec<CertificateKind> = report.chain.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CertificateKind::Supervisor,
                CertificateKind::Club,
                CertificateKind::Root
            ]
        );
    }

    #[tokio::test]
    async fn unknown_and_blank_serials_are_not_found() {
        let f = fixture(PkiConfig::default()).await;
        let now = f.clock.now();
        assert_eq!(
            f.engine.verify_validity_at("deadbeef", now).await.unwrap(),
            ValidityOutcome::NotFound
        );
        assert_eq!(
            f.engine.verify_validity_at("   ", now).await.unwrap(),
            ValidityOutcome::NotFound
        );
        assert!(f.engine.lookup("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn serial_is_trimmed() {
        let f = fixture(PkiConfig::default()).await;
        let padded = format!("  {}\n", f.club.serial_number);
        assert!(
            f.engine
                .verify_validity_at(&padded, f.clock.now())
                .await
                .unwrap()
                .is_valid()
        );
    }

    #[tokio::test]
    async fn before_valid_from_is_not_yet_valid() {
        let f = fixture(PkiConfig::default()).await;
        let outcome = f
            .engine
            .verify_validity_at(&f.supervisor.serial_number, f.supervisor.valid_from - Duration::seconds(1))
            .await
            .unwrap();
        let verdict = outcome.verdict().unwrap();
        assert!(verdict.has_reason(InvalidReason::ExpiredOrNotYetValid));
        assert!(!verdict.has_reason(InvalidReason::Revoked));
    }

    #[tokio::test]
    async fn fixed_term_expiry() {
        let f = fixture(PkiConfig {
            validity: crate::config::ValidityPolicy::fixed_term(),
            ..PkiConfig::default()
        })
        .await;
        let until = f.supervisor.valid_until.unwrap();
        assert!(
            f.engine
                .verify_validity_at(&f.supervisor.serial_number, until)
                .await
                .unwrap()
                .is_valid()
        );
        let after = f
            .engine
            .verify_validity_at(&f.supervisor.serial_number, until + Duration::seconds(1))
            .await
            .unwrap();
        assert!(
            after
                .verdict()
                .unwrap()
                .has_reason(InvalidReason::ExpiredOrNotYetValid)
        );
    }

    #[tokio::test]
    async fn revocation_is_monotonic_in_time() {
        let f = fixture(PkiConfig::default()).await;
        let t0 = f.clock.advance(Duration::days(30));
        f.revocation
            .revoke(&f.supervisor.serial_number, "left club", t0)
            .await
            .unwrap();

        for offset in [-86_400i64, -1] {
            let at = t0 + Duration::seconds(offset);
            assert!(
                f.engine
                    .verify_validity_at(&f.supervisor.serial_number, at)
                    .await
                    .unwrap()
                    .is_valid(),
                "expected valid at {at}"
            );
        }
        for offset in [0i64, 1, 86_400 * 365] {
            let at = t0 + Duration::seconds(offset);
            let outcome = f
                .engine
                .verify_validity_at(&f.supervisor.serial_number, at)
                .await
                .unwrap();
            assert_eq!(
                outcome.verdict(),
                Some(&Verdict::Invalid(vec![InvalidReason::Revoked]))
            );
        }
    }

    #[tokio::test]
    async fn revoked_club_invalidates_supervisor_without_cascade() {
        let f = fixture(PkiConfig::default()).await;
        let t3 = f.clock.advance(Duration::days(1));
        let t4 = f.clock.advance(Duration::days(1));
        f.revocation
            .revoke(&f.club.serial_number, "dissolved", t4)
            .await
            .unwrap();

        let stored = f
            .store
            .find_by_serial(&f.supervisor.serial_number)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.revoked);

        assert!(
            f.engine
                .verify_validity_at(&f.supervisor.serial_number, t3)
                .await
                .unwrap()
                .is_valid()
        );
        let later = f
            .engine
            .verify_validity_at(&f.supervisor.serial_number, t4 + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(
            later.verdict(),
            Some(&Verdict::Invalid(vec![InvalidReason::AncestorInvalid]))
        );
    }

    #[tokio::test]
    async fn legacy_revocation_without_timestamp_is_permanent() {
        let f = fixture(PkiConfig::default()).await;
        let mut legacy = f.club.clone();
        legacy.serial_number = "legacy".to_string();
        legacy.owner = crate::pki::certificate::OwnerRef::Club { club_id: 99 };
        legacy.revoked = true;
        legacy.revoked_at = None;
        f.store.insert_unique(legacy).await.unwrap();

        let outcome = f
            .engine
            .verify_validity_at("legacy", f.club.valid_from)
            .await
            .unwrap();
        assert!(outcome.verdict().unwrap().has_reason(InvalidReason::Revoked));
    }

    #[tokio::test]
    async fn tampered_certificate_fails_issuer_signature() {
        let f = fixture(PkiConfig::default()).await;
        let mut forged = f.supervisor.clone();
        forged.serial_number = "forged".to_string();
        forged.owner = crate::pki::certificate::OwnerRef::Supervisor {
            member_id: 666,
            club_id: 1,
        };
        forged.owner_display_name = "Mallory".to_string();
        f.store.insert_unique(forged).await.unwrap();

        let outcome = f
            .engine
            .verify_validity_at("forged", f.clock.now())
            .await
            .unwrap();
        assert_eq!(
            outcome.verdict(),
            Some(&Verdict::Invalid(vec![InvalidReason::IssuerSignatureInvalid]))
        );
    }

    #[tokio::test]
    async fn missing_parent_is_ancestor_invalid() {
        let f = fixture(PkiConfig::default()).await;
        let mut orphan = f.club.clone();
        orphan.serial_number = "orphan".to_string();
        orphan.owner = crate::pki::certificate::OwnerRef::Club { club_id: 2 };
        orphan.parent_serial = Some("nowhere".to_string());
        f.store.insert_unique(orphan).await.unwrap();

        let ValidityOutcome::Found(report) = f
            .engine
            .verify_validity_at("orphan", f.clock.now())
            .await
            .unwrap()
        else {
            panic!("orphan not found");
        };
        assert!(!report.chain_complete);
        assert!(report.verdict.has_reason(InvalidReason::AncestorInvalid));
    }

    #[tokio::test]
    async fn signature_check_is_independent_of_revocation() {
        let f = fixture(PkiConfig::default()).await;
        let keys = crate::crypto::KeyMaterial::from_private_pem(f.supervisor.private_material())
            .unwrap();
        let payload = "a|b|c|d|e|f";
        let signature = hex::encode(keys.sign(payload.as_bytes()));

        f.revocation
            .revoke(&f.supervisor.serial_number, "left club", f.clock.now())
            .await
            .unwrap();

        let view = f.supervisor.view();
        assert!(f.engine.verify_signature(payload, &signature, &view).await);
        assert!(!f.engine.verify_signature("a|b|c|d|e|g", &signature, &view).await);
        assert!(!f.engine.verify_signature(payload, "not-hex", &view).await);
        assert!(
            f.engine
                .verify_signature_by_serial(payload, &signature, &f.supervisor.serial_number)
                .await
                .unwrap()
        );
        assert!(
            !f.engine
                .verify_signature_by_serial(payload, &signature, &f.root.serial_number)
                .await
                .unwrap()
        );
        assert!(
            !f.engine
                .verify_signature_by_serial(payload, &signature, "unknown")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn report_serialization_has_no_private_field() {
        let f = fixture(PkiConfig::default()).await;
        let outcome = f
            .engine
            .verify_validity_at(&f.supervisor.serial_number, f.clock.now())
            .await
            .unwrap();
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"outcome\":\"FOUND\""));
        assert!(!json.to_lowercase().contains("private"));
        assert!(!json.contains(f.supervisor.private_material().expose_secret()));
    }

    #[tokio::test]
    async fn report_json_uses_snake_case_keys() {
        let f = fixture(PkiConfig::default()).await;
        let outcome = f
            .engine
            .verify_validity_at(&f.supervisor.serial_number, f.clock.now())
            .await
            .unwrap();
        let value = serde_json::to_value(&outcome).unwrap();

        for key in ["certificate", "reference_instant", "verdict", "chain", "chain_complete"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        let certificate = &value["certificate"];
        for key in ["serial_number", "valid_from", "valid_until", "owner_display_name", "parent_serial"] {
            assert!(certificate.get(key).is_some(), "missing certificate.{key}");
        }
        assert_eq!(certificate["owner"]["type"], "supervisor");
        assert_eq!(certificate["owner"]["member_id"], 10);
        assert!(value["chain"][0].get("issuer_signature_valid").is_some());
        assert!(value["chain"][0].get("not_revoked").is_some());
    }

    #[tokio::test]
    async fn verifying_keys_are_cached() {
        let f = fixture(PkiConfig::default()).await;
        f.engine
            .verify_validity_at(&f.supervisor.serial_number, f.clock.now())
            .await
            .unwrap();
        // issuer keys only: club (for the supervisor) and root (for club and root)
        assert_eq!(f.engine.cached_keys().await, 2);
    }
}
