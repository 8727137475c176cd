use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use secrecy::ExposeSecret;
use std::sync::Arc;

use logbook_pki::clock::ManualClock;
use logbook_pki::audit::AuditAction;
use logbook_pki::pki::{
    CertificateKind, ClubIdentity, InMemoryCertificateStore, InvalidReason, PersonIdentity,
    RangeIdentity, ValidityOutcome, Verdict,
};
use logbook_pki::signing::SignableRecord;
use logbook_pki::{LogbookPki, PkiConfig, PkiError};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap()
}

async fn hierarchy() -> (LogbookPki, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let pki = LogbookPki::new(
        Arc::new(InMemoryCertificateStore::new()),
        clock.clone(),
        PkiConfig::default(),
    )
    .await
    .unwrap();
    (pki, clock)
}

fn club_a() -> ClubIdentity {
    ClubIdentity {
        id: 1,
        name: "Club A".to_string(),
    }
}

fn alice() -> PersonIdentity {
    PersonIdentity {
        id: 42,
        full_name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
    }
}

fn range_record() -> SignableRecord {
    SignableRecord {
        shooter_identity: Some("alice@example.com".to_string()),
        date: NaiveDate::from_ymd_opt(2024, 5, 1),
        discipline_code: Some("K-1".to_string()),
        range_name: Some("Range X".to_string()),
        result_text: Some("285 Ringe".to_string()),
        supervisor_identity: Some("alice@example.com".to_string()),
    }
}

fn verdict(outcome: &ValidityOutcome) -> &Verdict {
    outcome.verdict().expect("certificate should be found")
}

#[tokio::test]
async fn club_revocation_invalidates_supervisor_after_the_fact_only() {
    let (pki, clock) = hierarchy().await;

    let t1 = clock.advance(Duration::hours(1));
    let club = pki.issue_club_certificate(&club_a()).await.unwrap();
    assert_eq!(club.valid_from, t1);
    assert_eq!(club.valid_until, None);

    clock.advance(Duration::hours(1));
    let supervisor = pki
        .issue_supervisor_certificate(&alice(), &club_a())
        .await
        .unwrap();
    assert_eq!(supervisor.parent_serial.as_deref(), Some(club.serial_number.as_str()));

    let t3 = clock.advance(Duration::hours(1));
    let signed = pki.sign(&range_record(), &supervisor).await.unwrap();
    assert_eq!(
        signed.payload,
        "alice@example.com|2024-05-01|K-1|Range X|285 Ringe|alice@example.com"
    );
    assert!(
        pki.verify_signature(&signed.payload, &signed.signature, &supervisor.serial_number)
            .await
            .unwrap()
    );

    let t4 = clock.advance(Duration::hours(1));
    pki.revoke(&club.serial_number, "dissolved", t4).await.unwrap();
    let t5 = clock.advance(Duration::hours(1));

    let at_signing = pki
        .verify_validity_at(&supervisor.serial_number, t3)
        .await
        .unwrap();
    assert_eq!(verdict(&at_signing), &Verdict::Valid);

    let after = pki
        .verify_validity_at(&supervisor.serial_number, t5)
        .await
        .unwrap();
    assert_eq!(
        verdict(&after),
        &Verdict::Invalid(vec![InvalidReason::AncestorInvalid])
    );

    // the supervisor itself carries no revocation mark
    let listed = pki.list_certificates().await.unwrap();
    let stored = listed
        .iter()
        .find(|c| c.serial_number == supervisor.serial_number)
        .unwrap();
    assert!(!stored.revoked);

    // the signature itself stays cryptographically valid
    assert!(
        pki.verify_record(&range_record(), &signed)
            .await
            .unwrap()
            .is_authentic()
    );
    assert!(pki.audit().verify_integrity().await.is_ok());
}

#[tokio::test]
async fn revocation_splits_the_timeline() {
    let (pki, clock) = hierarchy().await;
    pki.issue_club_certificate(&club_a()).await.unwrap();
    let supervisor = pki
        .issue_supervisor_certificate(&alice(), &club_a())
        .await
        .unwrap();

    let revoked_at = clock.advance(Duration::days(30));
    pki.revoke(&supervisor.serial_number, "left the club", revoked_at)
        .await
        .unwrap();

    for before in [t0(), revoked_at - Duration::days(1), revoked_at - Duration::seconds(1)] {
        let outcome = pki
            .verify_validity_at(&supervisor.serial_number, before)
            .await
            .unwrap();
        assert!(outcome.is_valid(), "expected valid at {}", before);
    }
    for after in [revoked_at, revoked_at + Duration::seconds(1), revoked_at + Duration::days(400)] {
        let outcome = pki
            .verify_validity_at(&supervisor.serial_number, after)
            .await
            .unwrap();
        assert_eq!(
            verdict(&outcome),
            &Verdict::Invalid(vec![InvalidReason::Revoked]),
            "expected revoked at {}",
            after
        );
    }

    let again = pki
        .revoke(&supervisor.serial_number, "twice", revoked_at + Duration::days(1))
        .await;
    assert!(matches!(again, Err(PkiError::AlreadyRevoked(_))));
}

#[tokio::test]
async fn one_active_club_certificate_at_a_time() {
    let (pki, clock) = hierarchy().await;
    let first = pki.issue_club_certificate(&club_a()).await.unwrap();

    let duplicate = pki.issue_club_certificate(&club_a()).await;
    assert!(matches!(
        duplicate,
        Err(PkiError::DuplicateActiveCertificate { kind: CertificateKind::Club, .. })
    ));

    let at = clock.advance(Duration::days(1));
    pki.revoke(&first.serial_number, "key rollover", at).await.unwrap();
    let second = pki.issue_club_certificate(&club_a()).await.unwrap();
    assert_ne!(first.serial_number, second.serial_number);

    let stats = pki.statistics().await.unwrap();
    assert_eq!(stats.counts(CertificateKind::Club).active, 1);
    assert_eq!(stats.counts(CertificateKind::Club).revoked, 1);
}

#[tokio::test]
async fn any_changed_field_breaks_the_signature() {
    let (pki, _clock) = hierarchy().await;
    pki.issue_club_certificate(&club_a()).await.unwrap();
    let supervisor = pki
        .issue_supervisor_certificate(&alice(), &club_a())
        .await
        .unwrap();
    let signed = pki.sign(&range_record(), &supervisor).await.unwrap();

    let tampered = [
        SignableRecord {
            shooter_identity: Some("mallory@example.com".to_string()),
            ..range_record()
        },
        SignableRecord {
            date: NaiveDate::from_ymd_opt(2024, 5, 2),
            ..range_record()
        },
        SignableRecord {
            discipline_code: Some("K-2".to_string()),
            ..range_record()
        },
        SignableRecord {
            range_name: None,
            ..range_record()
        },
        SignableRecord {
            result_text: Some("295 Ringe".to_string()),
            ..range_record()
        },
        SignableRecord {
            supervisor_identity: Some("bob@example.com".to_string()),
            ..range_record()
        },
    ];
    for record in tampered {
        let payload = record.canonical_payload();
        assert!(
            !pki.verify_signature(&payload, &signed.signature, &supervisor.serial_number)
                .await
                .unwrap(),
            "signature accepted for {}",
            payload
        );
    }
}

#[tokio::test]
async fn range_supervisor_without_club_chains_to_root() {
    let (pki, _clock) = hierarchy().await;
    let range = RangeIdentity {
        id: 9,
        name: "Public Range".to_string(),
        club: None,
    };
    let cert = pki
        .issue_range_supervisor_certificate(&alice(), &range)
        .await
        .unwrap();
    assert_eq!(cert.parent_serial.as_deref(), Some(pki.root().serial_number.as_str()));

    let outcome = pki.verify_validity_at(&cert.serial_number, t0()).await.unwrap();
    let ValidityOutcome::Found(report) = outcome else {
        panic!("range supervisor certificate not found");
    };
    assert_eq!(report.verdict, Verdict::Valid);
    assert_eq!(report.chain.len(), 2);
    assert!(report.chain_complete);
}

#[tokio::test]
async fn unknown_and_blank_serials_are_not_found() {
    let (pki, _clock) = hierarchy().await;
    for serial in ["", "   ", "does-not-exist"] {
        let outcome = pki.verify_validity_at(serial, t0()).await.unwrap();
        assert_eq!(outcome, ValidityOutcome::NotFound);
    }
}

#[tokio::test]
async fn published_certificates_carry_no_private_key() {
    let (pki, _clock) = hierarchy().await;
    pki.issue_club_certificate(&club_a()).await.unwrap();
    let supervisor = pki
        .issue_supervisor_certificate(&alice(), &club_a())
        .await
        .unwrap();

    let listing = serde_json::to_string(&pki.list_certificates().await.unwrap()).unwrap();
    let report = serde_json::to_string(
        &pki.verify_validity_at(&supervisor.serial_number, t0())
            .await
            .unwrap(),
    )
    .unwrap();
    let pem = supervisor.view().to_pem().unwrap();
    for published in [&listing, &report, &pem] {
        assert!(!published.to_lowercase().contains("private"), "{}", published);
        assert!(!published.contains(supervisor.private_material().expose_secret()));
    }

    let debug = format!("{:?}", supervisor);
    assert!(!debug.contains(supervisor.private_material().expose_secret()));
}

#[tokio::test]
async fn every_lifecycle_path_is_audited() {
    let (pki, clock) = hierarchy().await;
    assert_eq!(pki.audit().len().await, 1);

    let first = pki
        .ensure_supervisor_certificate(&alice(), &club_a())
        .await
        .unwrap();
    let club = pki.ensure_club_certificate(&club_a()).await.unwrap();
    assert_eq!(pki.audit().len().await, 3);

    let second = pki
        .reissue_supervisor_certificate(&alice(), &club_a(), "handover")
        .await
        .unwrap();
    assert_ne!(first.serial_number, second.serial_number);
    assert_eq!(pki.audit().len().await, 5);

    let dependents = pki.dependents(&club.serial_number).await.unwrap();
    assert_eq!(dependents.len(), 2);

    let at = clock.advance(Duration::days(1));
    let cascaded = pki
        .revoke_with_dependents(&club.serial_number, "dissolved", at)
        .await
        .unwrap();
    // the club and the active supervisor; the reissued-away one was already revoked
    assert_eq!(cascaded.len(), 2);

    let actions: Vec<AuditAction> = pki.audit().entries().await.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::RootBootstrapped,
            AuditAction::CertificateIssued,
            AuditAction::CertificateIssued,
            AuditAction::CertificateRevoked,
            AuditAction::CertificateIssued,
            AuditAction::CertificateRevoked,
            AuditAction::CertificateRevoked,
        ]
    );
    assert!(pki.audit().verify_integrity().await.is_ok());
    assert_eq!(pki.statistics().await.unwrap().audit_entries, 7);
}
