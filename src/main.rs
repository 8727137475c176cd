use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use log::info;
use std::sync::Arc;

use logbook_pki::clock::ManualClock;
use logbook_pki::pki::{ClubIdentity, InMemoryCertificateStore, PersonIdentity, RangeIdentity};
use logbook_pki::signing::SignableRecord;
use logbook_pki::{LogbookPki, PkiConfig};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => PkiConfig::from_json_file(&path)?,
        None => PkiConfig::default(),
    };

    println!("\n");
    println!("╔═══════════════════════════════════════════════════════╗");
    println!("║                                                       ║");
    println!("║        Digital Shooting Logbook - Trust Chain         ║");
    println!("║                                                       ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    let t0 = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .context("invalid start instant")?;
    let clock = Arc::new(ManualClock::new(t0));
    let store = Arc::new(InMemoryCertificateStore::new());
    let pki = LogbookPki::new(store, clock.clone(), config).await?;
    println!("[1/6] Root bootstrapped");
    println!("      ✓ {} ({})\n", pki.root().subject, pki.root().serial_number);

    clock.advance(Duration::days(1));
    let club = ClubIdentity {
        id: 1,
        name: "Club A".to_string(),
    };
    let club_cert = pki.issue_club_certificate(&club).await?;
    println!("[2/6] Club certificate issued");
    println!("      ✓ {}\n", club_cert.subject);

    clock.advance(Duration::days(1));
    let alice = PersonIdentity {
        id: 7,
        full_name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
    };
    let supervisor = pki.issue_supervisor_certificate(&alice, &club).await?;
    let range = RangeIdentity {
        id: 3,
        name: "Range X".to_string(),
        club: Some(club.clone()),
    };
    let range_cert = pki.issue_range_supervisor_certificate(&alice, &range).await?;
    println!("[3/6] Supervisor certificates issued");
    println!("      ✓ {}", supervisor.subject);
    println!("      ✓ {}\n", range_cert.subject);

    let t3 = clock.advance(Duration::days(1));
    let record = SignableRecord {
        shooter_identity: Some(alice.email.clone()),
        date: NaiveDate::from_ymd_opt(2024, 1, 4),
        discipline_code: Some("K-1".to_string()),
        range_name: Some(range.name.clone()),
        result_text: Some("285 Ringe".to_string()),
        supervisor_identity: Some(alice.email.clone()),
    };
    let signed = pki.sign(&record, &supervisor).await?;
    println!("[4/6] Logbook entry signed");
    println!("      ✓ payload: {}", signed.payload);
    println!(
        "      ✓ record authentic: {}\n",
        pki.verify_record(&record, &signed).await?.is_authentic()
    );

    let t4 = clock.advance(Duration::days(1));
    pki.revoke(&club_cert.serial_number, "club dissolved", t4).await?;
    println!("[5/6] Club certificate revoked");
    println!("      ✓ {}\n", club_cert.serial_number);

    let t5 = clock.advance(Duration::days(1));
    let at_signing = pki.verify_validity_at(&supervisor.serial_number, t3).await?;
    let after_revocation = pki.verify_validity_at(&supervisor.serial_number, t5).await?;
    println!("[6/6] Point-in-time verification of the supervisor");
    println!("      ✓ at signing time: {:?}", at_signing.verdict());
    println!("      ✓ after club revocation: {:?}\n", after_revocation.verdict());

    let stats = pki.statistics().await?;
    stats.print_report();
    stats
        .save_to_csv("pki_statistics.csv")
        .context("writing statistics")?;
    pki.audit()
        .export_csv("pki_audit.csv")
        .await
        .context("writing audit ledger")?;
    if let Err(index) = pki.audit().verify_integrity().await {
        anyhow::bail!("audit ledger broken at entry {}", index);
    }

    info!("Statistics saved to pki_statistics.csv, audit ledger to pki_audit.csv");
    Ok(())
}
