use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::entry::{AuditAction, AuditEntry};
use crate::error::Result;
use crate::pki::CertificateView;

/// Append-only, hash-chained trail of issuance, revocation and signing
/// events. Each entry commits to its predecessor's hash.
#[derive(Clone, Default)]
pub struct AuditLedger {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    index: u64,
    timestamp: String,
    action: String,
    serial_number: &'a str,
    kind: &'static str,
    subject: &'a str,
    detail: &'a str,
    hash: &'a str,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(
        &self,
        action: AuditAction,
        certificate: &CertificateView,
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> AuditEntry {
        let mut entries = self.entries.write().await;
        let previous_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(AuditEntry::genesis_hash);
        let entry = AuditEntry::new(
            entries.len() as u64,
            timestamp,
            action,
            certificate.serial_number.clone(),
            certificate.kind,
            certificate.subject.clone(),
            detail,
            previous_hash,
        );
        entries.push(entry.clone());
        entry
    }

    /// Recompute every hash and link. Returns the index of the first broken
    /// entry, if any.
    pub async fn verify_integrity(&self) -> std::result::Result<(), u64> {
        let entries = self.entries.read().await;
        let mut expected_previous = AuditEntry::genesis_hash();
        for entry in entries.iter() {
            if entry.previous_hash != expected_previous || entry.hash != entry.calculate_hash() {
                warn!("Audit ledger broken at entry {}", entry.index);
                return Err(entry.index);
            }
            expected_previous = entry.hash.clone();
        }
        Ok(())
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    pub async fn entries_for(&self, serial: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.serial_number == serial)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn size_bytes(&self) -> usize {
        let entries = self.entries.read().await;
        bincode::serialize(&*entries).map(|b| b.len()).unwrap_or_default()
    }

    pub async fn export_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let entries = self.entries.read().await;
        let mut wtr = csv::Writer::from_path(path)?;
        for entry in entries.iter() {
            wtr.serialize(CsvRow {
                index: entry.index,
                timestamp: entry.timestamp.to_rfc3339(),
                action: format!("{:?}", entry.action),
                serial_number: &entry.serial_number,
                kind: entry.kind.as_str(),
                subject: &entry.subject,
                detail: entry.detail.as_deref().unwrap_or(""),
                hash: &entry.hash,
            })?;
        }
        wtr.flush()
            .map_err(|e| crate::error::PkiError::Serialization(e.to_string()))?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn tamper(&self, index: usize, subject: &str) {
        self.entries.write().await[index].subject = subject.to_string();
    }
}
