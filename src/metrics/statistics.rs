use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{PkiError, Result};
use crate::pki::{CertificateKind, CertificateStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub active: usize,
    pub revoked: usize,
}

impl KindCounts {
    pub fn total(&self) -> usize {
        self.active + self.revoked
    }
}

/// Snapshot of the certificate population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkiStatistics {
    pub timestamp: DateTime<Utc>,
    pub by_kind: BTreeMap<String, KindCounts>,
    /// Active certificates whose window has closed.
    pub expired: usize,
    pub audit_entries: usize,
}

impl PkiStatistics {
    pub async fn collect(
        store: &dyn CertificateStore,
        at: DateTime<Utc>,
        audit_entries: usize,
    ) -> Result<Self> {
        let mut by_kind: BTreeMap<String, KindCounts> = CertificateKind::all()
            .iter()
            .map(|k| (k.as_str().to_string(), KindCounts::default()))
            .collect();
        let mut expired = 0;

        for cert in store.find_all().await? {
            let counts = by_kind.entry(cert.kind.as_str().to_string()).or_default();
            if cert.revoked {
                counts.revoked += 1;
            } else {
                counts.active += 1;
                if !cert.in_window(at) {
                    expired += 1;
                }
            }
        }

        Ok(Self {
            timestamp: at,
            by_kind,
            expired,
            audit_entries,
        })
    }

    pub fn total(&self) -> usize {
        self.by_kind.values().map(KindCounts::total).sum()
    }

    pub fn total_revoked(&self) -> usize {
        self.by_kind.values().map(|c| c.revoked).sum()
    }

    pub fn counts(&self, kind: CertificateKind) -> KindCounts {
        self.by_kind.get(kind.as_str()).copied().unwrap_or_default()
    }

    pub fn print_report(&self) {
        println!();
        for line in self.report_lines() {
            println!("{}", line);
        }
        println!();
    }

    fn report_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "╔═══════════════════════════════════════════════════════╗".to_string(),
            "║            Certificate Hierarchy Report               ║".to_string(),
            "╠═══════════════════════════════════════════════════════╣".to_string(),
            format!("║ Timestamp: {:<42} ║", self.timestamp.to_rfc3339()),
            "║                                                       ║".to_string(),
        ];
        for (kind, counts) in &self.by_kind {
            lines.push(format!(
                "║ {:<18} active: {:<6} revoked: {:<10} ║",
                kind, counts.active, counts.revoked
            ));
        }
        lines.push("║                                                       ║".to_string());
        lines.push(format!("║ Total certificates: {:<33} ║", self.total()));
        lines.push(format!("║ Expired (not revoked): {:<30} ║", self.expired));
        lines.push(format!("║ Audit ledger entries: {:<31} ║", self.audit_entries));
        lines.push("╚═══════════════════════════════════════════════════════╝".to_string());
        lines
    }

    /// Append one row per snapshot; writes the header on first use.
    pub fn save_to_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file_exists = path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PkiError::Serialization(e.to_string()))?;

        let mut wtr = csv::Writer::from_writer(file);
        let kinds: Vec<CertificateKind> = CertificateKind::all().to_vec();

        if !file_exists {
            let mut header = vec!["timestamp".to_string()];
            for kind in &kinds {
                header.push(format!("{}_active", kind.as_str().to_lowercase()));
                header.push(format!("{}_revoked", kind.as_str().to_lowercase()));
            }
            header.push("expired".to_string());
            header.push("audit_entries".to_string());
            wtr.write_record(&header)?;
        }

        let mut row = vec![self.timestamp.to_rfc3339()];
        for kind in &kinds {
            let counts = self.counts(*kind);
            row.push(counts.active.to_string());
            row.push(counts.revoked.to_string());
        }
        row.push(self.expired.to_string());
        row.push(self.audit_entries.to_string());
        wtr.write_record(&row)?;

        wtr.flush()
            .map_err(|e| PkiError::Serialization(e.to_string()))?;
        Ok(())
    }
}
