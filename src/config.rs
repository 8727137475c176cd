use anyhow::Context;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PkiError, Result};
use crate::pki::certificate::CertificateKind;

const DEFAULT_KEY_CACHE_SIZE: usize = 1024;

/// Validity terms per certificate kind, in years. `None` means open-ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidityPolicy {
    pub root_years: Option<u32>,
    pub club_years: Option<u32>,
    pub supervisor_years: Option<u32>,
    pub range_supervisor_years: Option<u32>,
}

impl Default for ValidityPolicy {
    fn default() -> Self {
        Self {
            root_years: Some(20),
            club_years: None,
            supervisor_years: None,
            range_supervisor_years: None,
        }
    }
}

impl ValidityPolicy {
    /// Fixed-term policy: root 20y, club 5y, supervisors 3y.
    pub fn fixed_term() -> Self {
        Self {
            root_years: Some(20),
            club_years: Some(5),
            supervisor_years: Some(3),
            range_supervisor_years: Some(3),
        }
    }

    fn years_for(&self, kind: CertificateKind) -> Option<u32> {
        match kind {
            CertificateKind::Root => self.root_years,
            CertificateKind::Club => self.club_years,
            CertificateKind::Supervisor => self.supervisor_years,
            CertificateKind::RangeSupervisor => self.range_supervisor_years,
        }
    }

    /// End of a `kind` window opening at `from`. `Ok(None)` only for an
    /// open-ended term; a term that cannot be represented is an error.
    pub fn valid_until(
        &self,
        kind: CertificateKind,
        from: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let Some(years) = self.years_for(kind) else {
            return Ok(None);
        };
        if years == 0 {
            return Err(PkiError::InvalidValidityTerm(format!(
                "{} term must be at least one year",
                kind
            )));
        }
        years
            .checked_mul(12)
            .and_then(|months| from.checked_add_months(Months::new(months)))
            .map(Some)
            .ok_or_else(|| {
                PkiError::InvalidValidityTerm(format!(
                    "{} term of {} years from {} is out of range",
                    kind, years, from
                ))
            })
    }

    /// Check every configured term against `from`.
    pub fn validate(&self, from: DateTime<Utc>) -> Result<()> {
        for kind in CertificateKind::all() {
            self.valid_until(kind, from)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PkiConfig {
    pub organization: String,
    pub country: String,
    pub root_common_name: String,
    pub validity: ValidityPolicy,
    pub key_cache_size: usize,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            organization: "Digital Shooting Logbook".to_string(),
            country: "DE".to_string(),
            root_common_name: "Digital Shooting Logbook Root CA".to_string(),
            validity: ValidityPolicy::default(),
            key_cache_size: DEFAULT_KEY_CACHE_SIZE,
        }
    }
}

impl PkiConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: PkiConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        if config.key_cache_size == 0 {
            anyhow::bail!("key_cache_size must be greater than zero");
        }
        config
            .validity
            .validate(Utc::now())
            .with_context(|| format!("invalid validity policy in {}", path.display()))?;
        Ok(config)
    }

    pub fn root_subject(&self) -> String {
        format!(
            "CN={}, O={}, C={}",
            self.root_common_name, self.organization, self.country
        )
    }
}
