//! Canonical signing payload for logbook entries.
//!
//! Field order is fixed:
//!
//! ```text
//! shooter | yyyy-mm-dd | discipline | range | result | supervisor
//! ```
//!
//! Absent fields become empty strings and fields are joined with a literal
//! `|`, without escaping. Every stored signature depends on this exact byte
//! sequence; changing it breaks all existing signatures.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const FIELD_DELIMITER: &str = "|";

/// Business fields of a logbook entry that go into the signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignableRecord {
    pub shooter_identity: Option<String>,
    pub date: Option<NaiveDate>,
    pub discipline_code: Option<String>,
    pub range_name: Option<String>,
    pub result_text: Option<String>,
    pub supervisor_identity: Option<String>,
}

impl SignableRecord {
    pub fn canonical_payload(&self) -> String {
        let date = self
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        [
            self.shooter_identity.as_deref().unwrap_or(""),
            date.as_str(),
            self.discipline_code.as_deref().unwrap_or(""),
            self.range_name.as_deref().unwrap_or(""),
            self.result_text.as_deref().unwrap_or(""),
            self.supervisor_identity.as_deref().unwrap_or(""),
        ]
        .join(FIELD_DELIMITER)
    }
}
