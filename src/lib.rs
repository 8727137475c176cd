//! Certificate hierarchy for attesting supervised shooting logbook entries.
//!
//! A single self-issued ROOT issues CLUB certificates; clubs issue
//! SUPERVISOR certificates; ranges get RANGE_SUPERVISOR certificates under
//! their club or directly under ROOT. Supervisors sign a canonical payload
//! built from each entry, and any third party can later ask whether the
//! signing certificate (and its whole chain) was valid at a given instant.

pub mod audit;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod pki;
pub mod signing;
pub mod system;

pub use config::{PkiConfig, ValidityPolicy};
pub use error::{PkiError, Result};
pub use system::LogbookPki;
