pub mod entry;
pub mod ledger;

pub use entry::{AuditAction, AuditEntry};
pub use ledger::AuditLedger;
