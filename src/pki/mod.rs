pub mod ca;
pub mod certificate;
pub mod identity;
pub mod issuer;
pub mod revocation;
pub mod store;
pub mod verification;

pub use ca::CertificateAuthority;
pub use certificate::{Certificate, CertificateKind, CertificateView, OwnerRef};
pub use identity::{ClubIdentity, PersonIdentity, RangeIdentity};
pub use issuer::CertificateIssuer;
pub use revocation::RevocationManager;
pub use store::{CertificateStore, InMemoryCertificateStore};
pub use verification::{InvalidReason, ValidityOutcome, Verdict, VerificationEngine};
