pub mod armor;
pub mod keys;

pub use keys::{KeyMaterial, SecretPem};
