pub mod payload;
pub mod service;

pub use payload::SignableRecord;
pub use service::{RecordCheck, RecordSignature, SigningService};
