//! Identity data supplied by the surrounding member/club/range domain.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClubIdentity {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonIdentity {
    pub id: u64,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeIdentity {
    pub id: u64,
    pub name: String,
    /// Owning club, if the range belongs to one.
    pub club: Option<ClubIdentity>,
}
