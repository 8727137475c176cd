pub mod statistics;

pub use statistics::{KindCounts, PkiStatistics};
