// Durability Module
// File sync helpers and checkpoint snapshots

pub mod fsync;
pub mod snapshot;

pub use fsync::*;
pub use snapshot::*;
