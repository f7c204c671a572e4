// Write-Ahead Log (WAL) Module
// Record codec, durable append, replay and recovery

pub mod entry;
pub mod manager;
pub mod recovery;

pub use entry::*;
pub use manager::*;
pub use recovery::*;
