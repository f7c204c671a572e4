// Transaction System Module
// Buffered overlay transactions committed through the engine

pub mod transaction;
pub mod types;

pub use transaction::*;
pub use types::*;
