//! WalKV Core
//!
//! An embedded, single-node key-value store. Mutations are made durable in a
//! write-ahead log before they reach the in-memory index, short-lived
//! transactions buffer writes in a private overlay, and checkpoints fold the
//! log into a snapshot so it can be truncated safely.

pub mod config;
pub mod durability;
pub mod engine;
pub mod error;
pub mod index;
pub mod logging;
pub mod transaction;
pub mod wal;

pub use config::{ConfigBuilder, EngineConfig, LoggingConfig};
pub use engine::{Engine, EngineStats};
pub use error::{Error, Result};
pub use index::Index;
pub use transaction::{IsolationLevel, Transaction, TransactionId, TransactionState};
pub use wal::{RecoveryReport, ReplayStats};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
