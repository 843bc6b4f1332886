//! # vouch-store: Persistence for features, scores, history and the
//! scheduler cursor.
//!
//! Both stores implement every persistence trait from
//! [`vouch_core::traits`]: [`RocksStore`] for a node's data directory and
//! [`MemoryStore`] for tests and one-shot CLI runs.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;
