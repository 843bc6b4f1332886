//! Integration test suite for Vouch.
//!
//! Drives the full pipeline (features, scoring, persistence, gate, writer)
//! through in-memory and RocksDB-backed collaborators.

pub mod helpers;
