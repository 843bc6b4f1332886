//! # vouch-core
//! Foundation types, error taxonomy and collaborator traits for the Vouch
//! credit-scoring pipeline.

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
