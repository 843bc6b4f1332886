//! # vouch-engine
//! Orchestration for the Vouch pipeline: configuration, the recalculation
//! gate, per-address write serialization, the scoring service, batch runs
//! and the periodic scheduler.

pub mod batch;
pub mod clock;
pub mod config;
pub mod gate;
pub mod locks;
pub mod scheduler;
pub mod service;
pub mod volatility;

#[cfg(test)]
mod testkit;

pub use batch::BatchOutcome;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use gate::{Freshness, RecalculationGate, StaleReason, WriteDecision};
pub use locks::AddressLocks;
pub use scheduler::{PassSummary, Scheduler};
pub use service::{Collaborators, RecalcReport, RecalcStatus, ScoringService, WriteStatus};
pub use volatility::VolatilityCache;
