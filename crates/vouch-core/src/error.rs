//! Error types for the Vouch scoring pipeline.
//!
//! One enum per external collaborator. Most of these never cross the scoring
//! boundary: callers degrade them to neutral values (empty feature group,
//! rule-based fallback, zero penalty, tier 0). Persistence and write errors
//! are the ones that surface to the caller of a recalculation.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("activity feed unavailable: {0}")] Unavailable(String),
    #[error("malformed activity record: {0}")] Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("invalid record {hash}: {reason}")] InvalidRecord { hash: String, reason: String },
    #[error("sub-extractor {0} produced a non-finite value")] NonFinite(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend: {0}")] Backend(String),
    #[error("codec: {0}")] Codec(String),
    #[error("missing column family: {0}")] MissingColumnFamily(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("no model loaded")] NotLoaded,
    #[error("failed to load model {version}: {reason}")] LoadFailed { version: String, reason: String },
    #[error("inference failed: {0}")] Inference(String),
    #[error("invalid model output: {0}")] InvalidOutput(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")] Unavailable(String),
    #[error("insufficient price history: have {have}, need {need}")] InsufficientHistory { have: usize, need: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error("staking lookup unavailable: {0}")] Unavailable(String),
    #[error("invalid staking tier: {0}")] InvalidTier(u8),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("write rejected: {0}")] Rejected(String),
    #[error("writer unavailable: {0}")] Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")] Load(String),
    #[error("invalid configuration: {0}")] Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")] Empty,
    #[error("invalid character: {0:?}")] InvalidCharacter(char),
    #[error("invalid hex address")] InvalidHex,
}

#[derive(Error, Debug)]
pub enum VouchError {
    #[error(transparent)] Feed(#[from] FeedError),
    #[error(transparent)] Extraction(#[from] ExtractionError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Model(#[from] ModelError),
    #[error(transparent)] Oracle(#[from] OracleError),
    #[error(transparent)] Staking(#[from] StakingError),
    #[error(transparent)] Write(#[from] WriteError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error("scoring task failed: {0}")] Task(String),
}
