//! # vouch-features: Wallet feature extraction and caching.
//!
//! - [`extractor::FeatureExtractor`] turns an activity feed into a flat,
//!   name-ordered feature map using seven independent sub-extractors. A
//!   failing sub-extractor contributes nothing; it never aborts extraction.
//! - [`store::FeatureStore`] keeps the latest map per `(address, version)` in
//!   a TTL cache in front of a persistent [`FeatureKvStore`](vouch_core::traits::FeatureKvStore).

pub mod extractor;
pub mod groups;
pub mod store;

pub use extractor::{FeatureExtractor, extract_from_records};
pub use store::{FeatureSource, FeatureStore};
