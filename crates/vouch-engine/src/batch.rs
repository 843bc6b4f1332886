//! Bounded-concurrency recalculation of many addresses.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use vouch_core::error::VouchError;

use crate::service::{RecalcReport, ScoringService};

/// Per-address outcome of a batch, in input order.
pub type BatchOutcome = Vec<(String, Result<RecalcReport, VouchError>)>;

impl ScoringService {
    /// Recalculate every address with at most `batch_size` in flight.
    ///
    /// One address failing (or its task panicking) never affects the others.
    /// Duplicate addresses are serialized by the per-address lock.
    pub async fn recalculate_batch(
        self: &Arc<Self>,
        addresses: &[String],
        force: bool,
    ) -> BatchOutcome {
        let permits = Arc::new(Semaphore::new(self.config().batch_size.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, address) in addresses.iter().enumerate() {
            let service = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let address = address.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (idx, Err(VouchError::Task("batch semaphore closed".into())));
                };
                // A nested task turns a panic into a JoinError for this
                // address alone.
                let inner = tokio::spawn(async move { service.recalculate(&address, force).await });
                let outcome = match inner.await {
                    Ok(result) => result,
                    Err(e) => Err(VouchError::Task(e.to_string())),
                };
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<Result<RecalcReport, VouchError>>> =
            addresses.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => warn!("batch: worker task failed: {e}"),
            }
        }

        let outcome: BatchOutcome = addresses
            .iter()
            .cloned()
            .zip(slots)
            .map(|(address, slot)| {
                let result = slot.unwrap_or_else(|| {
                    Err(VouchError::Task("recalculation did not complete".into()))
                });
                (address, result)
            })
            .collect();

        let failed = outcome.iter().filter(|(_, r)| r.is_err()).count();
        debug!(total = outcome.len(), failed, "batch: complete");
        outcome
    }
}
