//! Periodic, resumable recalculation of every known address.
//!
//! A pass walks the sorted union of scored addresses and the watchlist with
//! at most `batch_size` recalculations in flight. The checkpoint cursor only
//! moves over a contiguous prefix of finished addresses, so after a crash or
//! shutdown the next pass resumes at the first address not yet processed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use vouch_core::error::VouchError;
use vouch_core::traits::CheckpointStore;
use vouch_core::types::{Checkpoint, normalize_address};

use crate::service::{RecalcReport, RecalcStatus, ScoringService, WriteStatus};

/// Counters for one scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Addresses this pass was responsible for after resuming.
    pub total: usize,
    pub processed: usize,
    pub recomputed: usize,
    pub fresh: usize,
    pub written: usize,
    /// Scoring failed and the documented default was reported.
    pub defaulted: usize,
    pub failed: usize,
    /// Address the pass resumed after, if a checkpoint was found.
    pub resumed_after: Option<String>,
    /// Shutdown was requested before every address was processed.
    pub interrupted: bool,
}

impl PassSummary {
    fn record(&mut self, outcome: &Result<RecalcReport, VouchError>) {
        self.processed += 1;
        match outcome {
            Ok(report) => {
                match report.status {
                    RecalcStatus::Fresh => self.fresh += 1,
                    RecalcStatus::Recomputed => self.recomputed += 1,
                    RecalcStatus::Defaulted => self.defaulted += 1,
                }
                if matches!(report.write, Some(WriteStatus::Written { .. })) {
                    self.written += 1;
                }
            }
            Err(_) => self.failed += 1,
        }
    }
}

pub struct Scheduler {
    service: Arc<ScoringService>,
    checkpoints: Arc<dyn CheckpointStore>,
    watchlist: Vec<String>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(service: Arc<ScoringService>, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        let interval = Duration::from_secs(service.config().scheduler_interval_secs);
        Self {
            service,
            checkpoints,
            watchlist: Vec::new(),
            interval,
        }
    }

    /// Addresses to recalculate even if they have never been scored.
    /// Invalid entries are logged and dropped.
    pub fn with_watchlist<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in addresses {
            match normalize_address(raw.as_ref()) {
                Ok(address) => self.watchlist.push(address),
                Err(e) => warn!(address = raw.as_ref(), "scheduler: ignoring watchlist entry: {e}"),
            }
        }
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sorted, deduplicated addresses covered by a pass.
    pub fn addresses(&self) -> Result<Vec<String>, VouchError> {
        let mut all = self.service.collaborators().scores.addresses()?;
        all.extend(self.watchlist.iter().cloned());
        all.sort();
        all.dedup();
        Ok(all)
    }

    /// Run one pass, resuming from a saved checkpoint when there is one.
    pub async fn run_pass(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<PassSummary, VouchError> {
        let addresses = self.addresses()?;
        let checkpoint = self.checkpoints.load_checkpoint()?;

        let (pass_started_at, remaining, resumed_after) = match checkpoint {
            Some(cp) => {
                let start = addresses.partition_point(|a| a.as_str() <= cp.last_address.as_str());
                info!(
                    after = %cp.last_address,
                    remaining = addresses.len() - start,
                    "scheduler: resuming pass"
                );
                (cp.pass_started_at, addresses[start..].to_vec(), Some(cp.last_address))
            }
            None => (self.service.now(), addresses, None),
        };

        let mut summary = PassSummary {
            total: remaining.len(),
            resumed_after,
            ..PassSummary::default()
        };
        let window = self.service.config().batch_size.max(1);
        let mut done = vec![false; remaining.len()];
        let mut committed = 0usize;
        let mut next = 0usize;
        let mut in_flight = JoinSet::new();

        loop {
            while in_flight.len() < window && next < remaining.len() && !*shutdown.borrow() {
                let idx = next;
                let service = Arc::clone(&self.service);
                let address = remaining[idx].clone();
                in_flight.spawn(async move {
                    let inner =
                        tokio::spawn(async move { service.recalculate(&address, false).await });
                    let outcome = match inner.await {
                        Ok(result) => result,
                        Err(e) => Err(VouchError::Task(e.to_string())),
                    };
                    (idx, outcome)
                });
                next += 1;
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (idx, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    // The cursor cannot pass this address; the next pass
                    // retries it.
                    warn!("scheduler: worker task failed: {e}");
                    continue;
                }
            };
            if let Err(e) = &outcome {
                warn!(address = %remaining[idx], "scheduler: recalculation failed: {e}");
            }
            summary.record(&outcome);
            done[idx] = true;

            let before = committed;
            while committed < done.len() && done[committed] {
                committed += 1;
            }
            if committed > before {
                self.checkpoints.save_checkpoint(&Checkpoint {
                    pass_started_at,
                    last_address: remaining[committed - 1].clone(),
                })?;
            }
        }

        if next < remaining.len() || committed < remaining.len() {
            summary.interrupted = *shutdown.borrow();
            info!(
                processed = summary.processed,
                total = summary.total,
                "scheduler: pass stopped early, checkpoint kept"
            );
        } else {
            self.checkpoints.clear_checkpoint()?;
            info!(
                processed = summary.processed,
                recomputed = summary.recomputed,
                written = summary.written,
                defaulted = summary.defaulted,
                failed = summary.failed,
                "scheduler: pass complete"
            );
        }

        self.service.housekeeping();
        Ok(summary)
    }

    /// Run passes every `interval` until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), VouchError> {
        info!(interval_secs = self.interval.as_secs(), "scheduler: started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let summary = self.run_pass(&shutdown).await?;
            debug!(?summary, "scheduler: pass summary");
            if summary.interrupted {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    // A dropped sender also means stop.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("scheduler: stopped");
        Ok(())
    }
}
