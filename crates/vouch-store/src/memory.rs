//! In-memory persistence with the same semantics as [`RocksStore`](crate::RocksStore).

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use vouch_core::error::StoreError;
use vouch_core::traits::{CheckpointStore, FeatureKvStore, HistoryLog, ScoreRepository};
use vouch_core::types::{Checkpoint, ScoreHistoryEntry, ScoreRecord, StoredFeatures};

#[derive(Default)]
pub struct MemoryStore {
    features: RwLock<HashMap<(String, String), StoredFeatures>>,
    scores: RwLock<BTreeMap<String, ScoreRecord>>,
    history: RwLock<HashMap<String, Vec<ScoreHistoryEntry>>>,
    checkpoint: RwLock<Option<Checkpoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total history entries across all addresses.
    pub fn history_len(&self) -> usize {
        self.history.read().values().map(Vec::len).sum()
    }
}

impl FeatureKvStore for MemoryStore {
    fn get_features(&self, address: &str, version: &str) -> Result<Option<StoredFeatures>, StoreError> {
        Ok(self
            .features
            .read()
            .get(&(address.to_string(), version.to_string()))
            .cloned())
    }

    fn put_features(
        &self,
        address: &str,
        version: &str,
        features: &StoredFeatures,
    ) -> Result<(), StoreError> {
        self.features
            .write()
            .insert((address.to_string(), version.to_string()), features.clone());
        Ok(())
    }
}

impl ScoreRepository for MemoryStore {
    fn latest(&self, address: &str) -> Result<Option<ScoreRecord>, StoreError> {
        Ok(self.scores.read().get(address).cloned())
    }

    fn save(&self, address: &str, record: &ScoreRecord) -> Result<(), StoreError> {
        self.scores.write().insert(address.to_string(), record.clone());
        Ok(())
    }

    fn addresses(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.scores.read().keys().cloned().collect())
    }
}

impl HistoryLog for MemoryStore {
    fn append(&self, address: &str, entry: &ScoreHistoryEntry) -> Result<(), StoreError> {
        self.history
            .write()
            .entry(address.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    fn history(&self, address: &str, limit: usize) -> Result<Vec<ScoreHistoryEntry>, StoreError> {
        let history = self.history.read();
        let Some(entries) = history.get(address) else {
            return Ok(Vec::new());
        };
        let skip = entries.len().saturating_sub(limit);
        Ok(entries[skip..].to_vec())
    }
}

impl CheckpointStore for MemoryStore {
    fn load_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.checkpoint.read().clone())
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        *self.checkpoint.write() = Some(checkpoint.clone());
        Ok(())
    }

    fn clear_checkpoint(&self) -> Result<(), StoreError> {
        *self.checkpoint.write() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vouch_core::types::ChangeReason;

    fn entry(new_score: u16) -> ScoreHistoryEntry {
        ScoreHistoryEntry {
            previous_score: None,
            new_score,
            change_reason: ChangeReason::Forced,
            explanation: String::new(),
            timestamp: i64::from(new_score),
        }
    }

    #[test]
    fn history_limit_keeps_newest_oldest_first() {
        let store = MemoryStore::new();
        for s in 1..=5 {
            store.append("0xa", &entry(s)).unwrap();
        }
        let scores: Vec<u16> = store.history("0xa", 3).unwrap().iter().map(|e| e.new_score).collect();
        assert_eq!(scores, vec![3, 4, 5]);
        assert_eq!(store.history("0xa", 0).unwrap().len(), 0);
        assert_eq!(store.history("0xz", 3).unwrap().len(), 0);
        assert_eq!(store.history_len(), 5);
    }

    #[test]
    fn addresses_are_sorted() {
        let store = MemoryStore::new();
        let record = ScoreRecord {
            result: vouch_core::types::ScoreResult::fallback_default(),
            last_updated: 0,
            last_activity_at: None,
            last_written_score: None,
        };
        for a in ["0xc", "0xa", "0xb"] {
            store.save(a, &record).unwrap();
        }
        assert_eq!(store.addresses().unwrap(), vec!["0xa", "0xb", "0xc"]);
    }
}
