//! RocksDB-backed persistence.
//!
//! Column families:
//! - `features`: `address/version` → [`StoredFeatures`]
//! - `scores`: `address` → [`ScoreRecord`]
//! - `history`: `address/` ++ seq (u64 big-endian) → [`ScoreHistoryEntry`]
//! - `meta`: per-address history sequence counters and the scheduler checkpoint
//!
//! Values are bincode-encoded. History keys sort in insertion order within an
//! address, so a prefix scan returns the audit trail oldest first.

use std::collections::VecDeque;
use std::path::Path;

use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use tracing::debug;

use vouch_core::error::StoreError;
use vouch_core::traits::{CheckpointStore, FeatureKvStore, HistoryLog, ScoreRepository};
use vouch_core::types::{Checkpoint, ScoreHistoryEntry, ScoreRecord, StoredFeatures};

// --- Column family names ---

const CF_FEATURES: &str = "features";
const CF_SCORES: &str = "scores";
const CF_HISTORY: &str = "history";
const CF_META: &str = "meta";

const ALL_CFS: &[&str] = &[CF_FEATURES, CF_SCORES, CF_HISTORY, CF_META];

// --- Metadata keys ---

const META_CHECKPOINT: &[u8] = b"checkpoint";
const META_HISTORY_SEQ_PREFIX: &str = "history_seq/";

pub struct RocksStore {
    db: DB,
    /// Serializes history sequence allocation.
    history_seq: Mutex<()>,
}

impl RocksStore {
    /// Open or create a database at `path`, creating missing column families.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        debug!(path = %path.as_ref().display(), "store: opened");

        Ok(Self {
            db,
            history_seq: Mutex::new(()),
        })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(|e| StoreError::Backend(e.to_string()))
    }

    // --- Internal helpers ---

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::MissingColumnFamily(name.to_string()))
    }

    fn get_decoded<T: bincode::Decode<()>>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>, StoreError> {
        let cf = self.cf_handle(cf_name)?;
        match self
            .db
            .get_cf(cf, key)
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn put_encoded<T: bincode::Encode>(
        &self,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<(), StoreError> {
        let cf = self.cf_handle(cf_name)?;
        self.db
            .put_cf(cf, key, encode(value)?)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn feature_key(address: &str, version: &str) -> Vec<u8> {
        format!("{address}/{version}").into_bytes()
    }

    fn history_prefix(address: &str) -> Vec<u8> {
        format!("{address}/").into_bytes()
    }

    fn history_key(address: &str, seq: u64) -> Vec<u8> {
        let mut key = Self::history_prefix(address);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn history_seq_key(address: &str) -> Vec<u8> {
        format!("{META_HISTORY_SEQ_PREFIX}{address}").into_bytes()
    }

    fn next_history_seq(&self, address: &str) -> Result<u64, StoreError> {
        let cf = self.cf_handle(CF_META)?;
        match self
            .db
            .get_cf(cf, Self::history_seq_key(address))
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Codec("invalid history sequence length".into()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| StoreError::Codec(e.to_string()))
}

impl FeatureKvStore for RocksStore {
    fn get_features(&self, address: &str, version: &str) -> Result<Option<StoredFeatures>, StoreError> {
        self.get_decoded(CF_FEATURES, &Self::feature_key(address, version))
    }

    fn put_features(
        &self,
        address: &str,
        version: &str,
        features: &StoredFeatures,
    ) -> Result<(), StoreError> {
        self.put_encoded(CF_FEATURES, &Self::feature_key(address, version), features)
    }
}

impl ScoreRepository for RocksStore {
    fn latest(&self, address: &str) -> Result<Option<ScoreRecord>, StoreError> {
        self.get_decoded(CF_SCORES, address.as_bytes())
    }

    fn save(&self, address: &str, record: &ScoreRecord) -> Result<(), StoreError> {
        self.put_encoded(CF_SCORES, address.as_bytes(), record)
    }

    fn addresses(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf_handle(CF_SCORES)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            let address = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Codec(e.to_string()))?;
            out.push(address);
        }
        Ok(out)
    }
}

impl HistoryLog for RocksStore {
    fn append(&self, address: &str, entry: &ScoreHistoryEntry) -> Result<(), StoreError> {
        let _guard = self.history_seq.lock();
        let seq = self.next_history_seq(address)?;

        let cf_history = self.cf_handle(CF_HISTORY)?;
        let cf_meta = self.cf_handle(CF_META)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf_history, Self::history_key(address, seq), encode(entry)?);
        batch.put_cf(cf_meta, Self::history_seq_key(address), (seq + 1).to_be_bytes());
        self.db
            .write(batch)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn history(&self, address: &str, limit: usize) -> Result<Vec<ScoreHistoryEntry>, StoreError> {
        let cf = self.cf_handle(CF_HISTORY)?;
        let prefix = Self::history_prefix(address);
        if limit == 0 {
            return Ok(Vec::new());
        }
        // Keeps the newest `limit` entries seen so far.
        let mut newest: VecDeque<ScoreHistoryEntry> = VecDeque::with_capacity(limit.min(64));

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() != prefix.len() + 8 {
                continue;
            }
            if newest.len() == limit {
                newest.pop_front();
            }
            newest.push_back(decode(&value)?);
        }
        Ok(newest.into())
    }
}

impl CheckpointStore for RocksStore {
    fn load_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        self.get_decoded(CF_META, META_CHECKPOINT)
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.put_encoded(CF_META, META_CHECKPOINT, checkpoint)
    }

    fn clear_checkpoint(&self) -> Result<(), StoreError> {
        let cf = self.cf_handle(CF_META)?;
        self.db
            .delete_cf(cf, META_CHECKPOINT)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vouch_core::types::{ChangeReason, ScoreResult, WalletFeatures};

    fn temp_store() -> (RocksStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("vouchdb")).unwrap();
        (store, dir)
    }

    fn entry(new_score: u16, ts: i64) -> ScoreHistoryEntry {
        ScoreHistoryEntry {
            previous_score: None,
            new_score,
            change_reason: ChangeReason::Initial,
            explanation: format!("score {new_score}"),
            timestamp: ts,
        }
    }

    fn record(score: u16) -> ScoreRecord {
        ScoreRecord {
            result: ScoreResult {
                score,
                ..ScoreResult::fallback_default()
            },
            last_updated: 100,
            last_activity_at: Some(90),
            last_written_score: Some(score),
        }
    }

    #[test]
    fn features_round_trip_per_version() {
        let (store, _dir) = temp_store();
        let stored = StoredFeatures {
            features: WalletFeatures::from_numbers(&[("tx_count", 4.0)]),
            extracted_at: 7,
        };
        store.put_features("0xa", "v1", &stored).unwrap();
        assert_eq!(store.get_features("0xa", "v1").unwrap(), Some(stored));
        assert_eq!(store.get_features("0xa", "v2").unwrap(), None);
    }

    #[test]
    fn scores_overwrite_and_list_sorted() {
        let (store, _dir) = temp_store();
        store.save("0xb", &record(600)).unwrap();
        store.save("0xa", &record(700)).unwrap();
        store.save("0xb", &record(650)).unwrap();

        assert_eq!(store.latest("0xb").unwrap().unwrap().result.score, 650);
        assert_eq!(store.addresses().unwrap(), vec!["0xa".to_string(), "0xb".to_string()]);
        assert_eq!(store.latest("0xc").unwrap(), None);
    }

    #[test]
    fn history_is_ordered_and_isolated_per_address() {
        let (store, _dir) = temp_store();
        for i in 0..300u16 {
            store.append("0xa", &entry(i, i64::from(i))).unwrap();
        }
        store.append("0xab", &entry(999, 0)).unwrap();

        let all = store.history("0xa", 1_000).unwrap();
        assert_eq!(all.len(), 300);
        assert!(all.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let recent = store.history("0xa", 2).unwrap();
        assert_eq!(recent.iter().map(|e| e.new_score).collect::<Vec<_>>(), vec![298, 299]);

        assert_eq!(store.history("0xab", 10).unwrap().len(), 1);
        assert!(store.history("0xa", 0).unwrap().is_empty());
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vouchdb");
        {
            let store = RocksStore::open(&path).unwrap();
            store.append("0xa", &entry(1, 1)).unwrap();
            store.flush().unwrap();
        }
        let store = RocksStore::open(&path).unwrap();
        store.append("0xa", &entry(2, 2)).unwrap();
        let scores: Vec<u16> = store.history("0xa", 10).unwrap().iter().map(|e| e.new_score).collect();
        assert_eq!(scores, vec![1, 2]);
    }

    #[test]
    fn checkpoint_save_load_clear() {
        let (store, _dir) = temp_store();
        assert_eq!(store.load_checkpoint().unwrap(), None);
        let cp = Checkpoint {
            pass_started_at: 10,
            last_address: "0xa".into(),
        };
        store.save_checkpoint(&cp).unwrap();
        assert_eq!(store.load_checkpoint().unwrap(), Some(cp));
        store.clear_checkpoint().unwrap();
        assert_eq!(store.load_checkpoint().unwrap(), None);
    }
}
