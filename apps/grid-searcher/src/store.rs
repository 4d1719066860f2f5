//! Shared result store and its on-disk snapshot.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SearchError;
use crate::types::Combination;

/// Result from a single model run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord<R> {
    /// Value returned by the model.
    pub result: R,

    /// Parameters the model was configured with.
    pub parameters: Combination,

    /// Wall-clock time spent in the run call, in seconds.
    pub duration_seconds: f64,
}

/// A combination whose model failed while failures were being isolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Combination index.
    pub index: usize,

    /// Parameters the model was configured with.
    pub parameters: Combination,

    /// Error message reported by the model.
    pub message: String,
}

/// Results keyed by combination index.
///
/// Workers insert concurrently under disjoint indices; the progress monitor
/// reads [`ResultStore::settled`] without taking the lock.
#[derive(Debug)]
pub struct ResultStore<R> {
    records: RwLock<BTreeMap<usize, ResultRecord<R>>>,
    failures: RwLock<BTreeMap<usize, TaskFailure>>,
    settled: AtomicUsize,
}

impl<R> Default for ResultStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ResultStore<R> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(BTreeMap::new()),
            settled: AtomicUsize::new(0),
        }
    }

    /// Record the result for `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::DuplicateIndex`] if `index` already holds a
    /// result or a failure; the existing entry is left untouched.
    pub fn insert(&self, index: usize, record: ResultRecord<R>) -> Result<(), SearchError> {
        let mut records = self.records.write();
        if records.contains_key(&index) || self.failures.read().contains_key(&index) {
            return Err(SearchError::DuplicateIndex { index });
        }
        records.insert(index, record);
        self.settled.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Record an isolated failure.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::DuplicateIndex`] if the index is already settled.
    pub fn record_failure(&self, failure: TaskFailure) -> Result<(), SearchError> {
        let index = failure.index;
        let records = self.records.read();
        let mut failures = self.failures.write();
        if records.contains_key(&index) || failures.contains_key(&index) {
            return Err(SearchError::DuplicateIndex { index });
        }
        failures.insert(index, failure);
        self.settled.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Number of successful results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if no result has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of combinations that finished, successfully or not.
    #[must_use]
    pub fn settled(&self) -> usize {
        self.settled.load(Ordering::Acquire)
    }

    /// Check if a result exists for `index`.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.records.read().contains_key(&index)
    }

    /// Indices holding a result, ascending.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        self.records.read().keys().copied().collect()
    }

    /// Get a copy of the result for `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<ResultRecord<R>>
    where
        R: Clone,
    {
        self.records.read().get(&index).cloned()
    }

    /// Isolated failures, keyed by index.
    #[must_use]
    pub fn failures(&self) -> BTreeMap<usize, TaskFailure> {
        self.failures.read().clone()
    }

    /// Fraction of settled combinations that succeeded.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let settled = self.settled();
        if settled == 0 {
            0.0
        } else {
            self.len() as f64 / settled as f64
        }
    }

    /// The record maximising `key`, ignoring records where it is `None`.
    #[must_use]
    pub fn best_by<F>(&self, key: F) -> Option<(usize, ResultRecord<R>)>
    where
        R: Clone,
        F: Fn(&ResultRecord<R>) -> Option<f64>,
    {
        self.records
            .read()
            .iter()
            .filter_map(|(&index, record)| key(record).map(|score| (index, score, record)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _, record)| (index, record.clone()))
    }

    /// Consume the store, returning results in index order.
    #[must_use]
    pub fn into_records(self) -> BTreeMap<usize, ResultRecord<R>> {
        self.records.into_inner()
    }

    /// Write the store to `path` as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the file cannot be created or written.
    pub fn save(&self, path: &Path) -> Result<(), SearchError>
    where
        R: Serialize,
    {
        let persistence = |source| SearchError::Persistence {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(persistence)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(persistence)
    }

    /// Read a store previously written by [`ResultStore::save`].
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the file cannot be opened, or a
    /// serialization error if its contents do not decode.
    pub fn load(path: &Path) -> Result<Self, SearchError>
    where
        R: DeserializeOwned,
    {
        let file = File::open(path).map_err(|source| SearchError::Persistence {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl<R: PartialEq> PartialEq for ResultStore<R> {
    fn eq(&self, other: &Self) -> bool {
        *self.records.read() == *other.records.read()
            && *self.failures.read() == *other.failures.read()
    }
}

impl<R: Serialize> Serialize for ResultStore<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let records = self.records.read();
        let failures = self.failures.read();
        let field_count = if failures.is_empty() { 1 } else { 2 };

        let mut state = serializer.serialize_struct("ResultStore", field_count)?;
        state.serialize_field("records", &*records)?;
        if failures.is_empty() {
            state.skip_field("failures")?;
        } else {
            state.serialize_field("failures", &*failures)?;
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct StoreSnapshot<R> {
    records: BTreeMap<usize, ResultRecord<R>>,
    #[serde(default)]
    failures: BTreeMap<usize, TaskFailure>,
}

impl<'de, R: Deserialize<'de>> Deserialize<'de> for ResultStore<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let snapshot = StoreSnapshot::deserialize(deserializer)?;
        let settled = snapshot.records.len() + snapshot.failures.len();
        Ok(Self {
            records: RwLock::new(snapshot.records),
            failures: RwLock::new(snapshot.failures),
            settled: AtomicUsize::new(settled),
        })
    }
}
