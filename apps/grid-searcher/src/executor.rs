//! Parallel grid search executor using Rayon.

use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{Level, debug, info, span, warn};

use crate::config::{FailurePolicy, SearchConfig};
use crate::error::SearchError;
use crate::grid::ParameterSpace;
use crate::model::Model;
use crate::progress::{ProgressMonitor, ProgressSink};
use crate::store::{ResultRecord, ResultStore, TaskFailure};
use crate::types::Combination;

/// Lifecycle of a single `search` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// No search has started.
    Idle,
    /// Tasks are being submitted to the pool.
    Dispatching,
    /// All tasks returned; waiting for the progress monitor.
    Awaiting,
    /// Every combination produced a result.
    Completed,
    /// A task failure aborted the search.
    Failed,
}

/// Runs one model per parameter combination on a dedicated worker pool.
pub struct GridSearcher<M> {
    space: ParameterSpace,
    combinations: Vec<Combination>,
    config: SearchConfig,
    sink: Mutex<ProgressSink>,
    state: Mutex<SearchState>,
    model: PhantomData<fn() -> M>,
}

impl<M: Model> GridSearcher<M> {
    /// Create a searcher, enumerating every combination up front.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error if the parameter space is empty,
    /// a parameter has no values, or the configuration is unusable.
    pub fn new(space: ParameterSpace, config: SearchConfig) -> Result<Self, SearchError> {
        space.validate()?;
        config.validate()?;

        let combinations = space.combinations();
        debug!(
            combinations = combinations.len(),
            parameters = space.len(),
            "Enumerated parameter space"
        );

        Ok(Self {
            space,
            combinations,
            config,
            sink: Mutex::new(ProgressSink::default()),
            state: Mutex::new(SearchState::Idle),
            model: PhantomData,
        })
    }

    /// Send progress frames to `sink` instead of stdout.
    #[must_use]
    pub fn with_progress_sink(self, sink: ProgressSink) -> Self {
        *self.sink.lock() = sink;
        self
    }

    /// The parameter space being searched.
    #[must_use]
    pub const fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Combinations in index order.
    #[must_use]
    pub fn combinations(&self) -> &[Combination] {
        &self.combinations
    }

    /// Get the total number of combinations.
    #[must_use]
    pub fn total_combinations(&self) -> usize {
        self.combinations.len()
    }

    /// The search configuration.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Last state reached by the most recent `search` call.
    #[must_use]
    pub fn state(&self) -> SearchState {
        *self.state.lock()
    }

    /// Run every combination and return the populated store.
    ///
    /// Blocks until all tasks and the progress monitor finished. Under
    /// [`FailurePolicy::Abort`] the first model failure ends the search and
    /// no results are returned.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::TaskFailed`] for an unrecovered model failure,
    /// or [`SearchError::ThreadPool`] if the worker pool cannot be built.
    pub fn search(&self) -> Result<ResultStore<M::Output>, SearchError> {
        let workers = self.config.effective_workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("grid-worker-{i}"))
            .build()
            .map_err(|e| SearchError::ThreadPool {
                message: e.to_string(),
            })?;

        let store = ResultStore::new();
        let aborted = AtomicBool::new(false);
        let monitor = ProgressMonitor::new(self.total_combinations(), &self.config);
        let start_time = Instant::now();

        info!(
            "Starting grid search: {} combinations, {} workers",
            self.total_combinations(),
            workers
        );
        self.set_state(SearchState::Dispatching);

        let dispatched = thread::scope(|scope| {
            let observer = scope.spawn(|| {
                let mut sink = self.sink.lock();
                monitor.watch(&store, &aborted, &mut *sink);
            });

            let dispatched = panic::catch_unwind(AssertUnwindSafe(|| {
                pool.install(|| {
                    self.combinations
                        .par_iter()
                        .enumerate()
                        .try_for_each(|(index, combination)| {
                            self.run_task(index, combination, &store)
                        })
                })
            }));

            // The monitor only stops on its own once every index settled.
            if !matches!(dispatched, Ok(Ok(()))) {
                aborted.store(true, Ordering::Release);
            }
            self.set_state(SearchState::Awaiting);

            let observed = observer.join();
            let dispatched = dispatched.unwrap_or_else(|payload| {
                self.set_state(SearchState::Failed);
                panic::resume_unwind(payload)
            });
            if let Err(payload) = observed {
                panic::resume_unwind(payload);
            }
            dispatched
        });

        if let Err(e) = dispatched {
            self.set_state(SearchState::Failed);
            warn!(error = %e, "Grid search aborted");
            return Err(e);
        }

        self.set_state(SearchState::Completed);
        info!(
            "Grid search complete: {}/{} succeeded in {:.2}s",
            store.len(),
            self.total_combinations(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(store)
    }

    /// Run every combination, then write the store to `path`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`GridSearcher::search`], or a persistence
    /// error if `path` is unwritable. Results are lost in the latter case.
    pub fn search_and_persist(&self, path: &Path) -> Result<ResultStore<M::Output>, SearchError>
    where
        M::Output: Serialize,
    {
        let store = self.search()?;
        store.save(path)?;
        info!(path = %path.display(), records = store.len(), "Saved grid search results");
        Ok(store)
    }

    fn run_task(
        &self,
        index: usize,
        combination: &Combination,
        store: &ResultStore<M::Output>,
    ) -> Result<(), SearchError> {
        let span = span!(Level::DEBUG, "grid_task", index);
        let _guard = span.enter();

        match execute::<M>(index, combination) {
            Ok(record) => {
                debug!(duration_seconds = record.duration_seconds, "Task finished");
                store.insert(index, record)
            }
            Err(message) => match self.config.failure_policy {
                FailurePolicy::Abort => Err(SearchError::TaskFailed {
                    index,
                    parameters: combination.clone(),
                    message,
                }),
                FailurePolicy::Isolate => {
                    warn!(%combination, error = %message, "Task failed, continuing");
                    store.record_failure(TaskFailure {
                        index,
                        parameters: combination.clone(),
                        message,
                    })
                }
            },
        }
    }

    fn set_state(&self, state: SearchState) {
        debug!(?state, "Search state changed");
        *self.state.lock() = state;
    }
}

/// Configure and run one model, timing only the run call.
fn execute<M: Model>(
    index: usize,
    combination: &Combination,
) -> Result<ResultRecord<M::Output>, String> {
    let mut model =
        M::configure(combination).map_err(|e| format!("configure failed: {e}"))?;

    let start = Instant::now();
    let result = model.run(index).map_err(|e| format!("run failed: {e}"))?;
    let duration_seconds = start.elapsed().as_secs_f64();

    Ok(ResultRecord {
        result,
        parameters: combination.clone(),
        duration_seconds,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::OnceLock;

    use super::*;
    use crate::types::ParamValue;

    struct IndexPlusSum {
        total: i64,
    }

    impl Model for IndexPlusSum {
        type Output = i64;
        type Error = String;

        fn configure(combination: &Combination) -> Result<Self, String> {
            let total = combination
                .iter()
                .map(|(name, v)| v.as_int().ok_or_else(|| format!("'{name}' is not numeric")))
                .sum::<Result<i64, String>>()?;
            Ok(Self { total })
        }

        fn run(&mut self, index: usize) -> Result<i64, String> {
            Ok(index as i64 + self.total)
        }
    }

    fn space() -> ParameterSpace {
        ParameterSpace::builder()
            .add_int_param("a", vec![1, 2])
            .add_int_param("b", vec![10, 20])
            .build()
            .unwrap()
    }

    #[test]
    fn test_searcher_creation() {
        let searcher =
            GridSearcher::<IndexPlusSum>::new(space(), SearchConfig::default().quiet()).unwrap();

        assert_eq!(searcher.total_combinations(), 4);
        assert_eq!(searcher.state(), SearchState::Idle);
        assert!(searcher.config().effective_workers() > 0);
    }

    #[test]
    fn test_invalid_config_rejected_before_work() {
        let result =
            GridSearcher::<IndexPlusSum>::new(space(), SearchConfig::default().with_workers(0));
        assert!(matches!(
            result,
            Err(SearchError::InvalidConfiguration { .. })
        ));
    }

    /// (configure, run) calls per combination, keyed by the `slot` parameter.
    fn call_ledger() -> &'static Mutex<BTreeMap<usize, (u32, u32)>> {
        static LEDGER: OnceLock<Mutex<BTreeMap<usize, (u32, u32)>>> = OnceLock::new();
        LEDGER.get_or_init(|| Mutex::new(BTreeMap::new()))
    }

    struct CountingModel {
        slot: usize,
    }

    impl Model for CountingModel {
        type Output = usize;
        type Error = String;

        fn configure(combination: &Combination) -> Result<Self, String> {
            let slot = combination
                .get("slot")
                .and_then(ParamValue::as_int)
                .ok_or_else(|| "missing slot".to_string())?;
            let slot = usize::try_from(slot).map_err(|e| e.to_string())?;
            call_ledger().lock().entry(slot).or_default().0 += 1;
            Ok(Self { slot })
        }

        fn run(&mut self, index: usize) -> Result<usize, String> {
            call_ledger().lock().entry(index).or_default().1 += 1;
            Ok(self.slot)
        }
    }

    #[test]
    fn test_search_results_are_index_plus_sum() {
        let searcher = GridSearcher::<IndexPlusSum>::new(
            space(),
            SearchConfig::default().quiet().with_workers(2),
        )
        .unwrap();

        let store = searcher.search().unwrap();

        assert_eq!(store.len(), 4);
        assert_eq!(searcher.state(), SearchState::Completed);
        let results: Vec<i64> = store.into_records().into_values().map(|r| r.result).collect();
        assert_eq!(results, vec![11, 22, 14, 25]);
    }

    #[test]
    fn test_each_combination_configured_and_run_once() {
        let space = ParameterSpace::builder()
            .add_int_range("slot", 0, 63, 1)
            .build()
            .unwrap();
        let searcher = GridSearcher::<CountingModel>::new(
            space,
            SearchConfig::default().quiet().with_workers(4),
        )
        .unwrap();

        let store = searcher.search().unwrap();

        let ledger = call_ledger().lock();
        assert_eq!(ledger.len(), 64);
        assert!(ledger.values().all(|&calls| calls == (1, 1)));
        // Combination `slot` equals its index, so every run saw its own model.
        assert!(
            store
                .into_records()
                .iter()
                .all(|(&index, record)| record.result == index)
        );
    }

    #[test]
    fn test_abort_on_non_numeric_parameter() {
        let space = ParameterSpace::builder()
            .add_int_param("a", vec![1, 2, 3])
            .add_param("mode", vec![ParamValue::Int(0), ParamValue::from("bad")])
            .build()
            .unwrap();
        let searcher =
            GridSearcher::<IndexPlusSum>::new(space, SearchConfig::default().quiet()).unwrap();

        let Err(SearchError::TaskFailed {
            index,
            parameters,
            message,
        }) = searcher.search()
        else {
            panic!("expected task failure");
        };

        assert_eq!(index % 2, 1);
        assert_eq!(parameters.get("mode"), Some(&ParamValue::from("bad")));
        assert!(message.contains("configure failed"));
        assert_eq!(searcher.state(), SearchState::Failed);
    }
}
