// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::needless_pass_by_value,
        clippy::cast_possible_wrap,
        clippy::items_after_statements
    )
)]

//! Grid Searcher - parallel parameter sweeps.
//!
//! Enumerates every combination of a parameter space, configures and runs
//! one [`Model`] per combination on a dedicated worker pool, and collects
//! timed results keyed by combination index.
//!
//! # Thread Pool Configuration
//!
//! Each search builds its own Rayon pool sized by
//! [`SearchConfig::effective_workers`]; the global pool is never touched.
//! The default is one fewer than the available parallelism, at least one.
//!
//! # Example
//!
//! ```ignore
//! use grid_searcher::{GridSearcher, ParameterSpace, ParameterSum, SearchConfig};
//!
//! let space = ParameterSpace::builder()
//!     .add_int_param("a", vec![1, 2])
//!     .add_int_param("b", vec![10, 20])
//!     .build()?;
//!
//! let searcher = GridSearcher::<ParameterSum>::new(space, SearchConfig::default())?;
//! let store = searcher.search()?;
//! assert_eq!(store.len(), 4);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Search Core
// =============================================================================

/// Parameter values and combinations.
pub mod types;

/// Parameter space and combination enumeration.
pub mod grid;

/// The model contract.
pub mod model;

/// Concurrent result store and persistence.
pub mod store;

/// Worker pool orchestration.
pub mod executor;

/// Terminal progress bar.
pub mod progress;

/// Error types.
pub mod error;

// =============================================================================
// Ambient
// =============================================================================

/// Search settings and sweep file loading.
pub mod config;

/// Tracing subscriber setup.
pub mod telemetry;

/// Reference model.
pub mod demo;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{FailurePolicy, SearchConfig, SweepFile, load_sweep, load_sweep_from_string};
pub use demo::ParameterSum;
pub use error::SearchError;
pub use executor::{GridSearcher, SearchState};
pub use grid::{ParameterSpace, ParameterSpaceBuilder};
pub use model::Model;
pub use progress::{ProgressMonitor, ProgressSink};
pub use store::{ResultRecord, ResultStore, TaskFailure};
pub use types::{Combination, ParamValue};
