//! The contract a swept model must fulfil.

use std::fmt::Display;

use crate::types::Combination;

/// A model that can be configured from one parameter combination and run.
///
/// The searcher configures a fresh instance for every combination on a
/// worker thread, then calls [`Model::run`] exactly once. Only the `run`
/// call is timed.
pub trait Model: Sized {
    /// Value produced by a successful run.
    type Output: Send + Sync;

    /// Error raised while configuring or running.
    type Error: Display;

    /// Build an instance for `combination`.
    fn configure(combination: &Combination) -> Result<Self, Self::Error>;

    /// Execute the model.
    ///
    /// `index` identifies which combination is running; no further meaning
    /// is attached to it.
    fn run(&mut self, index: usize) -> Result<Self::Output, Self::Error>;
}
