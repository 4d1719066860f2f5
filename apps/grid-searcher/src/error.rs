//! Error types for grid search operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Combination;

/// Errors from grid search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The parameter space or search configuration is unusable.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message.
        message: String,
    },

    /// Worker pool initialization failed.
    #[error("Failed to initialize worker pool: {message}")]
    ThreadPool {
        /// Error message.
        message: String,
    },

    /// A model failed to configure or run and the search was aborted.
    #[error("Task {index} failed for {parameters}: {message}")]
    TaskFailed {
        /// Index of the failing combination.
        index: usize,
        /// The combination the model was configured with.
        parameters: Combination,
        /// Error message reported by the model.
        message: String,
    },

    /// A result was written twice for the same combination index.
    #[error("Result for combination {index} was already recorded")]
    DuplicateIndex {
        /// Combination index.
        index: usize,
    },

    /// Results could not be written to or read from disk.
    #[error("Failed to access results file '{}': {source}", path.display())]
    Persistence {
        /// Path of the results file.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Results could not be encoded or decoded.
    #[error("Failed to serialize results: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    /// Shorthand for an [`SearchError::InvalidConfiguration`].
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamValue;

    #[test]
    fn test_task_failed_names_index_and_parameters() {
        let parameters = Combination::from_entries(vec![
            ("a".to_string(), ParamValue::Int(2)),
            ("b".to_string(), ParamValue::Int(10)),
        ]);
        let error = SearchError::TaskFailed {
            index: 2,
            parameters,
            message: "diverged".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Task 2 failed for {a: 2, b: 10}: diverged"
        );
    }

    #[test]
    fn test_invalid_shorthand() {
        let error = SearchError::invalid("parameter space is empty");
        assert!(matches!(error, SearchError::InvalidConfiguration { .. }));
        assert!(error.to_string().contains("parameter space is empty"));
    }
}
