//! Reference model used by the binary and in tests.

use thiserror::Error;

use crate::model::Model;
use crate::types::Combination;

/// Errors from [`ParameterSum`].
#[derive(Debug, Error)]
pub enum DemoError {
    /// A parameter value has a string or boolean in it.
    #[error("parameter '{name}' is not numeric: {value}")]
    NonNumeric {
        /// Parameter name.
        name: String,
        /// Offending value, rendered.
        value: String,
    },
}

/// Returns its combination index plus the sum of all parameter values.
///
/// List values contribute the sum of their elements.
#[derive(Debug, Clone)]
pub struct ParameterSum {
    parameters: Combination,
}

impl ParameterSum {
    /// Parameters this instance was configured with.
    #[must_use]
    pub const fn parameters(&self) -> &Combination {
        &self.parameters
    }
}

impl Model for ParameterSum {
    type Output = f64;
    type Error = DemoError;

    fn configure(combination: &Combination) -> Result<Self, DemoError> {
        Ok(Self {
            parameters: combination.clone(),
        })
    }

    fn run(&mut self, index: usize) -> Result<f64, DemoError> {
        let mut total = index as f64;
        for (name, value) in self.parameters.iter() {
            total += value.numeric_sum().ok_or_else(|| DemoError::NonNumeric {
                name: name.to_string(),
                value: value.to_string(),
            })?;
        }
        Ok(total)
    }
}
