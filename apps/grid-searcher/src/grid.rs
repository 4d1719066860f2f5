//! Parameter space and Cartesian-product enumeration.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::SearchError;
use crate::types::{Combination, ParamValue};

/// Candidate values for every parameter of a sweep.
///
/// Parameters keep their declaration order, which fixes both the field order
/// of each [`Combination`] and the enumeration order: the last declared
/// parameter varies fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    parameters: HashMap<String, Vec<ParamValue>>,
    order: Vec<String>,
}

impl ParameterSpace {
    /// Create a new parameter space builder.
    #[must_use]
    pub fn builder() -> ParameterSpaceBuilder {
        ParameterSpaceBuilder::new()
    }

    /// Parameter names in declaration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Candidate values for `name`.
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.parameters.get(name).map(Vec::as_slice)
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if no parameters are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Get the total number of parameter combinations.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error if the product overflows `usize`.
    pub fn total_combinations(&self) -> Result<usize, SearchError> {
        self.axes().try_fold(1_usize, |acc, (name, values)| {
            acc.checked_mul(values.len()).ok_or_else(|| {
                SearchError::invalid(format!(
                    "combination count overflows at parameter '{name}'"
                ))
            })
        })
    }

    /// Generate all parameter combinations in lexicographic product order.
    #[must_use]
    pub fn combinations(&self) -> Vec<Combination> {
        let mut result = vec![Combination::default()];

        for (name, values) in self.axes() {
            let mut next = Vec::with_capacity(result.len() * values.len());
            for combo in &result {
                for value in values {
                    let mut extended = combo.clone();
                    extended.push(name.to_string(), value.clone());
                    next.push(extended);
                }
            }
            result = next;
        }

        result
    }

    /// Decode a single combination by index without enumerating the product.
    ///
    /// Returns `None` when `index` is out of range.
    #[must_use]
    pub fn combination_at(&self, index: usize) -> Option<Combination> {
        if index >= self.total_combinations().ok()? {
            return None;
        }

        // Mixed-radix digits, least significant (last parameter) first.
        let mut remainder = index;
        let mut picks = Vec::with_capacity(self.order.len());
        for (_, values) in self.axes().collect::<Vec<_>>().into_iter().rev() {
            picks.push(&values[remainder % values.len()]);
            remainder /= values.len();
        }
        picks.reverse();

        Some(Combination::from_entries(
            self.order
                .iter()
                .cloned()
                .zip(picks.into_iter().cloned())
                .collect(),
        ))
    }

    /// Reject empty spaces, parameters without candidate values and
    /// non-finite floats.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error describing the first problem.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.order.is_empty() {
            return Err(SearchError::invalid("parameter space is empty"));
        }
        if let Some((name, _)) = self.axes().find(|(_, values)| values.is_empty()) {
            return Err(SearchError::invalid(format!(
                "parameter '{name}' has no values"
            )));
        }
        if let Some((name, _)) = self
            .axes()
            .find(|(_, values)| !values.iter().all(ParamValue::is_finite))
        {
            return Err(SearchError::invalid(format!(
                "parameter '{name}' has a NaN or infinite value"
            )));
        }
        self.total_combinations().map(|_| ())
    }

    fn axes(&self) -> impl Iterator<Item = (&str, &[ParamValue])> {
        self.order.iter().map(|name| {
            let values = self.parameters.get(name).map_or(&[][..], Vec::as_slice);
            (name.as_str(), values)
        })
    }
}

/// Builder for parameter spaces.
#[derive(Debug, Default)]
pub struct ParameterSpaceBuilder {
    parameters: HashMap<String, Vec<ParamValue>>,
    order: Vec<String>,
}

impl ParameterSpaceBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add parameter values of any supported type.
    ///
    /// Declaring a name twice replaces its values but keeps its position.
    #[must_use]
    pub fn add_param<V: Into<ParamValue>>(mut self, name: &str, values: Vec<V>) -> Self {
        if !self.parameters.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.parameters.insert(
            name.to_string(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Add integer parameter values.
    #[must_use]
    pub fn add_int_param(self, name: &str, values: Vec<i64>) -> Self {
        self.add_param(name, values)
    }

    /// Add float parameter values.
    #[must_use]
    pub fn add_float_param(self, name: &str, values: Vec<f64>) -> Self {
        self.add_param(name, values)
    }

    /// Add string parameter values.
    #[must_use]
    pub fn add_string_param(self, name: &str, values: Vec<&str>) -> Self {
        self.add_param(name, values)
    }

    /// Add boolean parameter values.
    #[must_use]
    pub fn add_bool_param(self, name: &str, values: Vec<bool>) -> Self {
        self.add_param(name, values)
    }

    /// Add a parameter range (inclusive).
    #[must_use]
    pub fn add_int_range(self, name: &str, start: i64, end: i64, step: i64) -> Self {
        let step = usize::try_from(step.unsigned_abs()).unwrap_or(usize::MAX).max(1);
        let values: Vec<i64> = (start..=end).step_by(step).collect();
        self.add_int_param(name, values)
    }

    /// Build and validate the parameter space.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error if no parameters were added or
    /// any parameter has no values.
    pub fn build(self) -> Result<ParameterSpace, SearchError> {
        let space = ParameterSpace {
            parameters: self.parameters,
            order: self.order,
        };
        space.validate()?;
        Ok(space)
    }
}

impl<'de> Deserialize<'de> for ParameterSpace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpaceVisitor;

        impl<'de> Visitor<'de> for SpaceVisitor {
            type Value = ParameterSpace;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to lists of values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ParameterSpace, A::Error> {
                let mut builder = ParameterSpaceBuilder::new();
                while let Some((name, values)) =
                    access.next_entry::<String, Vec<ParamValue>>()?
                {
                    builder = builder.add_param(&name, values);
                }
                builder.build().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_map(SpaceVisitor)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn space(axes: &[(&str, Vec<i64>)]) -> ParameterSpace {
        axes.iter()
            .fold(ParameterSpace::builder(), |b, (name, values)| {
                b.add_int_param(name, values.clone())
            })
            .build()
            .unwrap_or_else(|e| panic!("space should build: {e}"))
    }

    #[test]
    fn test_parameter_space_builder() {
        let grid = ParameterSpace::builder()
            .add_int_param("sma_period", vec![10, 20, 50])
            .add_float_param("stop_pct", vec![0.02, 0.05])
            .build()
            .unwrap();

        assert_eq!(grid.total_combinations().unwrap(), 6);
        assert_eq!(grid.names(), ["sma_period", "stop_pct"]);
    }

    #[test]
    fn test_combinations_last_parameter_fastest() {
        let grid = space(&[("a", vec![1, 2]), ("b", vec![10, 20])]);

        let combos: Vec<String> = grid.combinations().iter().map(ToString::to_string).collect();
        assert_eq!(
            combos,
            vec![
                "{a: 1, b: 10}",
                "{a: 1, b: 20}",
                "{a: 2, b: 10}",
                "{a: 2, b: 20}",
            ]
        );
    }

    #[test]
    fn test_single_value_parameter() {
        let grid = space(&[("a", vec![5])]);
        let combos = grid.combinations();

        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].get("a"), Some(&ParamValue::Int(5)));
    }

    #[test]
    fn test_int_range() {
        let grid = ParameterSpace::builder()
            .add_int_range("period", 10, 50, 10)
            .build()
            .unwrap();

        assert_eq!(grid.total_combinations().unwrap(), 5);
        assert_eq!(
            grid.values("period"),
            Some(&[10, 20, 30, 40, 50].map(ParamValue::Int)[..])
        );
    }

    #[test]
    fn test_redeclared_parameter_keeps_position() {
        let grid = ParameterSpace::builder()
            .add_int_param("a", vec![1])
            .add_int_param("b", vec![2])
            .add_int_param("a", vec![3, 4])
            .build()
            .unwrap();

        assert_eq!(grid.names(), ["a", "b"]);
        assert_eq!(grid.total_combinations().unwrap(), 2);
    }

    #[test]
    fn test_empty_space_rejected() {
        let result = ParameterSpace::builder().build();
        assert!(matches!(
            result,
            Err(SearchError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_empty_value_list_rejected() {
        let result = ParameterSpace::builder()
            .add_int_param("a", vec![1, 2])
            .add_int_param("b", vec![])
            .build();

        let Err(SearchError::InvalidConfiguration { message }) = result else {
            panic!("expected invalid configuration");
        };
        assert!(message.contains("'b'"));
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let result = ParameterSpace::builder()
            .add_float_param("lr", vec![0.1, f64::INFINITY])
            .build();

        let Err(SearchError::InvalidConfiguration { message }) = result else {
            panic!("expected invalid configuration");
        };
        assert!(message.contains("'lr'"));

        let nested = ParameterSpace::builder()
            .add_param("weights", vec![vec![1.0, f64::NAN]])
            .build();
        assert!(nested.is_err());
    }

    #[test]
    fn test_combinations_are_independent_copies() {
        let grid = ParameterSpace::builder()
            .add_param("weights", vec![vec![1_i64, 2, 3]])
            .add_int_param("seed", vec![1, 2])
            .build()
            .unwrap();

        let mut combos = grid.combinations();
        combos[0] = Combination::default();

        assert_eq!(combos[1].get("weights"), Some(&ParamValue::from(vec![1_i64, 2, 3])));
        assert_eq!(grid.combinations()[0].len(), 2);
    }

    #[test]
    fn test_deserialize_preserves_order() {
        let grid: ParameterSpace = serde_json::from_str(r#"{"lr": [0.1, 0.01], "depth": [3]}"#)
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(grid.names(), ["lr", "depth"]);

        let empty = serde_json::from_str::<ParameterSpace>(r#"{"lr": []}"#);
        assert!(empty.is_err());
    }

    proptest! {
        #[test]
        fn prop_product_order_and_count(sizes in prop::collection::vec(1_usize..4, 1..5)) {
            let axes: Vec<(String, Vec<i64>)> = sizes
                .iter()
                .enumerate()
                .map(|(i, &n)| (format!("p{i}"), (0..n as i64).collect()))
                .collect();
            let grid = axes
                .iter()
                .fold(ParameterSpace::builder(), |b, (name, values)| {
                    b.add_int_param(name, values.clone())
                })
                .build()
                .unwrap();

            let combos = grid.combinations();
            let expected: usize = sizes.iter().product();
            prop_assert_eq!(combos.len(), expected);
            prop_assert_eq!(grid.total_combinations().unwrap(), expected);

            // Digit tuples must be strictly increasing, which rules out
            // duplicates and pins the lexicographic order.
            let tuples: Vec<Vec<i64>> = combos
                .iter()
                .map(|c| c.iter().map(|(_, v)| v.as_int().unwrap()).collect())
                .collect();
            for pair in tuples.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }

            for (index, combo) in combos.iter().enumerate() {
                let decoded = grid.combination_at(index);
                prop_assert_eq!(decoded.as_ref(), Some(combo));
            }
            prop_assert!(grid.combination_at(expected).is_none());
        }
    }
}
