//! Parameter sweeps for batch testing.
//!
//! A sweep is a JSON object where each key maps to either a list of string
//! choices or a numeric range `{"min": .., "max": .., "step": ..}`:
//!
//! ```json
//! {
//!   "sampler": ["euler", "dpmpp_2m"],
//!   "3.inputs.cfg": {"min": 4, "max": 8, "step": 2}
//! }
//! ```
//!
//! [`SweepSpec::expand`] turns it into the cartesian product of
//! [`Variation`]s, one [`OverrideKind::Named`] override per key.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::paths::OverrideKind;
use crate::variation::Variation;

/// Upper bound on the number of variations a single sweep may expand to.
pub const MAX_SWEEP_VARIATIONS: usize = 1024;

/// Keys a range object must have, exactly.
const RANGE_KEYS: [&str; 3] = ["max", "min", "step"];

/// Tolerance when counting range steps, so `0.1 + 0.1 + 0.1` reaches `0.3`.
const RANGE_EPSILON: f64 = 1e-9;

/// One swept dimension.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepAxis {
    Choices(Vec<String>),
    Range { min: f64, max: f64, step: f64 },
}

impl SweepAxis {
    /// Number of values along this axis.
    pub fn len(&self) -> usize {
        match self {
            Self::Choices(items) => items.len(),
            Self::Range { min, max, step } => range_count(*min, *max, *step).unwrap_or(usize::MAX),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The axis values as JSON. Ranges with integral bounds and step yield
    /// integers, otherwise floats.
    pub fn values(&self) -> Vec<serde_json::Value> {
        match self {
            Self::Choices(items) => items.iter().cloned().map(serde_json::Value::String).collect(),
            Self::Range { min, step, .. } => {
                let integral = min.fract() == 0.0 && step.fract() == 0.0;
                (0..self.len())
                    .map(|i| {
                        let v = min + step * i as f64;
                        if integral {
                            serde_json::Value::from(v as i64)
                        } else {
                            serde_json::Number::from_f64(v)
                                .map(serde_json::Value::Number)
                                .unwrap_or(serde_json::Value::Null)
                        }
                    })
                    .collect()
            }
        }
    }
}

/// A validated sweep specification.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    axes: BTreeMap<String, SweepAxis>,
}

impl SweepSpec {
    /// Parse and validate sweep JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("Invalid JSON: {e}")))?;
        Self::parse(&value)
    }

    /// Validate a sweep document.
    pub fn parse(value: &serde_json::Value) -> Result<Self, CoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| CoreError::Validation("Input must be a JSON object".into()))?;
        if obj.is_empty() {
            return Err(CoreError::Validation(
                "Sweep must define at least one key".into(),
            ));
        }

        let mut axes = BTreeMap::new();
        for (key, value) in obj {
            axes.insert(key.clone(), parse_axis(key, value)?);
        }

        let spec = Self { axes };
        let count = spec.variation_count();
        if count > MAX_SWEEP_VARIATIONS {
            return Err(CoreError::Validation(format!(
                "Sweep expands to {count} variations, maximum is {MAX_SWEEP_VARIATIONS}"
            )));
        }
        Ok(spec)
    }

    pub fn axes(&self) -> &BTreeMap<String, SweepAxis> {
        &self.axes
    }

    /// Size of the cartesian product (saturating).
    pub fn variation_count(&self) -> usize {
        self.axes
            .values()
            .fold(1usize, |acc, axis| acc.saturating_mul(axis.len()))
    }

    /// Expand into variations. Keys iterate in sorted order with the last
    /// key varying fastest.
    pub fn expand(&self) -> Vec<Variation> {
        let mut variations = vec![Variation::new()];
        for (key, axis) in &self.axes {
            let values = axis.values();
            variations = variations
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |value| {
                        base.clone()
                            .with_value(OverrideKind::Named(key.clone()), value.clone())
                    })
                })
                .collect();
        }
        variations
    }
}

fn parse_axis(key: &str, value: &serde_json::Value) -> Result<SweepAxis, CoreError> {
    match value {
        serde_json::Value::Array(items) => {
            let choices = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "All items in the list must be strings at key '{key}'"
                    ))
                })?;
            if choices.is_empty() {
                return Err(CoreError::Validation(format!(
                    "List at key '{key}' must not be empty"
                )));
            }
            Ok(SweepAxis::Choices(choices))
        }
        serde_json::Value::Object(range) => {
            let mut keys: Vec<&str> = range.keys().map(String::as_str).collect();
            keys.sort_unstable();
            if keys != RANGE_KEYS {
                return Err(CoreError::Validation(format!(
                    "Object at key '{key}' must have keys {{min, max, step}}"
                )));
            }
            let number = |k: &str| {
                range[k].as_f64().ok_or_else(|| {
                    CoreError::Validation(format!(
                        "Value of '{k}' at key '{key}' must be a number"
                    ))
                })
            };
            let (min, max, step) = (number("min")?, number("max")?, number("step")?);
            if !(min.is_finite() && max.is_finite() && step.is_finite()) {
                return Err(CoreError::Validation(format!(
                    "Range at key '{key}' must have finite bounds and step"
                )));
            }
            if step <= 0.0 {
                return Err(CoreError::Validation(format!(
                    "Step at key '{key}' must be positive"
                )));
            }
            if min > max {
                return Err(CoreError::Validation(format!(
                    "Min at key '{key}' must not exceed max"
                )));
            }
            match range_count(min, max, step) {
                Some(count) if count <= MAX_SWEEP_VARIATIONS => Ok(SweepAxis::Range { min, max, step }),
                _ => Err(CoreError::Validation(format!(
                    "Range at key '{key}' has more than {MAX_SWEEP_VARIATIONS} values"
                ))),
            }
        }
        _ => Err(CoreError::Validation(format!(
            "Value at key '{key}' must be either a list of strings or an object with 'min', 'max', 'step'"
        ))),
    }
}

/// Number of values in `min..=max` by `step`, or `None` when the count
/// is not finite or does not fit in a `usize`.
fn range_count(min: f64, max: f64, step: f64) -> Option<usize> {
    let steps = ((max - min) / step + RANGE_EPSILON).floor();
    if !steps.is_finite() || steps < 0.0 || steps >= usize::MAX as f64 {
        return None;
    }
    (steps as usize).checked_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn rejects_non_object() {
        assert_matches!(SweepSpec::parse(&json!([1])), Err(CoreError::Validation(m)) if m.contains("JSON object"));
        assert_matches!(SweepSpec::from_json_str("nope"), Err(CoreError::Validation(m)) if m.starts_with("Invalid JSON"));
    }

    #[test]
    fn rejects_non_string_choices() {
        let err = SweepSpec::parse(&json!({"sampler": ["euler", 3]})).unwrap_err();
        assert_matches!(err, CoreError::Validation(m) if m.contains("'sampler'"));
    }

    #[test]
    fn rejects_wrong_range_keys() {
        let err = SweepSpec::parse(&json!({"cfg": {"min": 1, "max": 2}})).unwrap_err();
        assert_matches!(err, CoreError::Validation(m) if m.contains("min, max, step"));
        let err = SweepSpec::parse(&json!({"cfg": {"min": 1, "max": 2, "step": 1, "x": 0}})).unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }

    #[test]
    fn rejects_non_numeric_range_values() {
        let err = SweepSpec::parse(&json!({"cfg": {"min": "1", "max": 2, "step": 1}})).unwrap_err();
        assert_matches!(err, CoreError::Validation(m) if m.contains("'min'"));
    }

    #[test]
    fn rejects_scalar_values() {
        assert!(SweepSpec::parse(&json!({"cfg": 7})).is_err());
    }

    #[test]
    fn rejects_degenerate_ranges() {
        assert!(SweepSpec::parse(&json!({"cfg": {"min": 1, "max": 2, "step": 0}})).is_err());
        assert!(SweepSpec::parse(&json!({"cfg": {"min": 3, "max": 2, "step": 1}})).is_err());
    }

    #[test]
    fn rejects_huge_ranges_without_overflow() {
        let err = SweepSpec::parse(&json!({"cfg": {"min": 0, "max": 1e30, "step": 1}})).unwrap_err();
        assert_matches!(err, CoreError::Validation(m) if m.contains("more than 1024"));

        // The span itself overflows to infinity.
        let err = SweepSpec::parse(&json!({"cfg": {"min": -1e308, "max": 1e308, "step": 1}})).unwrap_err();
        assert_matches!(err, CoreError::Validation(_));

        let err = SweepSpec::parse(&json!({"cfg": {"min": 0, "max": 1, "step": 1e-300}})).unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }

    #[test]
    fn range_count_handles_extremes() {
        assert_eq!(range_count(0.0, 1e30, 1.0), None);
        assert_eq!(range_count(0.0, f64::INFINITY, 1.0), None);
        assert_eq!(range_count(0.0, 1.0, f64::NAN), None);
        assert_eq!(range_count(4.0, 8.0, 2.0), Some(3));
        assert_eq!(
            SweepAxis::Range { min: 0.0, max: 1e30, step: 1.0 }.len(),
            usize::MAX
        );
    }

    #[test]
    fn largest_allowed_range_parses() {
        let spec = SweepSpec::parse(&json!({"steps": {"min": 1, "max": 1024, "step": 1}})).unwrap();
        assert_eq!(spec.variation_count(), MAX_SWEEP_VARIATIONS);
    }

    #[test]
    fn integral_range_yields_integers() {
        let spec = SweepSpec::parse(&json!({"steps": {"min": 10, "max": 30, "step": 10}})).unwrap();
        assert_eq!(spec.axes()["steps"].values(), vec![json!(10), json!(20), json!(30)]);
    }

    #[test]
    fn fractional_range_reaches_max() {
        let spec = SweepSpec::parse(&json!({"denoise": {"min": 0.1, "max": 0.3, "step": 0.1}})).unwrap();
        assert_eq!(spec.axes()["denoise"].len(), 3);
    }

    #[test]
    fn expand_is_cartesian_with_last_key_fastest() {
        let spec = SweepSpec::parse(&json!({
            "a": ["x", "y"],
            "b": {"min": 1, "max": 3, "step": 1},
        }))
        .unwrap();
        let variations = spec.expand();
        assert_eq!(variations.len(), 6);
        assert_eq!(spec.variation_count(), 6);

        let a = OverrideKind::Named("a".into());
        let b = OverrideKind::Named("b".into());
        assert_eq!(variations[0].get(&a), Some(&json!("x")));
        assert_eq!(variations[0].get(&b), Some(&json!(1)));
        assert_eq!(variations[1].get(&b), Some(&json!(2)));
        assert_eq!(variations[3].get(&a), Some(&json!("y")));
    }

    #[test]
    fn rejects_oversized_products() {
        let choices: Vec<String> = (0..40).map(|i| i.to_string()).collect();
        let err = SweepSpec::parse(&json!({"a": choices.clone(), "b": choices})).unwrap_err();
        assert_matches!(err, CoreError::Validation(m) if m.contains("1600"));
    }
}
