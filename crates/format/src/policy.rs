//! Equivalence policies decide whether two successful responses should be considered the same.
//!
//! Every policy boils down to a structural comparison of the two payloads. The policies only
//! differ in how the payloads are prepared before the comparison (fields removed, collections
//! sorted) and in whether numeric leaves are compared with a tolerance.

use std::{collections::BTreeSet, fmt::Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field_path::{FieldPath, Location, LocationSegment};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquivalencePolicy {
    /// Both payloads must be structurally identical. Object key order is irrelevant.
    #[default]
    ExactMatch,

    /// The given fields are removed from both payloads before they're compared exactly.
    IgnoreFields(BTreeSet<FieldPath>),

    /// Numbers at the declared fields may differ by at most `epsilon`. When no fields are declared
    /// the tolerance applies to every JSON number in the payload. Everything else must match
    /// exactly.
    ///
    /// Declared fields may also hold numbers encoded as strings, which is how most nodes encode
    /// big integers.
    NumericTolerance {
        epsilon: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<BTreeSet<FieldPath>>,
    },

    /// The collections at the given fields are compared as unordered multisets. Everything else
    /// must match exactly.
    SetEquality(BTreeSet<FieldPath>),

    /// The case is never dispatched.
    AlwaysSkip,
}

impl EquivalencePolicy {
    /// Checks the policy for definitions that can never be evaluated in a meaningful way.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::ExactMatch | Self::AlwaysSkip => Ok(()),
            Self::IgnoreFields(fields) => {
                if fields.is_empty() {
                    return Err("`ignore_fields` requires at least one field".to_string());
                }
                if fields.iter().any(FieldPath::is_root) {
                    return Err("`ignore_fields` can't ignore the whole payload".to_string());
                }
                Ok(())
            }
            Self::NumericTolerance { epsilon, fields } => {
                if !epsilon.is_finite() || *epsilon < 0.0 {
                    return Err(format!(
                        "`numeric_tolerance` requires a finite non-negative epsilon, got {epsilon}"
                    ));
                }
                if fields.as_ref().is_some_and(BTreeSet::is_empty) {
                    return Err(
                        "`numeric_tolerance` fields must be omitted or non-empty".to_string()
                    );
                }
                Ok(())
            }
            Self::SetEquality(fields) if fields.is_empty() => {
                Err("`set_equality` requires at least one field".to_string())
            }
            Self::SetEquality(_) => Ok(()),
        }
    }

    /// Compares the two payloads under this policy. Deterministic and free of side effects.
    pub fn evaluate(&self, reference: &Value, candidate: &Value) -> Evaluation {
        let result = match self {
            Self::AlwaysSkip => return Evaluation::Skipped,
            Self::ExactMatch => compare(reference, candidate, &mut Location::default(), None),
            Self::IgnoreFields(fields) => {
                let (mut reference, mut candidate) = (reference.clone(), candidate.clone());
                for field in fields {
                    field.remove_from(&mut reference);
                    field.remove_from(&mut candidate);
                }
                compare(&reference, &candidate, &mut Location::default(), None)
            }
            Self::NumericTolerance { epsilon, fields } => {
                let tolerance = Tolerance {
                    epsilon: *epsilon,
                    fields: fields.as_ref(),
                };
                compare(
                    reference,
                    candidate,
                    &mut Location::default(),
                    Some(&tolerance),
                )
            }
            Self::SetEquality(fields) => {
                let (mut reference, mut candidate) = (reference.clone(), candidate.clone());
                for field in fields {
                    field.sort_collections_in(&mut reference);
                    field.sort_collections_in(&mut candidate);
                }
                compare(&reference, &candidate, &mut Location::default(), None)
            }
        };

        match result {
            Ok(()) => Evaluation::Equivalent,
            Err(divergence) => Evaluation::Divergent(divergence),
        }
    }
}

impl Display for EquivalencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |fields: &BTreeSet<FieldPath>| {
            fields
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Self::ExactMatch => f.write_str("exact match"),
            Self::IgnoreFields(fields) => write!(f, "ignore fields [{}]", join(fields)),
            Self::NumericTolerance {
                epsilon,
                fields: None,
            } => write!(f, "numeric tolerance {epsilon}"),
            Self::NumericTolerance {
                epsilon,
                fields: Some(fields),
            } => write!(f, "numeric tolerance {epsilon} on [{}]", join(fields)),
            Self::SetEquality(fields) => write!(f, "set equality on [{}]", join(fields)),
            Self::AlwaysSkip => f.write_str("always skip"),
        }
    }
}

/// The result of evaluating a policy over two payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    Equivalent,
    Divergent(Divergence),
    Skipped,
}

/// The first place at which two payloads were found to differ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// A JSON-path like pointer into the payloads, `$` being the payload itself.
    pub location: String,
    pub description: String,
}

impl Display for Divergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at `{}`: {}", self.location, self.description)
    }
}

struct Tolerance<'a> {
    epsilon: f64,
    fields: Option<&'a BTreeSet<FieldPath>>,
}

impl Tolerance<'_> {
    fn numeric_values(
        &self,
        location: &Location,
        a: &Value,
        b: &Value,
    ) -> Option<(Numeric, Numeric)> {
        match self.fields {
            None => match (a, b) {
                (Value::Number(a), Value::Number(b)) => {
                    Some((Numeric::parse(&a.to_string())?, Numeric::parse(&b.to_string())?))
                }
                _ => None,
            },
            Some(fields) if fields.iter().any(|field| field.matches(location)) => {
                Some((Numeric::from_value(a)?, Numeric::from_value(b)?))
            }
            Some(_) => None,
        }
    }

    fn accepts(&self, a: Numeric, b: Numeric) -> bool {
        match (a, b) {
            (Numeric::Integer(a), Numeric::Integer(b)) => match a.checked_sub(b) {
                // Saturates for epsilons beyond the integer range.
                Some(difference) => difference.unsigned_abs() <= self.epsilon as u128,
                None => (a as f64 - b as f64).abs() <= self.epsilon,
            },
            (a, b) => (a.as_f64() - b.as_f64()).abs() <= self.epsilon,
        }
    }
}

/// A number as found in a payload. Integers are kept exact, the big integers nodes encode as
/// strings included.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Numeric {
    Integer(i128),
    Float(f64),
}

impl Numeric {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Self::parse(&number.to_string()),
            Value::String(string) => Self::parse(string),
            _ => None,
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text.parse::<i128>() {
            Ok(integer) => Some(Self::Integer(integer)),
            Err(_) => text
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .map(Self::Float),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Integer(integer) => integer as f64,
            Self::Float(float) => float,
        }
    }
}

fn compare(
    reference: &Value,
    candidate: &Value,
    location: &mut Location,
    tolerance: Option<&Tolerance<'_>>,
) -> Result<(), Divergence> {
    let divergence = |location: &Location, description: String| Divergence {
        location: location.to_string(),
        description,
    };

    let numbers = tolerance.and_then(|tolerance| {
        let (a, b) = tolerance.numeric_values(location, reference, candidate)?;
        Some((tolerance, a, b))
    });
    if let Some((tolerance, a, b)) = numbers {
        return if tolerance.accepts(a, b) {
            Ok(())
        } else {
            Err(divergence(
                location,
                format!(
                    "{reference} and {candidate} differ by more than {}",
                    tolerance.epsilon
                ),
            ))
        };
    }

    match (reference, candidate) {
        (Value::Object(reference), Value::Object(candidate)) => {
            for (key, reference_value) in reference.iter() {
                location.push(LocationSegment::Key(key.clone()));
                let Some(candidate_value) = candidate.get(key) else {
                    return Err(divergence(
                        location,
                        "field is missing from the candidate response".to_string(),
                    ));
                };
                compare(reference_value, candidate_value, location, tolerance)?;
                location.pop();
            }
            if let Some(key) = candidate.keys().find(|key| !reference.contains_key(*key)) {
                location.push(LocationSegment::Key(key.clone()));
                return Err(divergence(
                    location,
                    "field is missing from the reference response".to_string(),
                ));
            }
            Ok(())
        }
        (Value::Array(reference), Value::Array(candidate)) => {
            if reference.len() != candidate.len() {
                return Err(divergence(
                    location,
                    format!(
                        "reference has {} elements but candidate has {}",
                        reference.len(),
                        candidate.len()
                    ),
                ));
            }
            for (index, (reference, candidate)) in reference.iter().zip(candidate).enumerate() {
                location.push(LocationSegment::Index(index));
                compare(reference, candidate, location, tolerance)?;
                location.pop();
            }
            Ok(())
        }
        (reference, candidate) if reference == candidate => Ok(()),
        (reference, candidate) => Err(divergence(
            location,
            format!("reference has {reference} but candidate has {candidate}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(paths: &[&str]) -> BTreeSet<FieldPath> {
        paths.iter().map(|path| path.parse().unwrap()).collect()
    }

    fn divergence(evaluation: Evaluation) -> Divergence {
        match evaluation {
            Evaluation::Divergent(divergence) => divergence,
            other => panic!("expected a divergence, got {other:?}"),
        }
    }

    #[test]
    fn exact_match_ignores_key_order() {
        let reference: Value = serde_json::from_str(r#"{"Height": 10, "Cids": ["a"]}"#).unwrap();
        let candidate: Value = serde_json::from_str(r#"{"Cids": ["a"], "Height": 10}"#).unwrap();

        assert_eq!(
            EquivalencePolicy::ExactMatch.evaluate(&reference, &candidate),
            Evaluation::Equivalent
        );
    }

    #[test]
    fn exact_match_points_at_the_first_difference() {
        let divergence = divergence(EquivalencePolicy::ExactMatch.evaluate(
            &json!({ "Blocks": [{ "Miner": "f01" }, { "Miner": "f02" }] }),
            &json!({ "Blocks": [{ "Miner": "f01" }, { "Miner": "f03" }] }),
        ));

        assert_eq!(divergence.location, "$.Blocks[1].Miner");
        assert!(divergence.description.contains("\"f02\""));
        assert!(divergence.description.contains("\"f03\""));
    }

    #[test]
    fn exact_match_detects_missing_fields_on_either_side() {
        let policy = EquivalencePolicy::ExactMatch;

        let missing_in_candidate = divergence(policy.evaluate(&json!({ "a": 1 }), &json!({})));
        assert_eq!(missing_in_candidate.location, "$.a");

        let missing_in_reference = divergence(policy.evaluate(&json!({}), &json!({ "b": 1 })));
        assert_eq!(missing_in_reference.location, "$.b");
    }

    #[test]
    fn ignored_fields_make_otherwise_identical_payloads_match() {
        let reference = json!({ "timestamp": 1700000000, "height": 42 });
        let candidate = json!({ "timestamp": 1700000007, "height": 42 });

        let ignore = EquivalencePolicy::IgnoreFields(fields(&["timestamp"]));
        assert_eq!(ignore.evaluate(&reference, &candidate), Evaluation::Equivalent);
        assert!(matches!(
            EquivalencePolicy::ExactMatch.evaluate(&reference, &candidate),
            Evaluation::Divergent(_)
        ));
    }

    #[test]
    fn ignored_fields_do_not_hide_other_differences() {
        let ignore = EquivalencePolicy::IgnoreFields(fields(&["timestamp"]));
        let divergence = divergence(ignore.evaluate(
            &json!({ "timestamp": 1, "height": 42 }),
            &json!({ "timestamp": 2, "height": 43 }),
        ));
        assert_eq!(divergence.location, "$.height");
    }

    #[test]
    fn numeric_tolerance_applies_to_bare_numbers() {
        let policy = EquivalencePolicy::NumericTolerance {
            epsilon: 0.01,
            fields: None,
        };

        assert_eq!(
            policy.evaluate(&json!(100.00), &json!(100.004)),
            Evaluation::Equivalent
        );
        assert!(matches!(
            policy.evaluate(&json!(100.00), &json!(100.02)),
            Evaluation::Divergent(_)
        ));
    }

    #[test]
    fn numeric_tolerance_only_relaxes_declared_fields() {
        let policy = EquivalencePolicy::NumericTolerance {
            epsilon: 5.0,
            fields: Some(fields(&["Power.RawBytePower"])),
        };
        let reference = json!({ "Power": { "RawBytePower": "1000", "QualityAdjPower": "10" } });

        let within = json!({ "Power": { "RawBytePower": "1004", "QualityAdjPower": "10" } });
        assert_eq!(policy.evaluate(&reference, &within), Evaluation::Equivalent);

        let other_field = json!({ "Power": { "RawBytePower": "1000", "QualityAdjPower": "11" } });
        assert_eq!(
            divergence(policy.evaluate(&reference, &other_field)).location,
            "$.Power.QualityAdjPower"
        );
    }

    #[test]
    fn numeric_tolerance_compares_big_integer_strings_exactly() {
        let policy = EquivalencePolicy::NumericTolerance {
            epsilon: 0.0,
            fields: Some(fields(&["RawBytePower"])),
        };

        assert!(matches!(
            policy.evaluate(
                &json!({ "RawBytePower": "23456789012345678901" }),
                &json!({ "RawBytePower": "23456789012345678902" }),
            ),
            Evaluation::Divergent(_)
        ));
        assert_eq!(
            policy.evaluate(
                &json!({ "RawBytePower": "123456789012345678901234567" }),
                &json!({ "RawBytePower": "123456789012345678901234567" }),
            ),
            Evaluation::Equivalent
        );

        let tolerant = EquivalencePolicy::NumericTolerance {
            epsilon: 1000000.0,
            fields: Some(fields(&["FilCirculating"])),
        };
        assert_eq!(
            tolerant.evaluate(
                &json!({ "FilCirculating": "123456789012345678900000000" }),
                &json!({ "FilCirculating": "123456789012345678901000000" }),
            ),
            Evaluation::Equivalent
        );
        assert!(matches!(
            tolerant.evaluate(
                &json!({ "FilCirculating": "123456789012345678900000000" }),
                &json!({ "FilCirculating": "123456789012345678901000001" }),
            ),
            Evaluation::Divergent(_)
        ));
    }

    #[test]
    fn numeric_tolerance_keeps_integers_beyond_f64_precision_exact() {
        let policy = EquivalencePolicy::NumericTolerance {
            epsilon: 0.0,
            fields: None,
        };
        let reference: Value = serde_json::from_str("9007199254740993").unwrap();
        let candidate: Value = serde_json::from_str("9007199254740992").unwrap();

        assert!(matches!(
            policy.evaluate(&reference, &candidate),
            Evaluation::Divergent(_)
        ));
        assert_eq!(policy.evaluate(&reference, &reference), Evaluation::Equivalent);
    }

    #[test]
    fn numeric_tolerance_without_fields_does_not_parse_strings() {
        let policy = EquivalencePolicy::NumericTolerance {
            epsilon: 10.0,
            fields: None,
        };
        assert!(matches!(
            policy.evaluate(&json!({ "Balance": "100" }), &json!({ "Balance": "101" })),
            Evaluation::Divergent(_)
        ));
    }

    #[test]
    fn set_equality_ignores_order_but_not_multiplicity() {
        let policy = EquivalencePolicy::SetEquality(fields(&["$"]));

        assert_eq!(
            policy.evaluate(&json!(["b", "a", "a"]), &json!(["a", "b", "a"])),
            Evaluation::Equivalent
        );
        assert!(matches!(
            policy.evaluate(&json!(["a", "a", "b"]), &json!(["a", "b", "b"])),
            Evaluation::Divergent(_)
        ));
    }

    #[test]
    fn set_equality_handles_collections_of_objects() {
        let policy = EquivalencePolicy::SetEquality(fields(&["Addrs"]));

        assert_eq!(
            policy.evaluate(
                &json!({ "ID": "peer", "Addrs": [{ "a": 1, "b": 2 }, { "a": 3 }] }),
                &json!({ "ID": "peer", "Addrs": [{ "a": 3 }, { "b": 2, "a": 1 }] }),
            ),
            Evaluation::Equivalent
        );
        assert!(matches!(
            policy.evaluate(
                &json!({ "ID": "peer", "Addrs": [] }),
                &json!({ "ID": "other", "Addrs": [] }),
            ),
            Evaluation::Divergent(_)
        ));
    }

    #[test]
    fn always_skip_never_compares() {
        assert_eq!(
            EquivalencePolicy::AlwaysSkip.evaluate(&json!(1), &json!(2)),
            Evaluation::Skipped
        );
    }

    #[test]
    fn policies_deserialize_from_their_catalog_representation() {
        let policies: Vec<EquivalencePolicy> = serde_json::from_value(json!([
            "exact_match",
            { "ignore_fields": ["timestamp", "Blocks.Timestamp"] },
            { "numeric_tolerance": { "epsilon": 0.01 } },
            { "numeric_tolerance": { "epsilon": 10, "fields": ["Height"] } },
            { "set_equality": ["$"] },
            "always_skip"
        ]))
        .unwrap();

        assert_eq!(
            policies,
            vec![
                EquivalencePolicy::ExactMatch,
                EquivalencePolicy::IgnoreFields(fields(&["timestamp", "Blocks.Timestamp"])),
                EquivalencePolicy::NumericTolerance {
                    epsilon: 0.01,
                    fields: None
                },
                EquivalencePolicy::NumericTolerance {
                    epsilon: 10.0,
                    fields: Some(fields(&["Height"]))
                },
                EquivalencePolicy::SetEquality(fields(&["$"])),
                EquivalencePolicy::AlwaysSkip,
            ]
        );
    }

    #[test]
    fn unknown_policy_kinds_are_rejected() {
        assert!(serde_json::from_value::<EquivalencePolicy>(json!("roughly_equal")).is_err());
    }

    #[test]
    fn validation_rejects_unusable_policies() {
        let invalid = [
            EquivalencePolicy::IgnoreFields(BTreeSet::new()),
            EquivalencePolicy::IgnoreFields(fields(&["$"])),
            EquivalencePolicy::SetEquality(BTreeSet::new()),
            EquivalencePolicy::NumericTolerance {
                epsilon: -1.0,
                fields: None,
            },
            EquivalencePolicy::NumericTolerance {
                epsilon: f64::NAN,
                fields: None,
            },
            EquivalencePolicy::NumericTolerance {
                epsilon: 1.0,
                fields: Some(BTreeSet::new()),
            },
        ];
        for policy in invalid {
            assert!(policy.validate().is_err(), "{policy:?} should be invalid");
        }
        assert!(EquivalencePolicy::ExactMatch.validate().is_ok());
    }
}
