//! The bucket processor: fold one dimension's contributions into a value.
//!
//! `compose` is a pure, synchronous function. Contributions may arrive in
//! any order; same-bucket entries are sorted by (priority, system, value)
//! before folding, so identical multisets always produce identical output.
//! Buckets apply in the fixed global sequence
//! `Additive → Multiplicative → PostAdditive → Override`, followed by any
//! declared extension buckets in declaration order.

use thiserror::Error;

use crate::bucket::Bucket;
use crate::combiner::{CombinerRule, ExtensionOp, MultMode, RuleTable};
use crate::contribution::Contribution;

/// Errors raised at the point of composition.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("dimension {dimension}: non-finite value from system {system} in {bucket} bucket")]
    NonFinite {
        dimension: String,
        system: String,
        bucket: Bucket,
    },

    #[error("dimension {dimension}: running value became non-finite in {bucket} bucket")]
    NonFiniteResult { dimension: String, bucket: Bucket },

    #[error("dimension {dimension}: bucket {bucket} is not legal for this dimension")]
    BucketNotAllowed { dimension: String, bucket: Bucket },

    #[error("dimension {dimension}: unknown extension bucket {name}")]
    UnknownExtension { dimension: String, name: String },
}

pub type Result<T> = std::result::Result<T, ComposeError>;

/// Deterministic order within a bucket: priority ascending (`None` as 0),
/// then system id, then value bits as a stable tiebreak. The
/// highest-priority entry sorts last, so override folds resolve to it.
fn sort_contributions(entries: &mut [&Contribution]) {
    entries.sort_by(|a, b| {
        a.effective_priority()
            .cmp(&b.effective_priority())
            .then_with(|| a.system.cmp(&b.system))
            .then_with(|| a.value.total_cmp(&b.value))
    });
}

/// Fold a dimension's contributions into one value.
///
/// The fold starts from the dimension's configured default (0 without a
/// rule); an empty contribution set resolves to that default directly.
/// Clamping against effective caps and rounding are the caller's final
/// steps, after the caps engine has run.
///
/// # Errors
///
/// A non-finite input or running value, an illegal bucket for the
/// dimension, or an undeclared extension bucket surface immediately; no
/// contribution is ever silently dropped.
pub fn compose(dimension: &str, contributions: &[Contribution], table: &RuleTable) -> Result<f64> {
    let default_rule = CombinerRule::default();
    let rule = table.rule(dimension).unwrap_or(&default_rule);
    let mut value = table.default_value(dimension);

    if contributions.is_empty() {
        return Ok(value);
    }

    // Reject bad inputs up front so a later bucket cannot mask them.
    for contribution in contributions {
        if !contribution.value.is_finite() {
            return Err(ComposeError::NonFinite {
                dimension: dimension.to_string(),
                system: contribution.system.clone(),
                bucket: contribution.bucket.clone(),
            });
        }
        if !rule.permits(&contribution.bucket) {
            return Err(ComposeError::BucketNotAllowed {
                dimension: dimension.to_string(),
                bucket: contribution.bucket.clone(),
            });
        }
        if let Bucket::Extension(name) = &contribution.bucket
            && table.extension(name).is_none()
        {
            return Err(ComposeError::UnknownExtension {
                dimension: dimension.to_string(),
                name: name.clone(),
            });
        }
    }

    for bucket in &Bucket::FIXED_ORDER {
        let mut entries: Vec<&Contribution> = contributions
            .iter()
            .filter(|c| c.bucket == *bucket)
            .collect();
        if entries.is_empty() {
            continue;
        }
        sort_contributions(&mut entries);

        value = match bucket {
            Bucket::Additive | Bucket::PostAdditive => {
                value + entries.iter().map(|c| c.value).sum::<f64>()
            }
            Bucket::Multiplicative => entries.iter().fold(value, |acc, c| match rule.mult_mode {
                MultMode::OnePlus => acc * (1.0 + c.value),
                MultMode::Direct => acc * c.value,
            }),
            // The sort leaves the highest-priority entry last; the fold's
            // final write is the replacement value.
            Bucket::Override => entries.iter().fold(value, |_, c| c.value),
            Bucket::Extension(_) => unreachable!("extensions are not in the fixed order"),
        };

        if !value.is_finite() {
            return Err(ComposeError::NonFiniteResult {
                dimension: dimension.to_string(),
                bucket: bucket.clone(),
            });
        }
    }

    for def in table.extensions() {
        let bucket = Bucket::Extension(def.name.clone());
        let mut entries: Vec<&Contribution> = contributions
            .iter()
            .filter(|c| c.bucket == bucket)
            .collect();
        if entries.is_empty() {
            continue;
        }
        sort_contributions(&mut entries);

        value = match def.op {
            ExtensionOp::Sum => value + entries.iter().map(|c| c.value).sum::<f64>(),
            ExtensionOp::Product => entries.iter().fold(value, |acc, c| acc * c.value),
            ExtensionOp::Max => entries.iter().fold(value, |acc, c| acc.max(c.value)),
            ExtensionOp::Min => entries.iter().fold(value, |acc, c| acc.min(c.value)),
            ExtensionOp::Average => {
                value + entries.iter().map(|c| c.value).sum::<f64>() / entries.len() as f64
            }
        };

        if !value.is_finite() {
            return Err(ComposeError::NonFiniteResult {
                dimension: dimension.to_string(),
                bucket: bucket.clone(),
            });
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::ExtensionBucketDef;

    fn contrib(system: &str, bucket: Bucket, value: f64) -> Contribution {
        Contribution::new("power", bucket, value, system)
    }

    #[test]
    fn additive_contributions_sum() {
        let table = RuleTable::new();
        let contributions = vec![
            contrib("equipment", Bucket::Additive, 10.0),
            contrib("buffs", Bucket::Additive, 15.0),
        ];
        let value = compose("power", &contributions, &table).unwrap();
        assert_eq!(value, 25.0);
    }

    #[test]
    fn multiplicative_applies_one_plus_factor() {
        let table = RuleTable::new();
        let contributions = vec![
            contrib("leveling", Bucket::Additive, 100.0),
            contrib("guild", Bucket::Multiplicative, 0.2),
        ];
        let value = compose("power", &contributions, &table).unwrap();
        assert_eq!(value, 120.0);
    }

    #[test]
    fn post_additive_lands_after_multiplication() {
        let table = RuleTable::new();
        let contributions = vec![
            contrib("base", Bucket::Additive, 100.0),
            contrib("buff", Bucket::Multiplicative, 0.5),
            contrib("relic", Bucket::PostAdditive, 7.0),
        ];
        let value = compose("power", &contributions, &table).unwrap();
        assert_eq!(value, 157.0);
    }

    #[test]
    fn override_highest_priority_wins() {
        let table = RuleTable::new();
        let contributions = vec![
            contrib("base", Bucket::Additive, 100.0),
            contrib("gm", Bucket::Override, 1.0).with_priority(10),
            contrib("event", Bucket::Override, 999.0).with_priority(5),
        ];
        let value = compose("power", &contributions, &table).unwrap();
        assert_eq!(value, 1.0);
    }

    #[test]
    fn output_is_order_independent() {
        let table = RuleTable::new();
        let mut contributions = vec![
            contrib("a", Bucket::Additive, 10.0),
            contrib("b", Bucket::Multiplicative, 0.1),
            contrib("c", Bucket::Additive, 5.0),
            contrib("d", Bucket::Override, 42.0).with_priority(1),
            contrib("e", Bucket::PostAdditive, 3.0),
        ];
        let expected = compose("power", &contributions, &table).unwrap();
        contributions.reverse();
        assert_eq!(compose("power", &contributions, &table).unwrap(), expected);
        contributions.swap(0, 2);
        assert_eq!(compose("power", &contributions, &table).unwrap(), expected);
    }

    #[test]
    fn empty_set_yields_configured_default() {
        let table =
            RuleTable::new().with_rule("power", CombinerRule::new().with_default(12.0));
        assert_eq!(compose("power", &[], &table).unwrap(), 12.0);
        assert_eq!(compose("unknown", &[], &table).unwrap(), 0.0);
    }

    #[test]
    fn non_finite_value_is_an_error() {
        let table = RuleTable::new();
        let contributions = vec![contrib("broken", Bucket::Additive, f64::NAN)];
        assert!(matches!(
            compose("power", &contributions, &table),
            Err(ComposeError::NonFinite { .. })
        ));
    }

    #[test]
    fn illegal_bucket_is_an_error() {
        let table = RuleTable::new()
            .with_rule("power", CombinerRule::new().with_allowed(vec![Bucket::Additive]));
        let contributions = vec![contrib("buff", Bucket::Multiplicative, 0.2)];
        assert!(matches!(
            compose("power", &contributions, &table),
            Err(ComposeError::BucketNotAllowed { .. })
        ));
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let table = RuleTable::new();
        let contributions = vec![contrib("mod", Bucket::Extension("chaos".into()), 2.0)];
        assert!(matches!(
            compose("power", &contributions, &table),
            Err(ComposeError::UnknownExtension { .. })
        ));
    }

    #[test]
    fn declared_extension_applies_after_fixed_buckets() {
        let table = RuleTable::new()
            .with_extension(ExtensionBucketDef::new("floor", ExtensionOp::Max));
        let contributions = vec![
            contrib("base", Bucket::Additive, 10.0),
            contrib("talisman", Bucket::Extension("floor".into()), 50.0),
        ];
        let value = compose("power", &contributions, &table).unwrap();
        assert_eq!(value, 50.0);
    }
}
