//! Combiner rules: per-dimension composition policy.
//!
//! A [`RuleTable`] holds, per dimension, the legal bucket set and any
//! dimension-specific rounding or clamp rule, plus the ordered extension
//! bucket declarations. Tables arrive from the configuration source as
//! in-memory records and are validated here once, at registration time —
//! contradictory or cyclic declarations never reach a resolution pass.
//!
//! Hot reload is the runtime crate's concern: it swaps whole validated
//! tables copy-on-write, so a pass that loaded an older table keeps reading
//! it unchanged.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::bucket::Bucket;
use crate::caps::CapRange;

/// How multiplicative contributions fold for a dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum MultMode {
    /// Fold `×(1 + x)`: a value of 0.2 means +20%
    #[default]
    OnePlus,
    /// Fold `×x`: the value is the factor itself
    Direct,
}

/// Dimension-specific rounding applied after clamping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingPolicy {
    /// Keep the full floating-point value
    #[default]
    None,
    /// Round half away from zero to an integer (integer-only stats)
    Integer,
    /// Round to the given number of decimal places
    Decimals(u8),
}

impl RoundingPolicy {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            RoundingPolicy::None => value,
            RoundingPolicy::Integer => value.round(),
            RoundingPolicy::Decimals(places) => {
                let factor = 10f64.powi(*places as i32);
                (value * factor).round() / factor
            }
        }
    }
}

/// Operator for a declared extension bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ExtensionOp {
    /// Add the sum of the bucket's contributions to the running value
    Sum,
    /// Multiply the running value by each contribution
    Product,
    /// Raise the running value to at least each contribution
    Max,
    /// Lower the running value to at most each contribution
    Min,
    /// Add the mean of the bucket's contributions to the running value
    Average,
}

/// A declared extension bucket; applied after the fixed buckets, in
/// declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtensionBucketDef {
    pub name: String,
    pub op: ExtensionOp,
}

impl ExtensionBucketDef {
    pub fn new(name: impl Into<String>, op: ExtensionOp) -> Self {
        Self {
            name: name.into(),
            op,
        }
    }
}

/// Composition policy for one dimension.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinerRule {
    /// Legal buckets for this dimension; empty means every declared bucket
    /// is legal
    pub allowed: Vec<Bucket>,
    /// Value an empty contribution set resolves to, and the fold's starting
    /// point
    pub default: Option<f64>,
    /// Borrow the default from another dimension's rule (validated acyclic)
    pub default_from: Option<String>,
    /// Multiplicative fold semantics
    pub mult_mode: MultMode,
    /// Rounding applied after clamping
    pub rounding: RoundingPolicy,
    /// Fallback clamp range used when no effective caps cover the dimension
    pub clamp_default: Option<CapRange>,
}

impl CombinerRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the legal bucket set (builder style).
    pub fn with_allowed(mut self, allowed: Vec<Bucket>) -> Self {
        self.allowed = allowed;
        self
    }

    /// Set the default value (builder style).
    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the rounding policy (builder style).
    pub fn with_rounding(mut self, rounding: RoundingPolicy) -> Self {
        self.rounding = rounding;
        self
    }

    /// Set the fallback clamp range (builder style).
    pub fn with_clamp_default(mut self, clamp: CapRange) -> Self {
        self.clamp_default = Some(clamp);
        self
    }

    /// Whether a bucket is legal under this rule.
    pub fn permits(&self, bucket: &Bucket) -> bool {
        self.allowed.is_empty() || self.allowed.contains(bucket)
    }
}

/// Errors raised when validating a rule table at registration time.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("dimension {dimension}: default clamp range is invalid")]
    InvalidClamp { dimension: String },

    #[error("dimension {dimension}: default value must be finite")]
    InvalidDefault { dimension: String },

    #[error("dimension {dimension}: declares both a default and a default source")]
    ConflictingDefault { dimension: String },

    #[error("dimension {dimension}: default source {source_name} is not in the table")]
    MissingDefaultSource {
        dimension: String,
        source_name: String,
    },

    #[error("dimension {dimension}: cyclic default chain")]
    CyclicDefault { dimension: String },

    #[error("extension bucket name cannot be empty")]
    EmptyExtensionName,

    #[error("duplicate extension bucket: {0}")]
    DuplicateExtension(String),

    #[error("dimension {dimension}: references undeclared extension bucket {name}")]
    UndeclaredExtension { dimension: String, name: String },
}

/// Version-stamped table of combiner rules and extension declarations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    rules: HashMap<String, CombinerRule>,
    extensions: Vec<ExtensionBucketDef>,
    /// Version stamp advanced by the configuration source on each reload
    pub version: u64,
}

impl RuleTable {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            extensions: Vec::new(),
            version: 1,
        }
    }

    /// Add or replace a dimension rule (builder style).
    pub fn with_rule(mut self, dimension: impl Into<String>, rule: CombinerRule) -> Self {
        self.rules.insert(dimension.into(), rule);
        self
    }

    /// Declare an extension bucket (builder style); order is application
    /// order.
    pub fn with_extension(mut self, def: ExtensionBucketDef) -> Self {
        self.extensions.push(def);
        self
    }

    /// Look up the rule for a dimension.
    pub fn rule(&self, dimension: &str) -> Option<&CombinerRule> {
        self.rules.get(dimension)
    }

    /// Declared extension buckets in application order.
    pub fn extensions(&self) -> &[ExtensionBucketDef] {
        &self.extensions
    }

    /// Look up an extension declaration by name.
    pub fn extension(&self, name: &str) -> Option<&ExtensionBucketDef> {
        self.extensions.iter().find(|e| e.name == name)
    }

    /// Resolve a dimension's default value, following `default_from` chains.
    /// Safe after validation; a missing rule resolves to 0.
    pub fn default_value(&self, dimension: &str) -> f64 {
        let mut current = dimension;
        // Chain length is bounded by the table size once validated.
        for _ in 0..=self.rules.len() {
            match self.rules.get(current) {
                Some(rule) => {
                    if let Some(value) = rule.default {
                        return value;
                    }
                    match &rule.default_from {
                        Some(source) => current = source,
                        None => return 0.0,
                    }
                }
                None => return 0.0,
            }
        }
        0.0
    }

    /// Reject contradictory or cyclic rules before any resolution uses
    /// them.
    pub fn validate(&self) -> Result<(), RuleError> {
        let mut extension_names = HashSet::new();
        for ext in &self.extensions {
            if ext.name.is_empty() {
                return Err(RuleError::EmptyExtensionName);
            }
            if !extension_names.insert(ext.name.as_str()) {
                return Err(RuleError::DuplicateExtension(ext.name.clone()));
            }
        }

        for (dimension, rule) in &self.rules {
            if let Some(clamp) = &rule.clamp_default
                && (clamp.is_inverted() || clamp.min.is_nan() || clamp.max.is_nan())
            {
                return Err(RuleError::InvalidClamp {
                    dimension: dimension.clone(),
                });
            }
            if let Some(default) = rule.default
                && !default.is_finite()
            {
                return Err(RuleError::InvalidDefault {
                    dimension: dimension.clone(),
                });
            }
            if rule.default.is_some() && rule.default_from.is_some() {
                return Err(RuleError::ConflictingDefault {
                    dimension: dimension.clone(),
                });
            }
            for bucket in &rule.allowed {
                if let Bucket::Extension(name) = bucket
                    && !extension_names.contains(name.as_str())
                {
                    return Err(RuleError::UndeclaredExtension {
                        dimension: dimension.clone(),
                        name: name.clone(),
                    });
                }
            }
        }

        // Walk default_from chains; revisiting a dimension means a cycle.
        for dimension in self.rules.keys() {
            let mut visited = HashSet::new();
            let mut current = dimension.as_str();
            visited.insert(current);
            while let Some(rule) = self.rules.get(current) {
                let Some(source) = &rule.default_from else {
                    break;
                };
                if !self.rules.contains_key(source.as_str()) {
                    return Err(RuleError::MissingDefaultSource {
                        dimension: dimension.clone(),
                        source_name: source.clone(),
                    });
                }
                if !visited.insert(source.as_str()) {
                    return Err(RuleError::CyclicDefault {
                        dimension: dimension.clone(),
                    });
                }
                current = source;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_default_chain_is_rejected() {
        let table = RuleTable::new()
            .with_rule(
                "power",
                CombinerRule {
                    default_from: Some("might".into()),
                    ..CombinerRule::default()
                },
            )
            .with_rule(
                "might",
                CombinerRule {
                    default_from: Some("power".into()),
                    ..CombinerRule::default()
                },
            );
        assert!(matches!(table.validate(), Err(RuleError::CyclicDefault { .. })));
    }

    #[test]
    fn undeclared_extension_reference_is_rejected() {
        let table = RuleTable::new().with_rule(
            "power",
            CombinerRule::new().with_allowed(vec![
                Bucket::Additive,
                Bucket::Extension("exponential".into()),
            ]),
        );
        assert!(matches!(
            table.validate(),
            Err(RuleError::UndeclaredExtension { .. })
        ));
    }

    #[test]
    fn default_chain_resolves_through_source() {
        let table = RuleTable::new()
            .with_rule("power", CombinerRule::new().with_default(50.0))
            .with_rule(
                "might",
                CombinerRule {
                    default_from: Some("power".into()),
                    ..CombinerRule::default()
                },
            );
        table.validate().expect("table should validate");
        assert_eq!(table.default_value("might"), 50.0);
        assert_eq!(table.default_value("unknown"), 0.0);
    }

    #[test]
    fn inverted_default_clamp_is_rejected() {
        let table = RuleTable::new().with_rule(
            "power",
            CombinerRule::new().with_clamp_default(CapRange::new(10.0, 5.0)),
        );
        assert!(matches!(table.validate(), Err(RuleError::InvalidClamp { .. })));
    }

    #[test]
    fn rounding_policies() {
        assert_eq!(RoundingPolicy::Integer.apply(2.5), 3.0);
        assert_eq!(RoundingPolicy::Decimals(1).apply(1.25), 1.3);
        assert_eq!(RoundingPolicy::None.apply(2.5), 2.5);
    }
}
