//! Operator buckets and their fixed application order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named operator category defining how same-bucket contributions combine.
///
/// The fixed buckets apply in a global sequence:
/// `Additive → Multiplicative → PostAdditive → Override`.
/// Extension buckets apply after `Override`, in the order they are declared
/// in the rule table (see [`RuleTable`]).
///
/// [`RuleTable`]: crate::combiner::RuleTable
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    /// Summed onto the running value first
    Additive,
    /// Folded as `×(1 + x)` factors (or `×x`, per the dimension's rule)
    Multiplicative,
    /// Summed after multiplication
    PostAdditive,
    /// Highest-priority entry replaces the running value entirely
    Override,
    /// A declared extension bucket, applied in declaration order
    Extension(String),
}

impl Bucket {
    /// Application rank of the fixed buckets. Extensions rank after all
    /// fixed buckets; their relative order comes from the rule table.
    pub fn rank(&self) -> u8 {
        match self {
            Bucket::Additive => 0,
            Bucket::Multiplicative => 1,
            Bucket::PostAdditive => 2,
            Bucket::Override => 3,
            Bucket::Extension(_) => 4,
        }
    }

    /// The four fixed buckets in application order.
    pub const FIXED_ORDER: [Bucket; 4] = [
        Bucket::Additive,
        Bucket::Multiplicative,
        Bucket::PostAdditive,
        Bucket::Override,
    ];
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Additive => write!(f, "additive"),
            Bucket::Multiplicative => write!(f, "multiplicative"),
            Bucket::PostAdditive => write!(f, "post-additive"),
            Bucket::Override => write!(f, "override"),
            Bucket::Extension(name) => write!(f, "extension:{}", name),
        }
    }
}
