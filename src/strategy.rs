use serde::{Deserialize, Serialize};

/// Tie-break policy selecting which side of a repair keeps or loses area
/// when a defect has more than one valid resolution.
///
/// Every repairer evaluates the policy against the *current* geometry state
/// of the working copy, so earlier repairs within the same call influence
/// later decisions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Modify the smaller member of the pair (gaps attach to their smallest
    /// neighbor).
    Smallest,
    /// Modify the larger member of the pair (gaps attach to their largest
    /// neighbor).
    #[default]
    Largest,
    /// Score both candidate outcomes by isoperimetric quotient
    /// (4π·area / perimeter²) and keep the more compact one.
    Compact,
    /// Take the first candidate in index order without comparing. Fast, and
    /// explicitly non-deterministic with respect to which member shrinks
    /// when the pair order is arbitrary.
    Arbitrary,
}
