//! 满足集的概率：主导迁移的发生时间落入满足集的概率。
use serde::{Deserialize, Serialize};

use crate::distribution::{Distribution, DistributionError};
use crate::interval::IntervalSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub probability: f64,
    pub threshold: f64,
    pub satisfied: bool,
}

pub fn probability(set: &IntervalSet, distribution: &Distribution) -> Result<f64, DistributionError> {
    set.measure_against(distribution)
}

/// Probability for a firing delay that starts at `origin`: the set is moved
/// onto the delay's own time axis and cut at zero.
pub fn probability_from(
    set: &IntervalSet,
    distribution: &Distribution,
    origin: f64,
) -> Result<f64, DistributionError> {
    let relative = set.shift(-origin).clip(0.0, f64::INFINITY);
    probability(&relative, distribution)
}

pub fn verdict(
    set: &IntervalSet,
    distribution: &Distribution,
    threshold: f64,
) -> Result<Verdict, DistributionError> {
    let probability = probability(set, distribution)?;
    Ok(Verdict {
        probability,
        threshold,
        satisfied: probability >= threshold,
    })
}
