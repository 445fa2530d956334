//! Small statistics toolkit: means, bootstrap confidence intervals and
//! Cohen's d effect sizes.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator). Zero for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

pub fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

/// Percentile bootstrap interval for the mean of `values`.
///
/// The caller owns the RNG so results are reproducible for a given seed and
/// value order.
pub fn bootstrap_mean_ci<R: Rng>(
    values: &[f64],
    resamples: usize,
    level: f64,
    rng: &mut R,
) -> ConfidenceInterval {
    let n = values.len();
    if n == 0 || resamples == 0 {
        let m = mean(values);
        return ConfidenceInterval {
            lower: m,
            upper: m,
            level,
        };
    }

    let mut means: Vec<f64> = (0..resamples)
        .map(|_| {
            let sum: f64 = (0..n).map(|_| values[crate::seed::index_below(rng, n)]).sum();
            sum / n as f64
        })
        .collect();
    means.sort_by(f64::total_cmp);

    let alpha = (1.0 - level.clamp(0.0, 1.0)) / 2.0;
    ConfidenceInterval {
        lower: percentile_sorted(&means, alpha),
        upper: percentile_sorted(&means, 1.0 - alpha),
        level,
    }
}

/// Linear-interpolated percentile of an ascending slice, `q` in [0, 1].
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

// ---------------------------------------------------------------------------
// Effect size
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectMagnitude {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectMagnitude {
    /// Conventional Cohen thresholds: 0.2 / 0.5 / 0.8.
    pub fn classify(d: f64) -> Self {
        let d = d.abs();
        if d < 0.2 {
            Self::Negligible
        } else if d < 0.5 {
            Self::Small
        } else if d < 0.8 {
            Self::Medium
        } else {
            Self::Large
        }
    }
}

impl fmt::Display for EffectMagnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negligible => write!(f, "negligible"),
            Self::Small => write!(f, "small"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
        }
    }
}

/// Cohen's d of `a` over `b` with pooled standard deviation.
///
/// `None` when either side has fewer than two values. When the pooled
/// deviation is zero, identical means give 0 and differing means `None`.
pub fn cohens_d(a: &[f64], b: &[f64]) -> Option<f64> {
    let (na, nb) = (a.len(), b.len());
    if na < 2 || nb < 2 {
        return None;
    }
    let pooled = (((na - 1) as f64 * sample_variance(a) + (nb - 1) as f64 * sample_variance(b))
        / (na + nb - 2) as f64)
        .sqrt();
    let diff = mean(a) - mean(b);
    if pooled == 0.0 {
        return (diff == 0.0).then_some(0.0);
    }
    Some(diff / pooled)
}
