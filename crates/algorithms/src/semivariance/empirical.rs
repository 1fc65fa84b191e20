//! Weighted empirical semivariogram
//!
//! Aggregates weighted point pairs into one semivariance value per lag:
//! ```text
//! γ(h) = Σ cᵢ / (2 Σ wᵢ)    for all pairs with |pᵢ − qᵢ| ∈ [h − Δ/2, h + Δ/2)
//! ```
//! where `cᵢ` is the pair's weighted squared difference, `wᵢ` its weight and
//! `Δ` the step size. Lags are centred at `0, Δ, 2Δ, …` up to the maximum
//! range; the first bin covers `[0, Δ/2)`.
//!
//! Reference:
//! Matheron, G. (1963). Principles of geostatistics. Economic Geology.
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.

use areakrig_core::{Error, KnownAreas, Result};
use serde::{Deserialize, Serialize};

use super::weighting::{ArealWeights, WeightedPair, WeightingParams};

/// Upper limit on the number of lags
pub const MAX_LAGS: usize = 1 << 20;

/// Lag configuration for the empirical semivariogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SemivarianceParams {
    /// Bin width and distance between consecutive lags
    pub step_size: f64,
    /// Largest lag distance considered
    pub max_range: f64,
}

impl SemivarianceParams {
    /// Validated lag configuration.
    ///
    /// # Errors
    /// [`Error::InvalidParameter`] if either value is not finite and positive,
    /// or if `step_size > max_range`.
    pub fn new(step_size: f64, max_range: f64) -> Result<Self> {
        let params = Self {
            step_size,
            max_range,
        };
        params.validate()?;
        Ok(params)
    }

    /// Derive the lags from the extent of the study region.
    ///
    /// `max_range` is the shorter side of the bounding box and `step_size`
    /// divides it into `divisions` lags.
    pub fn from_extent(width: f64, height: f64, divisions: usize) -> Result<Self> {
        if divisions == 0 {
            return Err(Error::invalid("divisions", 0, "must be at least 1"));
        }
        let max_range = width.abs().min(height.abs());
        Self::new(max_range / divisions as f64, max_range)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err(Error::invalid("step_size", self.step_size, "must be finite and positive"));
        }
        if !self.max_range.is_finite() || self.max_range <= 0.0 {
            return Err(Error::invalid("max_range", self.max_range, "must be finite and positive"));
        }
        if self.step_size > self.max_range {
            return Err(Error::invalid(
                "step_size",
                self.step_size,
                format!("must not exceed max_range ({})", self.max_range),
            ));
        }
        let ratio = self.max_range / self.step_size;
        if !ratio.is_finite() || ratio >= MAX_LAGS as f64 {
            return Err(Error::invalid(
                "step_size",
                self.step_size,
                format!("yields more than {MAX_LAGS} lags over max_range ({})", self.max_range),
            ));
        }
        Ok(())
    }

    /// Number of lags, counting lag 0. Never more than [`MAX_LAGS`].
    pub fn n_lags(&self) -> usize {
        // Tolerate max_range being a rounding error short of a whole step
        let whole = (self.max_range / self.step_size + 1e-9).floor();
        if whole.is_nan() || whole < 0.0 {
            return 1;
        }
        (whole.min((MAX_LAGS - 1) as f64) as usize).saturating_add(1)
    }

    /// Bin index for a distance, if it falls inside the lag range.
    #[inline]
    pub fn bin(&self, distance: f64) -> Option<usize> {
        if distance.is_nan() || distance < 0.0 {
            return None;
        }
        let bin = (distance / self.step_size + 0.5).floor() as usize;
        (bin < self.n_lags()).then_some(bin)
    }
}

/// Semivariance at one lag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmpiricalPoint {
    /// Lag distance (bin center)
    pub lag: f64,
    /// γ(h); NaN when no pair fell in the bin
    pub semivariance: f64,
    /// Number of pairs with positive weight in the bin
    pub pair_count: usize,
    /// Sum of pair weights in the bin
    pub total_weight: f64,
}

impl EmpiricalPoint {
    pub fn is_valid(&self) -> bool {
        self.pair_count > 0 && self.semivariance.is_finite()
    }
}

/// Empirical semivariogram: one point per lag from 0 to the maximum range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmpiricalSemivariogram {
    pub points: Vec<EmpiricalPoint>,
    pub step_size: f64,
    pub max_range: f64,
}

impl EmpiricalSemivariogram {
    /// Lags that received at least one pair.
    pub fn valid(&self) -> impl Iterator<Item = &EmpiricalPoint> + '_ {
        self.points.iter().filter(|p| p.is_valid())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Aggregate weighted point pairs into an empirical semivariogram.
///
/// Pairs beyond the last bin and pairs with zero weight are ignored.
/// Semivariance is clamped at zero: the Poisson correction can push the
/// estimate of a short lag slightly below it.
///
/// # Errors
/// [`Error::InvalidParameter`] if `params` is invalid.
pub fn weighted_semivariance(
    pairs: impl IntoIterator<Item = WeightedPair>,
    params: &SemivarianceParams,
) -> Result<EmpiricalSemivariogram> {
    params.validate()?;

    let n_lags = params.n_lags();
    let mut sums = vec![0.0_f64; n_lags];
    let mut weights = vec![0.0_f64; n_lags];
    let mut counts = vec![0_usize; n_lags];

    for pair in pairs {
        if pair.weight.is_nan() || pair.weight <= 0.0 {
            continue;
        }
        if let Some(bin) = params.bin(pair.distance) {
            sums[bin] += pair.contribution;
            weights[bin] += pair.weight;
            counts[bin] += 1;
        }
    }

    let points = (0..n_lags)
        .map(|k| {
            let semivariance = if counts[k] > 0 {
                (sums[k] / (2.0 * weights[k])).max(0.0)
            } else {
                f64::NAN
            };
            EmpiricalPoint {
                lag: k as f64 * params.step_size,
                semivariance,
                pair_count: counts[k],
                total_weight: weights[k],
            }
        })
        .collect();

    Ok(EmpiricalSemivariogram {
        points,
        step_size: params.step_size,
        max_range: params.max_range,
    })
}

/// Areal weighting followed by aggregation, in one call.
pub fn areal_semivariogram(
    known: &KnownAreas,
    weighting: WeightingParams,
    params: &SemivarianceParams,
) -> Result<EmpiricalSemivariogram> {
    let weights = ArealWeights::new(known, weighting);
    let empirical = weighted_semivariance(weights.pairs(), params)?;
    tracing::debug!(
        lags = empirical.len(),
        valid = empirical.valid().count(),
        mean_rate = weights.mean_rate(),
        "computed areal semivariogram"
    );
    Ok(empirical)
}
