//! Areal weighting / support transform
//!
//! Turns known areas and their point support into weighted point-pair
//! records for a population-weighted semivariogram (Monestiez et al., 2006).
//! For every pair of areas `(a, b)`, including an area with itself, each
//! point pair `(p, q)` with `p ∈ a`, `q ∈ b` yields:
//!
//! ```text
//! distance     = |p − q|
//! weight       = w(p, q)                      (value product or 1)
//! contribution = weight · [(z_a − z_b)² − m*·(1/n_a + 1/n_b)]   a ≠ b
//!              = 0                                              a = b
//! ```
//!
//! where `z` are area values, `n` area populations (sum of point values) and
//! `m*` the population-weighted mean rate. The `m*` term removes the Poisson
//! noise that inflates squared differences between rates computed over small
//! populations.
//!
//! Reference:
//! Monestiez, P. et al. (2006). Geostatistical modelling of spatial
//! distribution of Balaenoptera physalus. Ecological Modelling, 193.
//! Goovaerts, P. (2006). Geostatistical analysis of disease data: accounting
//! for spatial support and population density in the isopleth mapping of
//! cancer mortality risk using area-to-point Poisson kriging. IJHG, 5(52).

use areakrig_core::{KnownArea, KnownAreas, PointSample};
use serde::{Deserialize, Serialize};

/// How a point pair is weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PairWeighting {
    /// Product of the two point values (population × population)
    #[default]
    ValueProduct,
    /// Every pair counts once
    Count,
}

impl PairWeighting {
    #[inline]
    pub fn weight(self, a: f64, b: f64) -> f64 {
        match self {
            PairWeighting::ValueProduct => a * b,
            PairWeighting::Count => 1.0,
        }
    }
}

/// Parameters for the support transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightingParams {
    /// Point pair weighting policy (default: value product)
    pub pair_weighting: PairWeighting,
    /// Subtract the Poisson noise term `m*·(1/n_a + 1/n_b)` (default true)
    pub poisson_correction: bool,
    /// Emit each point paired with itself at distance 0 (default false)
    pub include_zero_distance: bool,
}

impl Default for WeightingParams {
    fn default() -> Self {
        Self {
            pair_weighting: PairWeighting::ValueProduct,
            poisson_correction: true,
            include_zero_distance: false,
        }
    }
}

/// One weighted point pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedPair {
    pub distance: f64,
    /// Weighted squared difference, already multiplied by `weight`
    pub contribution: f64,
    pub weight: f64,
}

/// Lazy producer of [`WeightedPair`]s over a set of known areas.
///
/// Nothing is materialized: [`ArealWeights::pairs`] walks the point sets on
/// demand and can be called any number of times.
#[derive(Debug, Clone)]
pub struct ArealWeights<'a> {
    areas: Vec<KnownArea<'a>>,
    params: WeightingParams,
    mean_rate: f64,
}

impl<'a> ArealWeights<'a> {
    pub fn new(known: &'a KnownAreas, params: WeightingParams) -> Self {
        Self {
            areas: known.iter().collect(),
            params,
            mean_rate: known.mean_rate(),
        }
    }

    /// Population-weighted mean rate m* of the known areas.
    pub fn mean_rate(&self) -> f64 {
        self.mean_rate
    }

    pub fn params(&self) -> &WeightingParams {
        &self.params
    }

    /// Every weighted point pair, area pair by area pair.
    pub fn pairs(&self) -> impl Iterator<Item = WeightedPair> + '_ {
        let n = self.areas.len();
        (0..n)
            .flat_map(move |i| (i..n).map(move |j| (i, j)))
            .flat_map(move |(i, j)| self.area_pairs(i, j))
    }

    fn area_pairs(&self, i: usize, j: usize) -> impl Iterator<Item = WeightedPair> + '_ {
        let a = self.areas[i];
        let b = self.areas[j];
        let same = i == j;
        let scale = if same { 0.0 } else { self.squared_difference(&a, &b) };
        let skip_self = same && !self.params.include_zero_distance;
        let weighting = self.params.pair_weighting;

        a.points.iter().enumerate().flat_map(move |(pi, p)| {
            let start = match (same, skip_self) {
                (true, true) => pi + 1,
                (true, false) => pi,
                _ => 0,
            };
            b.points[start..].iter().map(move |q| {
                let weight = weighting.weight(p.value, q.value);
                WeightedPair {
                    distance: p.dist(q.x, q.y),
                    contribution: weight * scale,
                    weight,
                }
            })
        })
    }

    /// `(z_a − z_b)²` less the Poisson noise expected for the two populations.
    fn squared_difference(&self, a: &KnownArea<'_>, b: &KnownArea<'_>) -> f64 {
        let dz = a.area.value - b.area.value;
        let mut sq = dz * dz;
        if self.params.poisson_correction && a.population > 0.0 && b.population > 0.0 {
            sq -= self.mean_rate * (1.0 / a.population + 1.0 / b.population);
        }
        sq
    }
}

/// Point-weighted mean distance between two point sets.
///
/// `Σ w(p,q)·|p−q| / Σ w(p,q)` over all `p ∈ a`, `q ∈ b`; falls back to the
/// unweighted mean when every weight is zero. NaN when either set is empty.
pub fn weighted_distance(a: &[PointSample], b: &[PointSample], weighting: PairWeighting) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::NAN;
    }

    let mut sum_wd = 0.0;
    let mut sum_w = 0.0;
    let mut sum_d = 0.0;
    for p in a {
        for q in b {
            let d = p.dist(q.x, q.y);
            let w = weighting.weight(p.value, q.value);
            sum_wd += w * d;
            sum_w += w;
            sum_d += d;
        }
    }

    if sum_w > 0.0 {
        sum_wd / sum_w
    } else {
        sum_d / (a.len() * b.len()) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use areakrig_core::{Area, AreaId};

    fn two_areas() -> KnownAreas {
        let areas = vec![Area::new(1, 0.0, 0.0, 10.0), Area::new(2, 4.0, 0.0, 14.0)];
        let points = vec![
            (
                AreaId::from(1),
                vec![PointSample::new(0.0, 0.0, 2.0), PointSample::new(1.0, 0.0, 2.0)],
            ),
            (AreaId::from(2), vec![PointSample::new(4.0, 0.0, 4.0)]),
        ];
        KnownAreas::new(areas, points).unwrap()
    }

    #[test]
    fn test_pair_count() {
        let known = two_areas();
        let weights = ArealWeights::new(&known, WeightingParams::default());
        // self(1): 1 pair, self(2): 0 pairs, cross: 2 pairs
        assert_eq!(weights.pairs().count(), 3);

        let with_zero = ArealWeights::new(
            &known,
            WeightingParams {
                include_zero_distance: true,
                ..Default::default()
            },
        );
        // self(1): 3 pairs, self(2): 1 pair, cross: 2 pairs
        assert_eq!(with_zero.pairs().count(), 6);
    }

    #[test]
    fn test_restartable() {
        let known = two_areas();
        let weights = ArealWeights::new(&known, WeightingParams::default());
        let first: Vec<WeightedPair> = weights.pairs().collect();
        let second: Vec<WeightedPair> = weights.pairs().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_self_pairs_contribute_nothing() {
        let known = two_areas();
        let weights = ArealWeights::new(&known, WeightingParams::default());
        let first = weights.pairs().next().unwrap();
        assert!((first.distance - 1.0).abs() < 1e-12);
        assert_eq!(first.contribution, 0.0);
        assert!((first.weight - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_cross_pairs_poisson_corrected() {
        let known = two_areas();
        let weights = ArealWeights::new(&known, WeightingParams::default());
        // m* = (10·4 + 14·4) / 8 = 12; n_1 = 4, n_2 = 4
        assert!((weights.mean_rate() - 12.0).abs() < 1e-12);
        let expected = 16.0 - 12.0 * (0.25 + 0.25);

        let cross: Vec<WeightedPair> = weights.pairs().skip(1).collect();
        assert_eq!(cross.len(), 2);
        for pair in &cross {
            assert!((pair.weight - 8.0).abs() < 1e-12);
            assert!((pair.contribution - 8.0 * expected).abs() < 1e-12);
        }
        assert!((cross[0].distance - 4.0).abs() < 1e-12);
        assert!((cross[1].distance - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_count_weighting_without_correction() {
        let known = two_areas();
        let params = WeightingParams {
            pair_weighting: PairWeighting::Count,
            poisson_correction: false,
            include_zero_distance: false,
        };
        let weights = ArealWeights::new(&known, params);
        for pair in weights.pairs().skip(1) {
            assert_eq!(pair.weight, 1.0);
            assert!((pair.contribution - 16.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_weighted_distance() {
        let a = vec![PointSample::new(0.0, 0.0, 1.0), PointSample::new(2.0, 0.0, 3.0)];
        let b = vec![PointSample::new(10.0, 0.0, 1.0)];
        // (1·10 + 3·8) / 4
        let d = weighted_distance(&a, &b, PairWeighting::ValueProduct);
        assert!((d - 8.5).abs() < 1e-12);
        let d = weighted_distance(&a, &b, PairWeighting::Count);
        assert!((d - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_distance_zero_weights_falls_back() {
        let a = vec![PointSample::new(0.0, 0.0, 0.0)];
        let b = vec![PointSample::new(3.0, 4.0, 0.0)];
        assert!((weighted_distance(&a, &b, PairWeighting::ValueProduct) - 5.0).abs() < 1e-12);
        assert!(weighted_distance(&a, &[], PairWeighting::Count).is_nan());
    }
}
