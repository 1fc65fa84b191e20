//! Area-to-area Poisson kriging
//!
//! Predicts the rate of an unobserved area from the rates of nearby known
//! areas. Distances between areas are point-weighted averages over their
//! support, so the semivariance between two areas accounts for their size
//! and population distribution. The Poisson term `m*/nᵢ` on the diagonal
//! accounts for the noise of rates computed over small populations.
//!
//! The kriging system for k candidate areas v₁…vₖ and target v₀:
//! ```text
//! [γ̄(v₁,v₁)−m*/n₁ ... γ̄(v₁,vₖ)       1] [w₁]   [γ̄(v₁,v₀)]
//! [      ...       ...     ...       .] [. ] = [   ...   ]
//! [γ̄(vₖ,v₁)       ... γ̄(vₖ,vₖ)−m*/nₖ 1] [wₖ]   [γ̄(vₖ,v₀)]
//! [      1         ...      1        0] [μ ]   [    1    ]
//! ```
//! where γ̄(vᵢ,vⱼ) is the fitted semivariogram evaluated at the
//! point-weighted distance between the two areas and μ is the Lagrange
//! multiplier ensuring Σwᵢ = 1.
//!
//! Reference:
//! Goovaerts, P. (2006). Geostatistical analysis of disease data: accounting
//! for spatial support and population density in the isopleth mapping of
//! cancer mortality risk using area-to-point Poisson kriging. IJHG, 5(52).

use areakrig_core::area::population_weighted_mean;
use areakrig_core::{
    Algorithm, AreaId, Error, KnownArea, KnownAreas, PointSample, Result, UnknownArea,
};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::maybe_rayon::*;
use crate::semivariance::{weighted_distance, FittedVariogram, PairWeighting};

use super::kdtree::{KdTree, Neighbor};

/// Parameters for area-to-area Poisson kriging
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoissonKrigingParams {
    /// Point pair weighting for area-to-area distances (default: value product)
    pub pair_weighting: PairWeighting,
    /// Add the Poisson noise term `m*/nᵢ` to the diagonal (default true)
    pub poisson_correction: bool,
}

impl Default for PoissonKrigingParams {
    fn default() -> Self {
        Self {
            pair_weighting: PairWeighting::ValueProduct,
            poisson_correction: true,
        }
    }
}

/// Neighbor search for [`PoissonKriging::predict`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionParams {
    /// Nearest known areas used per prediction (default 8)
    pub number_of_observations: usize,
    /// Maximum centroid distance of a candidate (default: unlimited)
    pub search_radius: f64,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self {
            number_of_observations: 8,
            search_radius: f64::INFINITY,
        }
    }
}

/// Prediction for one unknown area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub area_id: AreaId,
    /// Predicted value
    pub predicted: f64,
    /// Estimation variance, never negative
    pub error: f64,
    /// Kriging weight of each candidate known area, nearest first
    pub weights: Vec<(AreaId, f64)>,
    /// Lagrange multiplier μ
    pub lagrange_multiplier: f64,
    /// Population-weighted mean rate m* of the candidates
    pub mean_rate: f64,
}

impl PredictionResult {
    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }
}

/// Augmented kriging system for one unknown area.
#[derive(Debug, Clone)]
pub struct KrigingSystem {
    pub area_id: AreaId,
    /// Candidate known areas, nearest first
    pub candidates: Vec<AreaId>,
    /// Values of the candidate areas
    pub values: Vec<f64>,
    /// (k+1)×(k+1) semivariance matrix with the unbiasedness row and column
    pub matrix: Array2<f64>,
    /// Semivariance to the unknown area, with a trailing 1
    pub rhs: Array1<f64>,
    pub mean_rate: f64,
}

impl KrigingSystem {
    /// Solve for the weights and the Lagrange multiplier.
    ///
    /// # Errors
    /// [`Error::SingularSystem`] if the matrix is numerically singular.
    pub fn solve(&self) -> Result<PredictionResult> {
        let k = self.candidates.len();
        let singular = || Error::SingularSystem {
            area_id: self.area_id.clone(),
            size: k + 1,
        };

        let solution = kriging_solve(self.matrix.clone(), self.rhs.clone()).ok_or_else(singular)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(singular());
        }

        let mut predicted = 0.0;
        let mut variance = solution[k];
        for i in 0..k {
            predicted += solution[i] * self.values[i];
            variance += solution[i] * self.rhs[i];
        }

        Ok(PredictionResult {
            area_id: self.area_id.clone(),
            predicted,
            error: variance.max(0.0),
            weights: self
                .candidates
                .iter()
                .cloned()
                .zip(solution.iter().take(k).copied())
                .collect(),
            lagrange_multiplier: solution[k],
            mean_rate: self.mean_rate,
        })
    }
}

/// Held-out prediction of one known area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldOut {
    pub observed: f64,
    pub prediction: PredictionResult,
}

impl HoldOut {
    pub fn residual(&self) -> f64 {
        self.prediction.predicted - self.observed
    }
}

/// Leave-one-out validation over every known area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub holdouts: Vec<HoldOut>,
    /// Root mean squared residual
    pub rmse: f64,
}

/// Area-to-area Poisson kriging predictor.
///
/// Holds the fitted model and the known areas; immutable once built and
/// safe to share between threads.
#[derive(Debug, Clone)]
pub struct PoissonKriging {
    model: FittedVariogram,
    known: KnownAreas,
    params: PoissonKrigingParams,
    tree: KdTree,
}

impl PoissonKriging {
    pub fn new(model: FittedVariogram, known: KnownAreas) -> Self {
        Self::with_params(model, known, PoissonKrigingParams::default())
    }

    pub fn with_params(model: FittedVariogram, known: KnownAreas, params: PoissonKrigingParams) -> Self {
        let centroids: Vec<(f64, f64)> = known
            .areas()
            .iter()
            .map(|a| (a.centroid_x, a.centroid_y))
            .collect();
        Self {
            model,
            tree: KdTree::build(&centroids),
            known,
            params,
        }
    }

    pub fn model(&self) -> &FittedVariogram {
        &self.model
    }

    pub fn known(&self) -> &KnownAreas {
        &self.known
    }

    /// Predict every unknown area, in input order.
    ///
    /// # Arguments
    /// * `unknown`: Areas to predict, with their point support
    /// * `number_of_observations`: Nearest known areas to use per prediction
    /// * `search_radius`: Maximum centroid distance of a candidate known area
    ///
    /// # Errors
    /// The error of a failing area, see [`PoissonKriging::predict_one`]. When
    /// several areas fail under the `parallel` feature, which one is reported
    /// is unspecified.
    pub fn predict(
        &self,
        unknown: &[UnknownArea],
        number_of_observations: usize,
        search_radius: f64,
    ) -> Result<Vec<PredictionResult>> {
        unknown
            .into_par_iter()
            .map(|area| self.predict_one(area, number_of_observations, search_radius))
            .collect()
    }

    /// Predict a single unknown area.
    ///
    /// # Errors
    /// - [`Error::InsufficientNeighbors`] if `number_of_observations` is 0 or
    ///   exceeds the number of known areas
    /// - [`Error::InvalidParameter`] if `search_radius` is negative or NaN
    /// - [`Error::NoNeighborsFound`] if no centroid is within `search_radius`
    /// - [`Error::SingularSystem`] if the kriging system cannot be solved
    pub fn predict_one(
        &self,
        unknown: &UnknownArea,
        number_of_observations: usize,
        search_radius: f64,
    ) -> Result<PredictionResult> {
        let system = self.kriging_system(unknown, number_of_observations, search_radius)?;
        let result = system.solve()?;
        tracing::debug!(
            area_id = %result.area_id,
            candidates = result.weights.len(),
            predicted = result.predicted,
            error = result.error,
            "poisson kriging prediction"
        );
        Ok(result)
    }

    /// Assemble the kriging system for `unknown` without solving it.
    pub fn kriging_system(
        &self,
        unknown: &UnknownArea,
        number_of_observations: usize,
        search_radius: f64,
    ) -> Result<KrigingSystem> {
        let candidates = self.select_candidates(unknown, number_of_observations, search_radius)?;
        let areas: Vec<KnownArea<'_>> = candidates
            .iter()
            .filter_map(|n| self.known.get(n.index))
            .collect();

        let k = areas.len();
        let mean_rate = population_weighted_mean(areas.iter().map(|a| (a.area.value, a.population)));

        let mut matrix = Array2::<f64>::zeros((k + 1, k + 1));
        let mut rhs = Array1::<f64>::zeros(k + 1);

        for i in 0..k {
            for j in i..k {
                let gamma = self.area_semivariance(areas[i].points, areas[j].points);
                matrix[[i, j]] = gamma;
                matrix[[j, i]] = gamma;
            }
            if self.params.poisson_correction && areas[i].population > 0.0 {
                matrix[[i, i]] -= mean_rate / areas[i].population;
            }
            // Lagrange constraint row and column
            matrix[[i, k]] = 1.0;
            matrix[[k, i]] = 1.0;

            rhs[i] = self.area_semivariance(areas[i].points, &unknown.points);
        }
        rhs[k] = 1.0;

        Ok(KrigingSystem {
            area_id: unknown.id.clone(),
            candidates: areas.iter().map(|a| a.area.id.clone()).collect(),
            values: areas.iter().map(|a| a.area.value).collect(),
            matrix,
            rhs,
            mean_rate,
        })
    }

    /// Hold out each known area in turn and predict it from the others.
    ///
    /// # Errors
    /// - [`Error::InsufficientNeighbors`] if `number_of_observations` is 0 or
    ///   not below the number of known areas, since each hold-out leaves one
    ///   area fewer to choose from
    /// - any error of [`PoissonKriging::predict_one`] for a held-out area
    pub fn leave_one_out(
        &self,
        number_of_observations: usize,
        search_radius: f64,
    ) -> Result<CrossValidation> {
        if let Some(first) = self.known.areas().first() {
            let available = self.known.len() - 1;
            if number_of_observations == 0 || number_of_observations > available {
                return Err(Error::InsufficientNeighbors {
                    area_id: first.id.clone(),
                    requested: number_of_observations,
                    available,
                });
            }
        }

        let areas: Vec<KnownArea<'_>> = self.known.iter().collect();
        let holdouts: Vec<HoldOut> = areas
            .into_par_iter()
            .map(|held| -> Result<HoldOut> {
                let rest = self.known.without(&held.area.id);
                let predictor = PoissonKriging::with_params(self.model, rest, self.params);
                let unknown = UnknownArea::new(held.area.id.clone(), held.points.to_vec())?
                    .with_centroid(held.area.centroid_x, held.area.centroid_y);
                let prediction =
                    predictor.predict_one(&unknown, number_of_observations, search_radius)?;
                Ok(HoldOut {
                    observed: held.area.value,
                    prediction,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let rmse = if holdouts.is_empty() {
            f64::NAN
        } else {
            (holdouts.iter().map(|h| h.residual().powi(2)).sum::<f64>() / holdouts.len() as f64)
                .sqrt()
        };

        Ok(CrossValidation { holdouts, rmse })
    }

    fn select_candidates(
        &self,
        unknown: &UnknownArea,
        number_of_observations: usize,
        search_radius: f64,
    ) -> Result<Vec<Neighbor>> {
        let available = self.known.len();
        if number_of_observations == 0 || number_of_observations > available {
            return Err(Error::InsufficientNeighbors {
                area_id: unknown.id.clone(),
                requested: number_of_observations,
                available,
            });
        }
        if search_radius.is_nan() || search_radius < 0.0 {
            return Err(Error::invalid(
                "search_radius",
                search_radius,
                "must be a non-negative distance",
            ));
        }

        let candidates = self.tree.nearest_within(
            unknown.centroid_x,
            unknown.centroid_y,
            search_radius,
            number_of_observations,
        );
        if candidates.is_empty() {
            return Err(Error::NoNeighborsFound {
                area_id: unknown.id.clone(),
                search_radius,
            });
        }
        Ok(candidates)
    }

    fn area_semivariance(&self, a: &[PointSample], b: &[PointSample]) -> f64 {
        self.model
            .semivariance(weighted_distance(a, b, self.params.pair_weighting))
    }
}

impl Algorithm for PoissonKriging {
    type Input = Vec<UnknownArea>;
    type Output = Vec<PredictionResult>;
    type Params = PredictionParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Poisson Kriging"
    }

    fn description(&self) -> &'static str {
        "Area-to-area Poisson kriging of unobserved area rates"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        self.predict(&input, params.number_of_observations, params.search_radius)
    }
}

/// Solve Ax = b using Gaussian elimination with partial pivoting.
///
/// Returns `None` when a pivot is negligible relative to the largest entry.
fn kriging_solve(mut mat: Array2<f64>, mut rhs: Array1<f64>) -> Option<Array1<f64>> {
    let n = rhs.len();
    let scale = mat.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
    let tol = 1e-12 * scale;

    // Forward elimination
    for col in 0..n {
        let mut max_val = mat[[col, col]].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let val = mat[[row, col]].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val.is_nan() || max_val < tol {
            return None;
        }

        if max_row != col {
            for j in 0..n {
                mat.swap([col, j], [max_row, j]);
            }
            rhs.swap(col, max_row);
        }

        let pivot = mat[[col, col]];
        for row in (col + 1)..n {
            let factor = mat[[row, col]] / pivot;
            mat[[row, col]] = 0.0;
            for j in (col + 1)..n {
                mat[[row, j]] -= factor * mat[[col, j]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    // Back substitution
    let mut x = Array1::<f64>::zeros(n);
    for col in (0..n).rev() {
        let mut sum = rhs[col];
        for j in (col + 1)..n {
            sum -= mat[[col, j]] * x[j];
        }
        x[col] = sum / mat[[col, col]];
    }

    Some(x)
}
