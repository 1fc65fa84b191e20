//! Theoretical semivariogram models and fitting
//!
//! Fits linear, spherical, exponential and Gaussian models to an empirical
//! semivariogram. Each model kind is searched independently over a
//! (nugget, sill, range) grid, the best grid node is refined by a shrinking
//! pattern search, and the kind with the lowest weighted residual sum of
//! squares is retained.
//!
//! With nugget c₀, partial sill c and range a:
//! ```text
//! linear       γ(h) = c₀ + c·h/a                      h ≤ a;  c₀ + c beyond
//! spherical    γ(h) = c₀ + c·[1.5(h/a) − 0.5(h/a)³]    h ≤ a;  c₀ + c beyond
//! exponential  γ(h) = c₀ + c·[1 − exp(−3h/a)]
//! gaussian     γ(h) = c₀ + c·[1 − exp(−3h²/a²)]
//! ```
//!
//! Reference:
//! Cressie, N. (1985). Fitting variogram models by weighted least squares.
//! Mathematical Geology, 17(5).

use areakrig_core::{Algorithm, Error, KnownAreas, Result};
use serde::{Deserialize, Serialize};

use super::empirical::EmpiricalSemivariogram;

/// Theoretical semivariogram model kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariogramModel {
    /// Linear up to the range, flat beyond it
    Linear,
    /// Spherical model, reaches the sill exactly at the range
    Spherical,
    /// Exponential model, reaches ~95% of the sill at the (practical) range
    Exponential,
    /// Gaussian model, parabolic near the origin
    Gaussian,
}

impl VariogramModel {
    /// Every kind, simplest first. Ties in fit error go to the earlier kind.
    pub const ALL: [VariogramModel; 4] = [
        VariogramModel::Linear,
        VariogramModel::Spherical,
        VariogramModel::Exponential,
        VariogramModel::Gaussian,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VariogramModel::Linear => "linear",
            VariogramModel::Spherical => "spherical",
            VariogramModel::Exponential => "exponential",
            VariogramModel::Gaussian => "gaussian",
        }
    }

    /// Fraction of the partial sill reached at distance `h` for range `a`.
    fn shape(self, h: f64, a: f64) -> f64 {
        if h == 0.0 {
            return 0.0;
        }
        if a <= 0.0 {
            return 1.0;
        }
        match self {
            VariogramModel::Linear => (h / a).min(1.0),
            VariogramModel::Spherical => {
                if h >= a {
                    1.0
                } else {
                    let hr = h / a;
                    1.5 * hr - 0.5 * hr * hr * hr
                }
            }
            VariogramModel::Exponential => 1.0 - (-3.0 * h / a).exp(),
            VariogramModel::Gaussian => 1.0 - (-3.0 * h * h / (a * a)).exp(),
        }
    }
}

/// Fitted semivariogram model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedVariogram {
    /// Model type
    pub model: VariogramModel,
    /// Nugget (c₀): semivariance at h = 0
    pub nugget: f64,
    /// Sill (c₀ + c): semivariance at which the model levels off
    pub sill: f64,
    /// Range (a)
    pub range: f64,
    /// Partial sill (c = sill - nugget)
    pub partial_sill: f64,
    /// Weighted residual sum of squares from fitting (lower = better)
    pub error: f64,
}

impl FittedVariogram {
    /// A model with the given parameters and no fit error.
    pub fn new(model: VariogramModel, nugget: f64, sill: f64, range: f64) -> Self {
        Self {
            model,
            nugget,
            sill,
            range,
            partial_sill: sill - nugget,
            error: 0.0,
        }
    }

    /// Semivariance at distance `h`.
    ///
    /// Returns the nugget at `h = 0` and NaN for negative or NaN distances.
    pub fn semivariance(&self, h: f64) -> f64 {
        if h.is_nan() || h < 0.0 {
            return f64::NAN;
        }
        self.nugget + self.partial_sill * self.model.shape(h, self.range)
    }

    /// Covariance at distance `h`: `sill − γ(h)`.
    pub fn covariance(&self, h: f64) -> f64 {
        self.sill - self.semivariance(h)
    }
}

/// How residuals are weighted in the fit error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitWeighting {
    /// Weight each lag by its number of pairs
    #[default]
    PairCount,
    /// Every lag counts once
    Uniform,
}

/// Parameters for semivariogram fitting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParams {
    /// Nugget grid nodes over [0, first valid semivariance] (default 11)
    pub n_nugget: usize,
    /// Sill grid nodes over [S/n_sill, S] (default 20)
    pub n_sill: usize,
    /// Range grid nodes over [step size, max range] (default 20)
    pub n_range: usize,
    /// Pattern search iterations after the grid (default 60)
    pub refine_iterations: usize,
    /// Residual weighting (default: pair count)
    pub weighting: FitWeighting,
    /// Variance of the observed values. Widens the sill bound when larger
    /// than the empirical semivariance.
    pub data_variance: Option<f64>,
    /// Relative error difference under which a simpler kind wins (default 1e-9)
    pub tie_tolerance: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            n_nugget: 11,
            n_sill: 20,
            n_range: 20,
            refine_iterations: 60,
            weighting: FitWeighting::PairCount,
            data_variance: None,
            tie_tolerance: 1e-9,
        }
    }
}

impl FitParams {
    /// Defaults with `data_variance` taken from the known area values.
    pub fn from_known(known: &KnownAreas) -> Self {
        Self {
            data_variance: Some(known.value_variance()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SearchBounds {
    nugget: (f64, f64),
    sill: (f64, f64),
    range: (f64, f64),
}

/// `n` evenly spaced values over `[lo, hi]`, endpoints included.
fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n <= 1 || hi <= lo {
        return vec![lo];
    }
    (0..n)
        .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
        .collect()
}

fn spacing(bounds: (f64, f64), n: usize) -> f64 {
    let width = (bounds.1 - bounds.0).max(0.0);
    if n <= 1 { width } else { width / (n - 1) as f64 }
}

/// Fit one model kind to an empirical semivariogram.
///
/// Lags without pairs are skipped.
///
/// # Errors
/// [`Error::NoFeasibleModel`] if no lag carries a finite semivariance or no
/// parameter set yields a finite error.
pub fn fit_variogram(
    empirical: &EmpiricalSemivariogram,
    model: VariogramModel,
    params: &FitParams,
) -> Result<FittedVariogram> {
    // (lag, semivariance, residual weight)
    let valid: Vec<(f64, f64, f64)> = empirical
        .valid()
        .map(|p| {
            let w = match params.weighting {
                FitWeighting::PairCount => p.pair_count as f64,
                FitWeighting::Uniform => 1.0,
            };
            (p.lag, p.semivariance, w)
        })
        .collect();

    if valid.is_empty() {
        return Err(Error::NoFeasibleModel(
            "empirical semivariogram has no lag with pairs".into(),
        ));
    }

    let bounds = search_bounds(empirical, &valid, params);
    let rss = |nugget: f64, sill: f64, range: f64| -> f64 {
        let trial = FittedVariogram::new(model, nugget, sill, range);
        valid
            .iter()
            .map(|&(lag, sv, w)| {
                let residual = sv - trial.semivariance(lag);
                w * residual * residual
            })
            .sum()
    };

    // Grid search for best (nugget, sill, range)
    let mut best_rss = f64::INFINITY;
    let mut best = [bounds.nugget.0, bounds.sill.1, bounds.range.1];
    for nugget in linspace(bounds.nugget.0, bounds.nugget.1, params.n_nugget) {
        for sill in linspace(bounds.sill.0, bounds.sill.1, params.n_sill) {
            if sill < nugget {
                continue;
            }
            for range in linspace(bounds.range.0, bounds.range.1, params.n_range) {
                let err = rss(nugget, sill, range);
                if err < best_rss {
                    best_rss = err;
                    best = [nugget, sill, range];
                }
            }
        }
    }

    if !best_rss.is_finite() {
        return Err(Error::NoFeasibleModel(format!(
            "{} model has no finite-error parameter set",
            model.name()
        )));
    }

    // Pattern search around the best grid node
    let limits = [bounds.nugget, bounds.sill, bounds.range];
    let mut steps = [
        spacing(bounds.nugget, params.n_nugget),
        spacing(bounds.sill, params.n_sill),
        spacing(bounds.range, params.n_range),
    ];
    for _ in 0..params.refine_iterations {
        if best_rss == 0.0 || steps.iter().all(|s| *s <= f64::EPSILON * (1.0 + s.abs())) {
            break;
        }

        let center = best;
        let mut improved = false;
        for dn in [-1.0, 0.0, 1.0] {
            for ds in [-1.0, 0.0, 1.0] {
                for dr in [-1.0, 0.0, 1.0] {
                    let mut cand = center;
                    for (k, d) in [dn, ds, dr].into_iter().enumerate() {
                        cand[k] = (center[k] + d * steps[k]).clamp(limits[k].0, limits[k].1);
                    }
                    if cand == center || cand[1] < cand[0] {
                        continue;
                    }
                    let err = rss(cand[0], cand[1], cand[2]);
                    if err < best_rss {
                        best_rss = err;
                        best = cand;
                        improved = true;
                    }
                }
            }
        }
        if !improved {
            for s in &mut steps {
                *s *= 0.5;
            }
        }
    }

    let [nugget, sill, range] = best;
    Ok(FittedVariogram {
        error: best_rss,
        ..FittedVariogram::new(model, nugget, sill, range)
    })
}

fn search_bounds(
    empirical: &EmpiricalSemivariogram,
    valid: &[(f64, f64, f64)],
    params: &FitParams,
) -> SearchBounds {
    let first = valid[0].1.max(0.0);
    let max_sv = valid.iter().map(|v| v.1).fold(0.0_f64, f64::max);
    let variance = params
        .data_variance
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);

    let sill_hi = 2.0 * max_sv.max(variance);
    let sill_lo = sill_hi / params.n_sill.max(1) as f64;

    let range_lo = empirical.step_size;
    let range_hi = empirical.max_range.max(range_lo);

    SearchBounds {
        nugget: (0.0, first),
        sill: (sill_lo, sill_hi),
        range: (range_lo, range_hi),
    }
}

/// Fit every model kind, simplest first.
///
/// Kinds that cannot be fitted are left out.
///
/// # Errors
/// [`Error::NoFeasibleModel`] if no kind could be fitted.
pub fn fit_all_variograms(
    empirical: &EmpiricalSemivariogram,
    params: &FitParams,
) -> Result<Vec<FittedVariogram>> {
    let mut fits = Vec::with_capacity(VariogramModel::ALL.len());
    let mut last_err = None;
    for model in VariogramModel::ALL {
        match fit_variogram(empirical, model, params) {
            Ok(fitted) => fits.push(fitted),
            Err(e) => last_err = Some(e),
        }
    }

    if fits.is_empty() {
        return Err(last_err.unwrap_or_else(|| {
            Error::NoFeasibleModel("no semivariogram model could be fitted".into())
        }));
    }
    Ok(fits)
}

/// Fit all kinds and return the one with the lowest error.
///
/// A more complex kind only replaces a simpler one when its error is lower
/// by more than `params.tie_tolerance` (relative).
pub fn fit_best_variogram(
    empirical: &EmpiricalSemivariogram,
    params: &FitParams,
) -> Result<FittedVariogram> {
    let mut best: Option<FittedVariogram> = None;
    for fitted in fit_all_variograms(empirical, params)? {
        tracing::debug!(
            model = fitted.model.name(),
            nugget = fitted.nugget,
            sill = fitted.sill,
            range = fitted.range,
            error = fitted.error,
            "fitted semivariogram"
        );
        if best
            .as_ref()
            .is_none_or(|b| fitted.error < b.error - params.tie_tolerance * b.error.abs())
        {
            best = Some(fitted);
        }
    }

    best.ok_or_else(|| Error::NoFeasibleModel("no semivariogram model could be fitted".into()))
}

/// Semivariogram model selection
#[derive(Debug, Clone, Default)]
pub struct VariogramFitter;

impl Algorithm for VariogramFitter {
    type Input = EmpiricalSemivariogram;
    type Output = FittedVariogram;
    type Params = FitParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Semivariogram Fitter"
    }

    fn description(&self) -> &'static str {
        "Fit linear, spherical, exponential and Gaussian semivariogram models and keep the best"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fit_best_variogram(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semivariance::empirical::EmpiricalPoint;
    use areakrig_core::{Area, PointSample};

    fn synthetic(model: &FittedVariogram, step: f64, max_range: f64) -> EmpiricalSemivariogram {
        let n = (max_range / step).round() as usize + 1;
        EmpiricalSemivariogram {
            points: (0..n)
                .map(|k| {
                    let lag = k as f64 * step;
                    EmpiricalPoint {
                        lag,
                        semivariance: model.semivariance(lag),
                        pair_count: 100,
                        total_weight: 100.0,
                    }
                })
                .collect(),
            step_size: step,
            max_range,
        }
    }

    #[test]
    fn test_model_evaluation() {
        let model = FittedVariogram::new(VariogramModel::Spherical, 1.0, 10.0, 50.0);

        assert!((model.semivariance(0.0) - 1.0).abs() < 1e-12);
        assert!((model.semivariance(50.0) - 10.0).abs() < 1e-12);
        assert!((model.semivariance(100.0) - 10.0).abs() < 1e-12);

        let mid = model.semivariance(25.0);
        assert!(mid > 1.0 && mid < 10.0, "Mid should be between nugget and sill: {:.2}", mid);
        assert!((model.covariance(25.0) - (10.0 - mid)).abs() < 1e-12);
    }

    #[test]
    fn test_negative_distance_is_nan() {
        for kind in VariogramModel::ALL {
            let model = FittedVariogram::new(kind, 0.5, 4.0, 10.0);
            assert!(model.semivariance(-1.0).is_nan());
            assert!(model.semivariance(f64::NAN).is_nan());
        }
    }

    #[test]
    fn test_models_non_decreasing() {
        for kind in VariogramModel::ALL {
            let model = FittedVariogram::new(kind, 0.5, 4.0, 10.0);
            let mut prev = model.semivariance(0.0);
            assert!((prev - 0.5).abs() < 1e-12, "{} at 0", kind.name());
            for i in 1..=40 {
                let v = model.semivariance(i as f64 * 0.5);
                assert!(v >= prev - 1e-12, "{} decreases at {}", kind.name(), i);
                prev = v;
            }
        }
    }

    #[test]
    fn test_exponential_practical_range() {
        let model = FittedVariogram::new(VariogramModel::Exponential, 0.0, 10.0, 30.0);
        let at_range = model.semivariance(30.0);
        assert!(
            at_range > 9.0 && at_range < 10.0,
            "At range, should be ~95% of sill: got {:.2}",
            at_range
        );
    }

    #[test]
    fn test_roundtrip_on_grid() {
        let truth = FittedVariogram::new(VariogramModel::Spherical, 1.0, 10.0, 40.0);
        let emp = synthetic(&truth, 5.0, 100.0);
        let fitted = fit_best_variogram(&emp, &FitParams::default()).unwrap();

        assert_eq!(fitted.model, VariogramModel::Spherical);
        assert!((fitted.nugget - 1.0).abs() < 1e-6, "nugget {}", fitted.nugget);
        assert!((fitted.sill - 10.0).abs() < 1e-6, "sill {}", fitted.sill);
        assert!((fitted.range - 40.0).abs() < 1e-6, "range {}", fitted.range);
        assert!(fitted.error < 1e-9);
    }

    #[test]
    fn test_roundtrip_refined() {
        let truth = FittedVariogram::new(VariogramModel::Exponential, 0.0, 8.0, 33.0);
        let emp = synthetic(&truth, 5.0, 100.0);
        let fitted = fit_best_variogram(&emp, &FitParams::default()).unwrap();

        assert_eq!(fitted.model, VariogramModel::Exponential);
        assert!(fitted.nugget.abs() < 1e-9);
        assert!((fitted.sill - 8.0).abs() / 8.0 < 0.05, "sill {}", fitted.sill);
        assert!((fitted.range - 33.0).abs() / 33.0 < 0.05, "range {}", fitted.range);
    }

    #[test]
    fn test_tie_prefers_simplest() {
        // Flat semivariogram: every kind fits it with partial sill 0
        let flat = FittedVariogram::new(VariogramModel::Gaussian, 5.0, 5.0, 20.0);
        let emp = synthetic(&flat, 5.0, 50.0);
        let fitted = fit_best_variogram(&emp, &FitParams::default()).unwrap();

        assert_eq!(fitted.model, VariogramModel::Linear);
        assert!(fitted.error < 1e-12);
    }

    #[test]
    fn test_fit_all_returns_every_kind() {
        let truth = FittedVariogram::new(VariogramModel::Gaussian, 0.5, 6.0, 30.0);
        let emp = synthetic(&truth, 5.0, 60.0);
        let fits = fit_all_variograms(&emp, &FitParams::default()).unwrap();

        let kinds: Vec<VariogramModel> = fits.iter().map(|f| f.model).collect();
        assert_eq!(kinds, VariogramModel::ALL.to_vec());
        for f in &fits {
            assert!(f.nugget >= 0.0);
            assert!(f.sill >= f.nugget);
            assert!(f.range >= 5.0 && f.range <= 60.0);
            assert!(f.error.is_finite());
        }
    }

    #[test]
    fn test_skips_empty_lags() {
        let truth = FittedVariogram::new(VariogramModel::Spherical, 1.0, 10.0, 40.0);
        let mut emp = synthetic(&truth, 5.0, 100.0);
        for k in [3, 7, 8] {
            emp.points[k].semivariance = f64::NAN;
            emp.points[k].pair_count = 0;
        }
        let fitted = fit_variogram(&emp, VariogramModel::Spherical, &FitParams::default()).unwrap();
        assert!(fitted.error < 1e-9);
    }

    #[test]
    fn test_no_feasible_model() {
        let emp = EmpiricalSemivariogram {
            points: (0..5)
                .map(|k| EmpiricalPoint {
                    lag: k as f64,
                    semivariance: f64::NAN,
                    pair_count: 0,
                    total_weight: 0.0,
                })
                .collect(),
            step_size: 1.0,
            max_range: 4.0,
        };
        assert!(matches!(
            fit_best_variogram(&emp, &FitParams::default()),
            Err(Error::NoFeasibleModel(_))
        ));
    }

    #[test]
    fn test_data_variance_widens_sill() {
        let truth = FittedVariogram::new(VariogramModel::Linear, 0.0, 2.0, 20.0);
        let emp = synthetic(&truth, 5.0, 40.0);
        let valid: Vec<(f64, f64, f64)> = emp
            .valid()
            .map(|p| (p.lag, p.semivariance, p.pair_count as f64))
            .collect();
        let max_sv = valid.iter().map(|v| v.1).fold(0.0_f64, f64::max);

        let plain = search_bounds(&emp, &valid, &FitParams::default());
        assert!((plain.sill.1 - 2.0 * max_sv).abs() < 1e-12);

        let params = FitParams {
            data_variance: Some(50.0),
            ..Default::default()
        };
        let widened = search_bounds(&emp, &valid, &params);
        assert!((widened.sill.1 - 100.0).abs() < 1e-12);
        assert!((widened.sill.0 - 100.0 / params.n_sill as f64).abs() < 1e-12);

        // A variance below the empirical maximum leaves the bound alone
        let small = FitParams {
            data_variance: Some(0.1),
            ..Default::default()
        };
        assert_eq!(search_bounds(&emp, &valid, &small).sill, plain.sill);

        let fitted = fit_variogram(&emp, VariogramModel::Linear, &params).unwrap();
        assert!(fitted.sill <= 100.0);
        assert!(fitted.error.is_finite());
    }

    #[test]
    fn test_fit_params_from_known() {
        let areas = vec![
            Area::new(1, 0.0, 0.0, 10.0),
            Area::new(2, 5.0, 0.0, 40.0),
            Area::new(3, 9.0, 0.0, 25.0),
        ];
        let points = areas
            .iter()
            .map(|a| (a.id.clone(), vec![PointSample::new(a.centroid_x, a.centroid_y, 5.0)]))
            .collect::<Vec<_>>();
        let known = KnownAreas::new(areas, points).unwrap();

        let params = FitParams::from_known(&known);
        // mean 25, deviations -15, 15, 0
        assert_eq!(params.data_variance, Some(150.0));
        assert_eq!(params.n_sill, FitParams::default().n_sill);
    }

    #[test]
    fn test_algorithm_trait() {
        let truth = FittedVariogram::new(VariogramModel::Spherical, 1.0, 10.0, 40.0);
        let emp = synthetic(&truth, 5.0, 100.0);
        let fitter = VariogramFitter;
        assert_eq!(fitter.name(), "Semivariogram Fitter");
        let fitted = fitter.execute_default(emp).unwrap();
        assert_eq!(fitted.model, VariogramModel::Spherical);
    }
}
