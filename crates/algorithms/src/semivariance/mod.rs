//! Semivariogram deconvolution and modelling
//!
//! - Areal weighting: population-weighted point pairs from known areas
//! - Empirical: weighted semivariance per distance lag
//! - Variogram: theoretical model fitting and selection

pub mod empirical;
pub mod variogram;
pub mod weighting;

pub use empirical::{
    areal_semivariogram, weighted_semivariance, EmpiricalPoint, EmpiricalSemivariogram,
    SemivarianceParams, MAX_LAGS,
};
pub use variogram::{
    fit_all_variograms, fit_best_variogram, fit_variogram, FitParams, FitWeighting,
    FittedVariogram, VariogramFitter, VariogramModel,
};
pub use weighting::{weighted_distance, ArealWeights, PairWeighting, WeightedPair, WeightingParams};
