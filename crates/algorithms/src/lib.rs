//! # areakrig Algorithms
//!
//! Area-to-area Poisson kriging for areakrig.
//!
//! ## Pipeline Stages
//!
//! - **semivariance**: Areal weighting, empirical semivariogram, model fitting
//! - **kriging**: Neighbor selection and Poisson kriging prediction
//!
//! ```ignore
//! let empirical = areal_semivariogram(&known, WeightingParams::default(), &lags)?;
//! let model = fit_best_variogram(&empirical, &FitParams::from_known(&known))?;
//! let predictor = PoissonKriging::new(model, known);
//! let results = predictor.predict(&unknown, 8, 0.75 * lags.max_range)?;
//! ```

pub mod kriging;
pub(crate) mod maybe_rayon;
pub mod semivariance;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::kriging::{
        CrossValidation, KrigingSystem, PoissonKriging, PoissonKrigingParams, PredictionParams,
        PredictionResult,
    };
    pub use crate::semivariance::{
        areal_semivariogram, fit_all_variograms, fit_best_variogram, fit_variogram,
        weighted_semivariance, ArealWeights, EmpiricalSemivariogram, FitParams, FittedVariogram,
        PairWeighting, SemivarianceParams, VariogramFitter, VariogramModel, WeightingParams,
    };
    pub use areakrig_core::prelude::*;
}
