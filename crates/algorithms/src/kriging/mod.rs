//! Area-to-area kriging
//!
//! - KdTree: centroid index for neighbor selection
//! - Poisson Kriging: rate prediction for unobserved areas

pub mod kdtree;
mod poisson;

pub use kdtree::{KdTree, Neighbor};
pub use poisson::{
    CrossValidation, HoldOut, KrigingSystem, PoissonKriging, PoissonKrigingParams,
    PredictionParams, PredictionResult,
};
