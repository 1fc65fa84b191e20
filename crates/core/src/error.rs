//! Error types for areakrig

use thiserror::Error;

use crate::area::AreaId;

/// Main error type for areakrig operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(
        "Insufficient neighbors for area {area_id}: requested {requested}, {available} known areas available"
    )]
    InsufficientNeighbors {
        area_id: AreaId,
        requested: usize,
        available: usize,
    },

    #[error("No known area within search radius {search_radius} of area {area_id}")]
    NoNeighborsFound { area_id: AreaId, search_radius: f64 },

    #[error("No feasible semivariogram model: {0}")]
    NoFeasibleModel(String),

    #[error("Singular kriging system ({size}x{size}) for area {area_id}")]
    SingularSystem { area_id: AreaId, size: usize },

    #[error("Area {area_id} has no point samples")]
    EmptyArea { area_id: AreaId },

    #[error("Duplicate area id: {area_id}")]
    DuplicateArea { area_id: AreaId },

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`] with a displayable value.
    pub fn invalid(name: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for areakrig operations
pub type Result<T> = std::result::Result<T, Error>;
