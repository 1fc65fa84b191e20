//! # areakrig Core
//!
//! Core types and traits for area-to-area Poisson kriging.
//!
//! This crate provides:
//! - `Area`, `PointSample`, `UnknownArea`: the areal data model
//! - `KnownAreas`: known areas joined with their point support
//! - `Error`: the error taxonomy shared by every pipeline stage
//! - Algorithm traits for consistent API

pub mod area;
pub mod error;

pub use area::{Area, AreaId, KnownArea, KnownAreas, PointSample, UnknownArea};
pub use error::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::area::{Area, AreaId, KnownArea, KnownAreas, PointSample, UnknownArea};
    pub use crate::error::{Error, Result};
    pub use crate::Algorithm;
}

/// A pipeline stage that owns its input.
///
/// Implemented by the variogram fitter and the kriging predictor so callers
/// can drive either one from a `*Params` value. Stages hold no mutable state;
/// `execute` may be called any number of times.
pub trait Algorithm {
    type Input;
    type Output;
    /// Stage configuration; `Default` gives the documented defaults
    type Params: Default;
    type Error: std::error::Error;

    /// Short display name, e.g. for log fields
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Run the stage on `input`.
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// [`Algorithm::execute`] with `Params::default()`.
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
