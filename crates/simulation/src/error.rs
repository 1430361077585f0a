//! Error types for the simulation crate.

use thiserror::Error;

/// Invalid scheduler configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name}={value:?} is not a valid value")]
    Unparsable { name: &'static str, value: String },

    #[error("physics rate must be positive, got {0}")]
    NonPositiveRate(f32),

    #[error("{requested} worker threads requested, at most {max} are supported")]
    TooManyThreads { requested: usize, max: usize },

    #[error("max_steps_per_frame must be at least 1")]
    NoSteps,
}
