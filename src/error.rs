use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PastureError {
    #[error("Length mismatch: {names} feature names, {contributions} contributions")]
    LengthMismatch { names: usize, contributions: usize },

    #[error("Shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid presentation order: {0}")]
    InvalidOrder(String),

    #[error("Non-finite value for {0}")]
    NonFinite(String),

    #[error("Final probability {supplied} does not match sigmoid of trace end {expected}")]
    ProbabilityMismatch { supplied: f64, expected: f64 },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Input out of range: {feature} = {value} (allowed {min}..={max})")]
    InputOutOfRange {
        feature: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

pub type Result<T> = std::result::Result<T, PastureError>;
