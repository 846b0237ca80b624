use thiserror::Error;

/// Errors raised by the t-SNE engine
///
/// Calibration that runs out of iterations and an optimiser that hits its
/// iteration cap are not errors; both return their current best state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TsneError {
    /// Shapes, configuration values or point sets that cannot be processed.
    /// Raised before any computation starts.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A normalisation denominator or loss term collapsed (underflow, zero
    /// or non-finite values). Usually means a degenerate bandwidth or a
    /// collapsed/exploded embedding.
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),
}

/// Shorthand for an `InvalidInput` error
pub(crate) fn invalid_input<S: Into<String>>(msg: S) -> TsneError {
    TsneError::InvalidInput(msg.into())
}

/// Shorthand for a `NumericDegeneracy` error
pub(crate) fn numeric_degeneracy<S: Into<String>>(msg: S) -> TsneError {
    TsneError::NumericDegeneracy(msg.into())
}
