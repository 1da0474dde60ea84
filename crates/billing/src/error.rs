//! Adjustment error taxonomy.

use thiserror::Error;

use scdp_core::DomainError;

/// Deterministic failures of the adjustment engine.
///
/// All of these are recovered at the request-handler boundary and surfaced
/// as 4xx responses; none are retried automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdjustmentError {
    /// Target amount was zero, negative, or not a finite number.
    #[error("invalid target amount: {0}")]
    InvalidTargetAmount(String),

    /// Adjustment reason was empty or whitespace.
    #[error("adjustment reason must not be empty")]
    MissingReason,

    /// The adjustment has already been reversed.
    #[error("adjustment has already been reversed")]
    AlreadyReversed,

    /// Unknown adjustment, line, or batch.
    #[error("not found")]
    NotFound,

    /// A value failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A conflicting state transition was attempted.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl AdjustmentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<DomainError> for AdjustmentError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => AdjustmentError::Validation(msg),
            DomainError::InvariantViolation(msg) => AdjustmentError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => AdjustmentError::Validation(msg),
            DomainError::NotFound => AdjustmentError::NotFound,
            DomainError::Conflict(msg) => AdjustmentError::Conflict(msg),
        }
    }
}

impl From<AdjustmentError> for DomainError {
    fn from(value: AdjustmentError) -> Self {
        match value {
            AdjustmentError::InvalidTargetAmount(msg) => {
                DomainError::Validation(format!("invalid target amount: {msg}"))
            }
            AdjustmentError::MissingReason => {
                DomainError::Validation("adjustment reason must not be empty".to_string())
            }
            AdjustmentError::AlreadyReversed => {
                DomainError::Conflict("adjustment has already been reversed".to_string())
            }
            AdjustmentError::NotFound => DomainError::NotFound,
            AdjustmentError::Validation(msg) => DomainError::Validation(msg),
            AdjustmentError::InvariantViolation(msg) => DomainError::InvariantViolation(msg),
            AdjustmentError::Conflict(msg) => DomainError::Conflict(msg),
        }
    }
}
