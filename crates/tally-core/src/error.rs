use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Rejection categories callers branch on. None of them is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Validation,
    IntegrityViolation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Validation => "validation",
            ErrorKind::IntegrityViolation => "integrity_violation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InventoryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("integrity violation: {0}")]
    Integrity(String),
}

impl InventoryError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::NotFound { .. } => ErrorKind::NotFound,
            InventoryError::InvalidState(_) => ErrorKind::InvalidState,
            InventoryError::Validation(_) => ErrorKind::Validation,
            InventoryError::Integrity(_) => ErrorKind::IntegrityViolation,
        }
    }
}

/// Rejects negative and non-finite quantities.
pub fn ensure_quantity(field: &'static str, value: f64) -> Result<f64, InventoryError> {
    if !value.is_finite() || value < 0.0 {
        return Err(InventoryError::Validation(format!(
            "{field} must be a finite number >= 0, got {value}"
        )));
    }
    Ok(value)
}
