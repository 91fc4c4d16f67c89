use thiserror::Error;

/// Errors produced by amount parsing, formatting and arithmetic.
///
/// Variants that stem from caller input carry the caller-supplied label so the
/// message names the field that was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("{label} must not be negative")]
    Negative { label: String },

    #[error("{label} must be an integer, got {value:?}")]
    InvalidInteger { label: String, value: String },

    #[error("{label} is not a valid decimal string: {value:?}")]
    InvalidDecimal { label: String, value: String },

    #[error("{label} must be a finite number")]
    NonFiniteNumber { label: String },

    #[error("{label} cannot be represented without exponential notation; pass it as a string")]
    ExponentialNotation { label: String },

    #[error("{label} is out of range")]
    OutOfRange { label: String },

    #[error("decimals must be at most {max}, got {decimals}")]
    InvalidDecimals { decimals: u8, max: u8 },

    #[error("ratio denominator must be greater than zero")]
    ZeroDenominator,
}

impl AmountError {
    pub(crate) fn negative(label: &str) -> Self {
        Self::Negative {
            label: label.to_string(),
        }
    }

    pub(crate) fn out_of_range(label: &str) -> Self {
        Self::OutOfRange {
            label: label.to_string(),
        }
    }
}
