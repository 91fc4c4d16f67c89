/// A decimal amount as supplied by a caller.
///
/// Numbers are accepted for convenience, but values that a number formatter would
/// render in exponential notation must be passed as text.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DecimalInput<'a> {
    Text(&'a str),
    Number(f64),
}

impl<'a> From<&'a str> for DecimalInput<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for DecimalInput<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value.as_str())
    }
}

impl From<f64> for DecimalInput<'_> {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Formatting options for [`crate::TokenMath::to_decimal_string`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FormatOptions {
    /// Fraction digits that are always printed, padding with zeros if needed.
    pub minimum_fraction_digits: usize,
    /// Strip trailing zeros beyond `minimum_fraction_digits`.
    pub trim_trailing_zeros: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            minimum_fraction_digits: 0,
            trim_trailing_zeros: true,
        }
    }
}
