use crate::{
    multiply_by_ratio, AmountError, DecimalInput, FormatOptions, Ratio, Rounding, MAX_DECIMALS,
};

// Numbers outside this range are printed in exponential notation by decimal
// formatters, which would silently change their meaning.
const MAX_PLAIN_NUMBER: f64 = 1e21;
const MIN_PLAIN_FRACTION: f64 = 1e-6;

/// Arithmetic for amounts of a token with a fixed number of decimals.
///
/// All amounts are base units: `1.5` of a 6-decimal token is `1_500_000`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TokenMath {
    pub(crate) decimals: u8,
    pub(crate) scale: u128,
}

impl TokenMath {
    /// Creates the math helper for a token with `decimals` decimals.
    pub fn new(decimals: u8) -> Result<Self, AmountError> {
        if decimals > MAX_DECIMALS {
            return Err(AmountError::InvalidDecimals {
                decimals,
                max: MAX_DECIMALS,
            });
        }
        Ok(Self {
            decimals,
            scale: 10u128.pow(decimals.into()),
        })
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// The number of base units in one whole token.
    pub fn scale(&self) -> u128 {
        self.scale
    }

    /// Validates a signed base-unit value.
    pub fn from_base_units(&self, value: i128, label: &str) -> Result<u128, AmountError> {
        u128::try_from(value).map_err(|_| AmountError::negative(label))
    }

    /// Parses an integer base-unit value from text.
    pub fn parse_base_units(&self, value: &str, label: &str) -> Result<u128, AmountError> {
        let trimmed = value.trim();
        if let Some(rest) = trimmed.strip_prefix('-') {
            if is_digits(rest) {
                return Err(AmountError::negative(label));
            }
        }
        if !is_digits(trimmed) {
            return Err(AmountError::InvalidInteger {
                label: label.to_string(),
                value: value.to_string(),
            });
        }
        trimmed
            .parse::<u128>()
            .map_err(|_| AmountError::out_of_range(label))
    }

    /// Converts a decimal amount into base units.
    ///
    /// Fraction digits beyond `decimals` are dropped and `rounding` decides whether
    /// the dropped remainder bumps the result by one base unit.
    pub fn from_decimal<'a>(
        &self,
        value: impl Into<DecimalInput<'a>>,
        rounding: Rounding,
        label: &str,
    ) -> Result<u128, AmountError> {
        match value.into() {
            DecimalInput::Text(text) => self.parse_decimal(text, rounding, label),
            DecimalInput::Number(number) => self.number_to_base_units(number, rounding, label),
        }
    }

    fn number_to_base_units(
        &self,
        number: f64,
        rounding: Rounding,
        label: &str,
    ) -> Result<u128, AmountError> {
        if !number.is_finite() {
            return Err(AmountError::NonFiniteNumber {
                label: label.to_string(),
            });
        }
        if number < 0.0 {
            return Err(AmountError::negative(label));
        }
        if number.fract() == 0.0 {
            if number >= u128::MAX as f64 {
                return Err(AmountError::out_of_range(label));
            }
            return (number as u128)
                .checked_mul(self.scale)
                .ok_or_else(|| AmountError::out_of_range(label));
        }
        if number >= MAX_PLAIN_NUMBER || number < MIN_PLAIN_FRACTION {
            return Err(AmountError::ExponentialNotation {
                label: label.to_string(),
            });
        }
        self.parse_decimal(&number.to_string(), rounding, label)
    }

    fn parse_decimal(
        &self,
        text: &str,
        rounding: Rounding,
        label: &str,
    ) -> Result<u128, AmountError> {
        let trimmed = text.trim();
        let invalid = || AmountError::InvalidDecimal {
            label: label.to_string(),
            value: text.to_string(),
        };

        if let Some(rest) = trimmed.strip_prefix('-') {
            if split_decimal(rest).is_some() {
                return Err(AmountError::negative(label));
            }
            return Err(invalid());
        }

        let (integer_part, fraction_part) = split_decimal(trimmed).ok_or_else(invalid)?;

        let decimals = usize::from(self.decimals);
        let (kept, remainder) = if fraction_part.len() > decimals {
            fraction_part.split_at(decimals)
        } else {
            (fraction_part, "")
        };

        let integer_value = if integer_part.is_empty() {
            0
        } else {
            integer_part
                .parse::<u128>()
                .map_err(|_| AmountError::out_of_range(label))?
        };

        // `kept` has at most `decimals` (<= 38) digits, which always fits a u128.
        let fraction_value = if kept.is_empty() {
            0
        } else {
            let padding = u32::try_from(decimals - kept.len())
                .map_err(|_| AmountError::out_of_range(label))?;
            kept.parse::<u128>()
                .map_err(|_| AmountError::out_of_range(label))?
                * 10u128.pow(padding)
        };

        let round_up = match rounding {
            Rounding::Floor => false,
            Rounding::Ceil => remainder.bytes().any(|digit| digit != b'0'),
            Rounding::Round => remainder.bytes().next().is_some_and(|digit| digit >= b'5'),
        };

        integer_value
            .checked_mul(self.scale)
            .and_then(|value| value.checked_add(fraction_value))
            .and_then(|value| value.checked_add(u128::from(round_up)))
            .ok_or_else(|| AmountError::out_of_range(label))
    }

    /// Formats base units as a decimal string. Exact inverse of [`Self::from_decimal`].
    pub fn to_decimal_string(&self, amount: u128, options: FormatOptions) -> String {
        let integer_value = amount / self.scale;
        let fraction_value = amount % self.scale;
        let decimals = usize::from(self.decimals);

        let mut fraction = if decimals == 0 {
            String::new()
        } else {
            format!("{:0width$}", fraction_value, width = decimals)
        };

        if options.trim_trailing_zeros {
            let significant = fraction.trim_end_matches('0').len();
            fraction.truncate(significant.max(options.minimum_fraction_digits));
        }
        while fraction.len() < options.minimum_fraction_digits {
            fraction.push('0');
        }

        if fraction.is_empty() {
            integer_value.to_string()
        } else {
            format!("{integer_value}.{fraction}")
        }
    }

    pub fn add(&self, left: u128, right: u128) -> Result<u128, AmountError> {
        left.checked_add(right).ok_or_else(|| AmountError::out_of_range("sum"))
    }

    /// Subtracts `right` from `left`, failing instead of going below zero.
    pub fn subtract(&self, left: u128, right: u128) -> Result<u128, AmountError> {
        left.checked_sub(right).ok_or_else(|| AmountError::out_of_range("difference"))
    }

    pub fn multiply_by_ratio(
        &self,
        amount: u128,
        ratio: Ratio,
        rounding: Rounding,
    ) -> Result<u128, AmountError> {
        multiply_by_ratio(amount, ratio, rounding)
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Splits `123.45` into `("123", "45")`; either side may be empty but not both.
fn split_decimal(value: &str) -> Option<(&str, &str)> {
    let (integer_part, fraction_part) = value.split_once('.').unwrap_or((value, ""));
    let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if integer_part.is_empty() && fraction_part.is_empty() {
        return None;
    }
    if !digits_only(integer_part) || !digits_only(fraction_part) {
        return None;
    }
    Some((integer_part, fraction_part))
}
