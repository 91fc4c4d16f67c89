use ethnum::U256;

use crate::{AmountError, Ratio, Rounding};

/// Scale an amount by a ratio
///
/// # Parameters
/// - `amount`: The amount in base units
/// - `ratio`: The ratio to apply
/// - `rounding`: How a fractional result is resolved
///
/// # Returns
/// - `u128`: `amount * numerator / denominator`, rounded
pub fn multiply_by_ratio(
    amount: u128,
    ratio: Ratio,
    rounding: Rounding,
) -> Result<u128, AmountError> {
    let product = <U256>::from(amount) * <U256>::from(ratio.numerator());
    let denominator = <U256>::from(ratio.denominator());

    let quotient = product / denominator;
    let remainder = product % denominator;

    let round_up = match rounding {
        Rounding::Floor => false,
        Rounding::Ceil => remainder != U256::ZERO,
        Rounding::Round => remainder + remainder >= denominator,
    };

    let result = if round_up {
        quotient + U256::ONE
    } else {
        quotient
    };

    result
        .try_into()
        .map_err(|_| AmountError::out_of_range("scaled amount"))
}
