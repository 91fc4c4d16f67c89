use crate::{
    AmountError, DecimalInput, FormatOptions, Rounding, TokenMath, DEFAULT_SOL_DECIMALS,
    LAMPORTS_PER_SOL,
};

/// Amount math for native SOL (9 decimals).
pub fn lamports_math() -> TokenMath {
    TokenMath {
        decimals: DEFAULT_SOL_DECIMALS,
        scale: LAMPORTS_PER_SOL.into(),
    }
}

/// Converts a SOL amount such as `"1.5"` into lamports, truncating sub-lamport digits.
pub fn lamports_from_sol<'a>(value: impl Into<DecimalInput<'a>>) -> Result<u64, AmountError> {
    let lamports = lamports_math().from_decimal(value, Rounding::Floor, "SOL amount")?;
    u64::try_from(lamports).map_err(|_| AmountError::out_of_range("SOL amount"))
}

/// Formats lamports as a SOL amount without trailing zeros.
pub fn lamports_to_sol_string(lamports: u64) -> String {
    lamports_math().to_decimal_string(lamports.into(), FormatOptions::default())
}
