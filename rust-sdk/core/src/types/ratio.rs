use crate::{AmountError, BPS_DENOMINATOR};

/// An immutable, non-negative fraction used to scale amounts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ratio {
    numerator: u128,
    denominator: u128,
}

impl Ratio {
    /// Creates a ratio, rejecting a zero denominator.
    pub fn new(numerator: u128, denominator: u128) -> Result<Self, AmountError> {
        if denominator == 0 {
            return Err(AmountError::ZeroDenominator);
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Creates a ratio from basis points, e.g. `50` for half a percent.
    pub fn from_bps(bps: u16) -> Self {
        Self {
            numerator: bps.into(),
            denominator: BPS_DENOMINATOR.into(),
        }
    }

    pub fn numerator(&self) -> u128 {
        self.numerator
    }

    pub fn denominator(&self) -> u128 {
        self.denominator
    }
}
