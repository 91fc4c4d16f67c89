//! Integer arithmetic over fixed-decimal token amounts.
//!
//! Amounts are carried as non-negative base units (`u128`) scaled by `10^decimals`.
//! Nothing in this crate performs I/O; every operation is pure.

mod constants;
mod math;
mod types;

pub use constants::*;
pub use math::*;
pub use types::*;
