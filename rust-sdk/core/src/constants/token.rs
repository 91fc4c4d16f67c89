/// The largest number of decimals whose scale (`10^decimals`) fits in a `u128`.
pub const MAX_DECIMALS: u8 = 38;

/// The number of decimals used by native SOL.
pub const DEFAULT_SOL_DECIMALS: u8 = 9;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Denominator for ratios expressed in basis points.
pub const BPS_DENOMINATOR: u16 = 10_000;
