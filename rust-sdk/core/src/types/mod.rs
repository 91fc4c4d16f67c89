mod decimal;
mod error;
mod ratio;
mod rounding;

pub use decimal::*;
pub use error::*;
pub use ratio::*;
pub use rounding::*;
