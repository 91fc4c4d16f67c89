mod amount;
mod ratio;
mod sol;

pub use amount::*;
pub use ratio::*;
pub use sol::*;
