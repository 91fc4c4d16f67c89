mod sol;
mod spl;

pub use sol::*;
pub use spl::*;
