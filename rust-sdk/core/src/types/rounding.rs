/// How a value that falls between two base units is resolved.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rounding {
    /// Drop any remainder.
    #[default]
    Floor,
    /// Round up whenever a non-zero remainder exists.
    Ceil,
    /// Round half up.
    Round,
}
