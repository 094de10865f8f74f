pub mod coordinate;
pub mod dvalue;

// Re-export types for convenience.
pub use crate::types::coordinate::{CoordValue, Coordinate};
pub use crate::types::dvalue::{DValue, TryFromDValue};
