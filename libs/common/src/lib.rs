pub mod geo;
pub mod id;

pub use geo::{Coordinate, CoordinateError};
