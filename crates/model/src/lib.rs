use std::error;
use std::fmt;

pub mod coordinate;
pub mod profile;
pub mod route;

pub use coordinate::Coordinate;
pub use profile::Profile;
pub use route::{Route, WaypointPair};

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    InvalidCoordinate { longitude: f64, latitude: f64 },
    RouteTooShort(usize),
    Parse(String),
}

impl error::Error for ModelError {}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelError::InvalidCoordinate {
                longitude,
                latitude,
            } => write!(f, "Invalid coordinate ({}, {})", longitude, latitude),
            ModelError::RouteTooShort(len) => {
                write!(f, "Route needs at least two points, got {}", len)
            }
            ModelError::Parse(s) => write!(f, "Parse error: {}", s),
        }
    }
}
