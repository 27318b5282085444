use std::{fmt, str::FromStr};

use schemars::{gen::SchemaGenerator, schema::Schema, JsonSchema};
use serde::{Deserialize, Serialize};
use utility::geo;

use crate::ModelError;

/// A position on earth in degrees. Serialized the GeoJSON way, as
/// `[longitude, latitude]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    longitude: f64,
    latitude: f64,
}

impl Coordinate {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, ModelError> {
        let valid = longitude.is_finite()
            && latitude.is_finite()
            && (-180.0..=180.0).contains(&longitude)
            && (-90.0..=90.0).contains(&latitude);
        if !valid {
            return Err(ModelError::InvalidCoordinate {
                longitude,
                latitude,
            });
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// `(latitude, longitude)`, the argument order of `utility::geo`.
    pub fn lat_lon(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        geo::haversine_distance(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

impl TryFrom<[f64; 2]> for Coordinate {
    type Error = ModelError;

    fn try_from([longitude, latitude]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(longitude, latitude)
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(value: Coordinate) -> Self {
        [value.longitude, value.latitude]
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.longitude, self.latitude)
    }
}

/// Parses `"longitude,latitude"`.
impl FromStr for Coordinate {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (longitude, latitude) = s
            .split_once(',')
            .ok_or_else(|| ModelError::Parse(format!("expected 'lon,lat', got '{s}'")))?;
        let longitude: f64 = longitude
            .trim()
            .parse()
            .map_err(|_| ModelError::Parse(format!("invalid longitude '{longitude}'")))?;
        let latitude: f64 = latitude
            .trim()
            .parse()
            .map_err(|_| ModelError::Parse(format!("invalid latitude '{latitude}'")))?;
        Self::new(longitude, latitude)
    }
}

impl JsonSchema for Coordinate {
    fn schema_name() -> String {
        "Coordinate".to_owned()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        <[f64; 2]>::json_schema(gen)
    }
}
