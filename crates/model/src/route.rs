use itertools::Itertools;
use schemars::JsonSchema;
use serde::Serialize;

use crate::{Coordinate, ModelError};

/// Start and end of a requested route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaypointPair {
    pub origin: Coordinate,
    pub destination: Coordinate,
}

impl WaypointPair {
    pub fn new(origin: Coordinate, destination: Coordinate) -> Self {
        Self {
            origin,
            destination,
        }
    }
}

/// Path from an origin to a destination, as computed by a directions service.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    coordinates: Vec<Coordinate>,
    distance_m: Option<f64>,
    duration_s: Option<f64>,
}

impl Route {
    pub fn new(coordinates: Vec<Coordinate>) -> Result<Self, ModelError> {
        if coordinates.len() < 2 {
            return Err(ModelError::RouteTooShort(coordinates.len()));
        }
        Ok(Self {
            coordinates,
            distance_m: None,
            duration_s: None,
        })
    }

    /// Attaches the distance and duration estimates reported by the service.
    pub fn with_summary(mut self, distance_m: Option<f64>, duration_s: Option<f64>) -> Self {
        self.distance_m = distance_m;
        self.duration_s = duration_s;
        self
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn origin(&self) -> Coordinate {
        self.coordinates[0]
    }

    pub fn destination(&self) -> Coordinate {
        self.coordinates[self.coordinates.len() - 1]
    }

    pub fn distance_m(&self) -> Option<f64> {
        self.distance_m
    }

    pub fn duration_s(&self) -> Option<f64> {
        self.duration_s
    }

    /// Consecutive point pairs, in route order.
    pub fn segments(&self) -> impl Iterator<Item = (Coordinate, Coordinate)> + '_ {
        self.coordinates.iter().copied().tuple_windows()
    }

    /// Length along the geometry, independent of the service's estimate.
    pub fn length_km(&self) -> f64 {
        self.segments().map(|(a, b)| a.distance_km(&b)).sum()
    }
}
