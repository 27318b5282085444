use model::{Coordinate, Route};
use serde::Deserialize;

use crate::ApiError;

pub const CODE_OK: &str = "Ok";

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionsResponse {
    pub code: String,
    pub message: Option<String>,
    #[serde(default)]
    pub routes: Vec<RouteCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteCandidate {
    pub geometry: LineString,
    /// meters
    pub distance: Option<f64>,
    /// seconds
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineString {
    pub coordinates: Vec<[f64; 2]>,
}

impl RouteCandidate {
    pub fn into_route(self) -> Result<Route, ApiError> {
        let coordinates = self
            .geometry
            .coordinates
            .into_iter()
            .map(Coordinate::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Route::new(coordinates)?.with_summary(self.distance, self.duration))
    }
}

impl DirectionsResponse {
    /// Converts the candidates, in the order the service ranked them. Only the
    /// best one has to be valid; broken alternatives are dropped.
    pub fn into_routes(self) -> Result<Vec<Route>, ApiError> {
        if self.code != CODE_OK {
            return Err(ApiError::NoRoute {
                code: self.code,
                message: self.message,
            });
        }

        let mut candidates = self.routes.into_iter();
        let Some(best) = candidates.next() else {
            return Ok(Vec::new());
        };
        let mut routes = vec![best.into_route()?];
        for (index, candidate) in candidates.enumerate() {
            match candidate.into_route() {
                Ok(route) => routes.push(route),
                Err(why) => log::warn!("dropping alternative route {}: {why}", index + 1),
            }
        }
        Ok(routes)
    }
}
