use model::{Coordinate, Route};
use schemars::JsonSchema;
use serde::Serialize;
use utility::geo;

/// Where the user currently is relative to the active route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteProgress {
    /// Index of the route segment closest to the user.
    pub nearest_segment: usize,
    /// The user's position snapped onto that segment.
    pub snapped: Coordinate,
    pub off_route_km: f64,
    /// Distance left along the route from the snapped position.
    pub remaining_km: f64,
}

impl RouteProgress {
    pub fn locate(route: &Route, position: Coordinate) -> Option<Self> {
        let (nearest_segment, end, projection) = route
            .segments()
            .enumerate()
            .map(|(index, (start, end))| {
                let projection =
                    geo::project_onto_segment(position.lat_lon(), start.lat_lon(), end.lat_lon());
                (index, end, projection)
            })
            .min_by(|a, b| a.2.distance_km.total_cmp(&b.2.distance_km))?;

        let snapped = Coordinate::new(projection.longitude, projection.latitude).ok()?;
        let rest_of_route: f64 = route
            .segments()
            .skip(nearest_segment + 1)
            .map(|(a, b)| a.distance_km(&b))
            .sum();

        Some(Self {
            nearest_segment,
            snapped,
            off_route_km: projection.distance_km,
            remaining_km: snapped.distance_km(&end) + rest_of_route,
        })
    }
}
