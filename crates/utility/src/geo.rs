pub const EARTH_RADIUS_KM: f64 = 6371.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

/// Maps a longitude, or a longitude difference, into `[-180, 180)`.
fn wrap_longitude(degrees: f64) -> f64 {
    (degrees + 540.0).rem_euclid(360.0) - 180.0
}

pub fn haversine_distance(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> f64 {
    let lat1_rad = to_radians(latitude_1);
    let lon1_rad = to_radians(longitude_1);
    let lat2_rad = to_radians(latitude_2);
    let lon2_rad = to_radians(longitude_2);

    let dlat = lat2_rad - lat1_rad;
    let dlon = lon2_rad - lon1_rad;

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Closest point on a segment to some other point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProjection {
    /// Position of the projected point along the segment, in `[0, 1]`.
    pub fraction: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Great-circle distance between the point and its projection.
    pub distance_km: f64,
}

/// Projects a point onto the segment `start -> end`. Points are given as
/// `(latitude, longitude)` pairs.
///
/// The projection itself is done on a local equirectangular plane, which is
/// accurate enough for the short segments of a walking route. The reported
/// distance is a haversine distance. Segments take the short way around,
/// so a segment from 179.9 to -179.9 crosses the antimeridian.
pub fn project_onto_segment(
    point: (f64, f64),
    start: (f64, f64),
    end: (f64, f64),
) -> SegmentProjection {
    let scale = to_radians((start.0 + end.0) / 2.0).cos();

    // planar coordinates relative to the segment start
    let (dlon_point, dlon_end) = (
        wrap_longitude(point.1 - start.1),
        wrap_longitude(end.1 - start.1),
    );
    let (px, py) = (dlon_point * scale, point.0 - start.0);
    let (sx, sy) = (dlon_end * scale, end.0 - start.0);

    let length_squared = sx * sx + sy * sy;
    let fraction = if length_squared == 0.0 {
        0.0
    } else {
        ((px * sx + py * sy) / length_squared).clamp(0.0, 1.0)
    };

    let latitude = start.0 + fraction * (end.0 - start.0);
    let longitude = wrap_longitude(start.1 + fraction * dlon_end);

    SegmentProjection {
        fraction,
        latitude,
        longitude,
        distance_km: haversine_distance(point.0, point.1, latitude, longitude),
    }
}
