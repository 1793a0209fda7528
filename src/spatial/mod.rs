//! Spatial engine
//!
//! Geometry construction and geodesic calculations on WGS84 (EPSG:4326).
//!
//! Every function here takes coordinates in (longitude, latitude) order,
//! i.e. (x, y). This is the OGC/`geo` convention and the opposite of how
//! positions are usually read out loud, so watch the argument order.
//!
//! Nothing in this module validates coordinates; see [`crate::validation`].

use std::f64::consts::PI;

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{Coord, HaversineBearing, LineString, Point, Polygon};
use tracing::debug;

use crate::error::GeometryError;


/// WGS84, the GPS coordinate reference system
pub const SRID_WGS84: u32 = 4326;

/// Approximate metres per degree of latitude
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Mean Earth radius used by the spherical fallback
pub const EARTH_MEAN_RADIUS_METRES: f64 = 6_371_000.0;

/// Segments per quarter circle when approximating circular fences
pub const CIRCLE_QUADRANT_SEGMENTS: usize = 64;

/// WGS84 semi-major axis
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;

const VINCENTY_TOLERANCE: f64 = 1e-12;
const VINCENTY_MAX_ITERATIONS: usize = 200;

/// Create a point from WGS84 coordinates.
#[inline]
pub fn create_point(longitude: f64, latitude: f64) -> Point {
    Point::new(longitude, latitude)
}

/// Create a polygon from `[longitude, latitude]` pairs.
///
/// The ring is closed by repeating the first coordinate when the caller did
/// not already close it, so `n` open coordinates yield a ring of `n + 1`.
pub fn create_polygon(coordinates: &[[f64; 2]]) -> Result<Polygon, GeometryError> {
    if coordinates.len() < 3 {
        return Err(GeometryError::TooFewCoordinates(coordinates.len()));
    }

    let mut ring: Vec<Coord> = coordinates
        .iter()
        .map(|[x, y]| Coord { x: *x, y: *y })
        .collect();

    if ring.first() != ring.last() {
        ring.push(ring[0]);
    }

    Ok(Polygon::new(LineString::new(ring), vec![]))
}

/// Approximate a circle around a centre point as a polygon.
///
/// The radius is converted to degrees with a flat 111,320 m/degree factor, so
/// the shape is a true circle in degree space only. Good enough for
/// city-scale fences, not for geodesic work near the poles.
pub fn create_circular_fence(
    longitude: f64,
    latitude: f64,
    radius_metres: f64,
) -> Result<Polygon, GeometryError> {
    if !(radius_metres.is_finite() && radius_metres > 0.0) {
        return Err(GeometryError::InvalidRadius(radius_metres));
    }

    let radius_degrees = radius_metres / METRES_PER_DEGREE;
    let segments = CIRCLE_QUADRANT_SEGMENTS * 4;

    let mut ring: Vec<Coord> = (0..segments)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / segments as f64;
            Coord {
                x: longitude + radius_degrees * angle.cos(),
                y: latitude + radius_degrees * angle.sin(),
            }
        })
        .collect();
    ring.push(ring[0]);

    Ok(Polygon::new(LineString::new(ring), vec![]))
}

/// Create a route line from ordered `[longitude, latitude]` pairs.
pub fn create_line_string(coordinates: &[[f64; 2]]) -> LineString {
    coordinates
        .iter()
        .map(|[x, y]| Coord { x: *x, y: *y })
        .collect::<Vec<_>>()
        .into()
}

/// True when the point is inside the polygon or on its boundary.
#[inline]
pub fn contains(polygon: &Polygon, point: &Point) -> bool {
    polygon.coordinate_position(&point.0) != CoordPos::Outside
}

/// Geodesic distance in metres on the WGS84 ellipsoid.
///
/// Vincenty's inverse formula, iterated until |Δλ| ≤ 1e-12 or 200 steps.
/// Nearly antipodal pairs can fail to converge; those fall back to the
/// haversine distance instead of failing.
pub fn distance_metres(a: &Point, b: &Point) -> f64 {
    match vincenty_metres(a, b) {
        Some(d) => d,
        None => {
            debug!(
                from = ?a.x_y(),
                to = ?b.x_y(),
                "Vincenty did not converge, using haversine"
            );
            haversine_metres(a, b)
        }
    }
}

/// Vincenty inverse, `None` when the iteration does not converge
fn vincenty_metres(a: &Point, b: &Point) -> Option<f64> {
    let minor = WGS84_A * (1.0 - WGS84_F);

    let u1 = ((1.0 - WGS84_F) * a.y().to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * b.y().to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let delta_lambda = (b.x() - a.x()).to_radians();
    let mut lambda = delta_lambda;

    for _ in 0..VINCENTY_MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();

        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        // Coincident points
        if sin_sigma == 0.0 {
            return Some(0.0);
        }

        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos2_alpha = 1.0 - sin_alpha * sin_alpha;
        // Zero on the equator
        let cos_2sigma_m = if cos2_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos2_alpha
        } else {
            0.0
        };

        let c = WGS84_F / 16.0 * cos2_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos2_alpha));
        let previous = lambda;
        lambda = delta_lambda
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

        if (lambda - previous).abs() > VINCENTY_TOLERANCE {
            continue;
        }

        let u_sq = cos2_alpha * (WGS84_A * WGS84_A - minor * minor) / (minor * minor);
        let big_a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
        let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
        let delta_sigma = big_b
            * sin_sigma
            * (cos_2sigma_m
                + big_b / 4.0
                    * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                        - big_b / 6.0
                            * cos_2sigma_m
                            * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                            * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));

        let distance = minor * big_a * (sigma - delta_sigma);
        return distance.is_finite().then_some(distance);
    }

    None
}

/// Great-circle distance on a sphere of radius 6,371 km.
pub fn haversine_metres(a: &Point, b: &Point) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let d_lat = (b.y() - a.y()).to_radians();
    let d_lon = (b.x() - a.x()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_MEAN_RADIUS_METRES * c
}

/// Initial great-circle bearing in degrees, [0, 360) with 0 = north.
///
/// Spherical only, no ellipsoid correction.
pub fn bearing(from: &Point, to: &Point) -> f64 {
    let b = from.haversine_bearing(*to);

    (b + 360.0) % 360.0
}

/// Sum of the geodesic lengths of consecutive segments.
pub fn route_length_metres(route: &LineString) -> f64 {
    route
        .lines()
        .map(|seg| distance_metres(&seg.start_point(), &seg.end_point()))
        .sum()
}
