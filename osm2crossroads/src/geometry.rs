//! Point-level geometry. Everything here is infallible; callers never see an
//! error from a distance or an angle.
//!
//! Coordinates are WGS84 lon/lat stored as `geo::Point` with x = longitude
//! and y = latitude. Distances are metres over the great circle; short urban
//! segments don't need anything fancier.

use geo::{Area, HaversineDistance, LineString, Point, Polygon};

/// Great-circle distance between two points, in metres.
pub fn distance(p1: Point<f64>, p2: Point<f64>) -> f64 {
    p1.haversine_distance(&p2)
}

/// Initial great-circle bearing from `p1` to `p2`, in degrees in [0, 360).
pub fn bearing(p1: Point<f64>, p2: Point<f64>) -> f64 {
    let lat1 = p1.y().to_radians();
    let lat2 = p2.y().to_radians();
    let delta_lon = (p2.x() - p1.x()).to_radians();
    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Planar azimuth from `p1` to `p2`, clockwise from north, in degrees in
/// [0, 360). Used for sorting directions around a node, where the projection
/// error over a few dozen metres doesn't matter.
pub fn azimuth(p1: Point<f64>, p2: Point<f64>) -> f64 {
    let dx = p2.x() - p1.x();
    let dy = p2.y() - p1.y();
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    dx.atan2(dy).to_degrees().rem_euclid(360.0)
}

/// Smallest absolute difference between two angles in degrees, in [0, 180].
pub fn angular_distance(angle1: f64, angle2: f64) -> f64 {
    let mut a = angle1 - angle2;
    if a > 180.0 {
        a -= 360.0;
    }
    if a < -180.0 {
        a += 360.0;
    }
    a.abs()
}

/// Arithmetic mean of the points. Fine for intersection-sized clusters.
pub fn centroid(points: &[Point<f64>]) -> Point<f64> {
    let mut x = 0.0;
    let mut y = 0.0;
    for p in points {
        x += p.x();
        y += p.y();
    }
    Point::new(x / points.len() as f64, y / points.len() as f64)
}

/// True if the closed polygon through `points` is wound clockwise (in raw
/// lon/lat coordinates). Degenerate polygons count as clockwise.
pub fn polygon_is_clockwise(points: &[Point<f64>]) -> bool {
    let ring: LineString<f64> = points.iter().map(|p| (p.x(), p.y())).collect();
    // geo's shoelace area is positive for counter-clockwise exterior rings.
    Polygon::new(ring, Vec::new()).signed_area() <= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearing_cardinal_directions() {
        let origin = Point::new(3.09, 45.77);
        let north = Point::new(3.09, 45.78);
        let east = Point::new(3.10, 45.77);
        assert!(bearing(origin, north).abs() < 1e-6);
        assert!((bearing(origin, east) - 90.0).abs() < 1.0);
    }

    #[test]
    fn azimuth_quadrants() {
        let origin = Point::new(0.0, 0.0);
        for (pt, expected) in [
            (Point::new(0.0, 1.0), 0.0),
            (Point::new(1.0, 0.0), 90.0),
            (Point::new(0.0, -1.0), 180.0),
            (Point::new(-1.0, 0.0), 270.0),
        ] {
            assert!((azimuth(origin, pt) - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn angular_distance_wraps() {
        assert_eq!(angular_distance(350.0, 10.0), 20.0);
        assert_eq!(angular_distance(10.0, 350.0), 20.0);
        assert_eq!(angular_distance(0.0, 180.0), 180.0);
    }

    #[test]
    fn winding_order() {
        // Clockwise square in x/y
        let cw = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 0.0),
        ];
        let ccw: Vec<_> = cw.iter().rev().cloned().collect();
        assert!(polygon_is_clockwise(&cw));
        assert!(!polygon_is_clockwise(&ccw));
    }
}
