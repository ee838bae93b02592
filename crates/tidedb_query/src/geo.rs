//! Geospatial helpers for the evaluator.
//!
//! Points are `[longitude, latitude]` pairs, matching the wire encoding.

use serde_json::Value;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Extracts a `[longitude, latitude]` point from a JSON value.
///
/// Accepts a two-element numeric array; anything else is not a point.
#[must_use]
pub fn point_from_value(value: &Value) -> Option<[f64; 2]> {
    let array = value.as_array()?;
    if array.len() != 2 {
        return None;
    }
    Some([array[0].as_f64()?, array[1].as_f64()?])
}

/// Great-circle (haversine) distance between two points, in kilometers.
#[must_use]
pub fn haversine_km(a: [f64; 2], b: [f64; 2]) -> f64 {
    let (lng1, lat1) = (a[0].to_radians(), a[1].to_radians());
    let (lng2, lat2) = (b[0].to_radians(), b[1].to_radians());

    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Containment in an axis-aligned box, boundary inclusive.
#[must_use]
pub fn point_in_box(point: [f64; 2], bottom_left: [f64; 2], upper_right: [f64; 2]) -> bool {
    point[0] >= bottom_left[0]
        && point[0] <= upper_right[0]
        && point[1] >= bottom_left[1]
        && point[1] <= upper_right[1]
}

/// Ray-casting point-in-polygon test.
///
/// Points exactly on an edge may fall either way; the remote endpoint makes
/// the same approximation.
#[must_use]
pub fn point_in_polygon(point: [f64; 2], vertices: &[[f64; 2]]) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i][0], vertices[i][1]);
        let (xj, yj) = (vertices[j][0], vertices[j][1]);
        if ((yi > point[1]) != (yj > point[1]))
            && (point[0] < (xj - xi) * (point[1] - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn point_extraction() {
        assert_eq!(point_from_value(&json!([2.35, 48.85])), Some([2.35, 48.85]));
        assert_eq!(point_from_value(&json!([1.0])), None);
        assert_eq!(point_from_value(&json!([1.0, 2.0, 3.0])), None);
        assert_eq!(point_from_value(&json!("2.35,48.85")), None);
        assert_eq!(point_from_value(&json!([1.0, "x"])), None);
    }

    #[test]
    fn haversine_known_distance() {
        // Paris to London is roughly 344 km.
        let paris = [2.3522, 48.8566];
        let london = [-0.1278, 51.5074];
        let d = haversine_km(paris, london);
        assert!((d - 344.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn haversine_zero_distance() {
        let p = [10.0, 20.0];
        assert!(haversine_km(p, p) < 1e-9);
    }

    #[test]
    fn box_containment() {
        let bl = [0.0, 0.0];
        let ur = [10.0, 10.0];
        assert!(point_in_box([5.0, 5.0], bl, ur));
        assert!(point_in_box([0.0, 10.0], bl, ur)); // boundary inclusive
        assert!(!point_in_box([10.1, 5.0], bl, ur));
        assert!(!point_in_box([5.0, -0.1], bl, ur));
    }

    #[test]
    fn polygon_containment() {
        let triangle = [[0.0, 0.0], [10.0, 0.0], [5.0, 10.0]];
        assert!(point_in_polygon([5.0, 3.0], &triangle));
        assert!(!point_in_polygon([0.0, 5.0], &triangle));
        assert!(!point_in_polygon([-1.0, -1.0], &triangle));
    }
}
