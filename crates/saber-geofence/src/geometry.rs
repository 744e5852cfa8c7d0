use crate::rules::{LineAxis, Point};

// Ray casting polygon test. Longitude is x and latitude is y everywhere
// in here; the ray runs toward +x (east).
pub fn point_in_polygon(poly: &[Point], lat: f64, lon: f64) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (poly[i].lon, poly[i].lat);
        let (xj, yj) = (poly[j].lon, poly[j].lat);
        // half-open straddle test; yi != yj whenever it passes
        let straddles = (yi > lat) != (yj > lat);
        if straddles && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// True when the governed coordinate changed sides of `value` between the
/// two samples. Sitting exactly on the line and then leaving it counts.
pub fn crossed_line(axis: LineAxis, value: f64, prev: Point, cur: Point) -> bool {
    let (a, b) = match axis {
        LineAxis::NorthSouth => (prev.lon - value, cur.lon - value),
        LineAxis::EastWest => (prev.lat - value, cur.lat - value),
    };
    if a == 0.0 {
        b != 0.0
    } else {
        (a < 0.0 && b >= 0.0) || (a > 0.0 && b <= 0.0)
    }
}
