// src/geometry.rs
//
// Region-of-interest geometry. Pure functions, no state. A malformed polygon
// (fewer than 3 vertices) contains nothing rather than being an error, so an
// analytic configured with a bad region goes quiet instead of failing the
// stream.

use crate::config::LineOrientation;
use crate::types::Point;

/// Point-in-polygon test for a closed region. A point exactly on an edge or
/// a vertex counts as contained.
pub fn polygon_contains(polygon: &[Point], p: Point) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let n = polygon.len();
    for i in 0..n {
        if on_segment(polygon[i], polygon[(i + 1) % n], p) {
            return true;
        }
    }

    // Ray cast to the right; boundary cases were already handled above.
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > p.y) != (b.y > p.y) {
            // x coordinate where the edge crosses the horizontal through p,
            // kept in integer math via cross-multiplication.
            let dy = (b.y - a.y) as i64;
            let lhs = (p.x - a.x) as i64 * dy;
            let rhs = (b.x - a.x) as i64 * (p.y - a.y) as i64;
            let crosses = if dy > 0 { lhs < rhs } else { lhs > rhs };
            if crosses {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) as i64 * (p.y - a.y) as i64 - (b.y - a.y) as i64 * (p.x - a.x) as i64;
    if cross != 0 {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Collapse a two-point crossing line to its scalar reference value: the mean
/// y for horizontal lines, the mean x for vertical ones.
pub fn line_reference(line: &[Point; 2], orientation: LineOrientation) -> i32 {
    match orientation {
        LineOrientation::Horizontal => (line[0].y + line[1].y) / 2,
        LineOrientation::Vertical => (line[0].x + line[1].x) / 2,
    }
}
