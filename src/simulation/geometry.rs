//! Polygon and path geometry used by the path planners
//!
//! Everything here is best-effort: degenerate input gives an empty or short
//! result, never an error.

use cavalier_contours::polyline::{PlineSource, PlineSourceMut, PlineVertex, Polyline};
use ordered_float::OrderedFloat;

use super::mask::{CoverageMask, PixelRect};
use super::types::Position;

/// Points closer than this are treated as duplicates when preparing offsets
const DUPLICATE_TOLERANCE: f64 = 0.01;

/// Signed shoelace area. Positive for counter-clockwise in a y-up frame.
pub fn signed_area(polygon: &[Position]) -> f32 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..polygon.len() {
        let p1 = polygon[i];
        let p2 = polygon[(i + 1) % polygon.len()];
        area += p1.x * p2.y - p2.x * p1.y;
    }
    area / 2.0
}

/// Remove duplicate vertices (including a repeated closing vertex) and orient
/// clockwise so a negative parallel offset moves inwards.
fn prepare_polygon(polygon: &[Position]) -> Polyline<f64> {
    let mut clean: Vec<(f64, f64)> = Vec::with_capacity(polygon.len());
    for p in polygon {
        let (x, y) = (p.x as f64, p.y as f64);
        let is_duplicate = clean.last().is_some_and(|&(lx, ly)| {
            ((x - lx).powi(2) + (y - ly).powi(2)).sqrt() <= DUPLICATE_TOLERANCE
        });
        if !is_duplicate {
            clean.push((x, y));
        }
    }
    if clean.len() > 1 {
        let (fx, fy) = clean[0];
        if let Some(&(lx, ly)) = clean.last() {
            if ((fx - lx).powi(2) + (fy - ly).powi(2)).sqrt() <= DUPLICATE_TOLERANCE {
                clean.pop();
            }
        }
    }

    let mut area = 0.0;
    for i in 0..clean.len() {
        let (x1, y1) = clean[i];
        let (x2, y2) = clean[(i + 1) % clean.len()];
        area += x1 * y2 - x2 * y1;
    }
    if area > 0.0 {
        clean.reverse();
    }

    let mut polyline = Polyline::new();
    for (x, y) in clean {
        polyline.add_vertex(PlineVertex::new(x, y, 0.0));
    }
    polyline.set_is_closed(true);
    polyline
}

/// Inward offset of a closed polygon by `distance` pixels.
///
/// The result is rounded to whole pixels and densified so consecutive points
/// are 8-connected. When the offset splits the polygon the largest piece is
/// kept; when it collapses the result is empty.
pub fn shrink_polygon(polygon: &[Position], distance: f32) -> Vec<Position> {
    let polyline = prepare_polygon(polygon);
    if polyline.vertex_data.len() < 3 {
        return Vec::new();
    }
    if distance <= 0.0 {
        let points: Vec<Position> = polyline
            .vertex_data
            .iter()
            .map(|v| Position::new(v.x.round() as f32, v.y.round() as f32))
            .collect();
        return densify(&points);
    }

    let offsets = polyline.parallel_offset(-(distance as f64));
    let largest = offsets
        .into_iter()
        .map(|pline| {
            pline
                .vertex_data
                .iter()
                .map(|v| Position::new(v.x.round() as f32, v.y.round() as f32))
                .collect::<Vec<_>>()
        })
        .filter(|points| points.len() >= 3)
        .max_by_key(|points| OrderedFloat(signed_area(points).abs()));

    match largest {
        Some(points) if signed_area(&points).abs() > 0.0 => densify(&points),
        _ => Vec::new(),
    }
}

/// Integer pixels on the line from `a` to `b`, both ends inclusive
pub fn bresenham(a: (i32, i32), b: (i32, i32)) -> Vec<(i32, i32)> {
    let dx = (b.0 - a.0).abs();
    let dy = (b.1 - a.1).abs();
    let sx = if a.0 < b.0 { 1 } else { -1 };
    let sy = if a.1 < b.1 { 1 } else { -1 };

    let mut err = dx - dy;
    let (mut x, mut y) = a;
    let mut points = Vec::with_capacity((dx.max(dy) + 1) as usize);

    loop {
        points.push((x, y));
        if x == b.0 && y == b.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
    points
}

/// Fill every edge of a closed polygon with its intermediate pixels.
/// The closing vertex is not repeated.
pub fn densify(polygon: &[Position]) -> Vec<Position> {
    let mut dense: Vec<Position> = Vec::new();
    for i in 0..polygon.len() {
        let start = polygon[i].rounded();
        let end = polygon[(i + 1) % polygon.len()].rounded();
        let mut segment = bresenham(start, end);
        segment.pop();
        for (x, y) in segment {
            let point = Position::new(x as f32, y as f32);
            if dense.last() != Some(&point) {
                dense.push(point);
            }
        }
    }
    if dense.len() > 1 && dense.first() == dense.last() {
        dense.pop();
    }
    dense
}

/// Axis-aligned bounding rect of a polygon
pub fn get_polygon_rect(polygon: &[Position]) -> PixelRect {
    if polygon.is_empty() {
        return PixelRect::default();
    }
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for p in polygon {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    let x = min_x.floor() as i32;
    let y = min_y.floor() as i32;
    PixelRect::new(x, y, max_x.ceil() as i32 - x, max_y.ceil() as i32 - y)
}

/// Walk `line` pixel by pixel and group consecutive pixels inside `mask`
/// into runs. Each run is one candidate interior span; concave shapes give
/// several runs per line.
pub fn line_collides_mask(line: (Position, Position), mask: &CoverageMask) -> Vec<Vec<Position>> {
    let mut collisions: Vec<Vec<Position>> = Vec::new();
    let mut last_was_collision = false;

    for (x, y) in bresenham(line.0.rounded(), line.1.rounded()) {
        if mask.get(x, y) {
            if !last_was_collision {
                collisions.push(Vec::new());
            }
            if let Some(run) = collisions.last_mut() {
                run.push(Position::new(x as f32, y as f32));
            }
            last_was_collision = true;
        } else {
            last_was_collision = false;
        }
    }
    collisions
}

/// Index of the polygon vertex nearest to `point`
pub fn closest_point_index(point: &Position, polygon: &[Position]) -> Option<usize> {
    polygon
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| OrderedFloat(point.distance(p)))
        .map(|(i, _)| i)
}

/// Total length of an open polyline
pub fn path_length(points: &[Position]) -> f32 {
    points.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

/// Vertices of the closed `boundary` walked from index `from` to index `to`
/// inclusive, stepping forwards or backwards with wrap-around.
fn boundary_arc(boundary: &[Position], from: usize, to: usize, forwards: bool) -> Vec<Position> {
    let n = boundary.len();
    let mut arc = vec![boundary[from]];
    let mut i = from;
    while i != to {
        i = if forwards { (i + 1) % n } else { (i + n - 1) % n };
        arc.push(boundary[i]);
    }
    arc
}

/// Shorter of the two arcs of `boundary` between the vertices nearest to
/// `point_start` and `point_end`, ordered from start to end.
pub fn trace_collision_boundary(
    point_start: &Position,
    point_end: &Position,
    boundary: &[Position],
) -> Vec<Position> {
    let (Some(start), Some(end)) = (
        closest_point_index(point_start, boundary),
        closest_point_index(point_end, boundary),
    ) else {
        return Vec::new();
    };
    if start == end {
        return vec![boundary[start]];
    }

    let forwards = boundary_arc(boundary, start, end, true);
    let backwards = boundary_arc(boundary, start, end, false);
    if path_length(&forwards) <= path_length(&backwards) {
        forwards
    } else {
        backwards
    }
}

/// Length of the arc complementary to the one `trace_collision_boundary`
/// picks. Used to check that the trace is never the longer way round.
pub fn complementary_arc_length(point_start: &Position, point_end: &Position, boundary: &[Position]) -> f32 {
    let (Some(start), Some(end)) = (
        closest_point_index(point_start, boundary),
        closest_point_index(point_end, boundary),
    ) else {
        return 0.0;
    };
    if start == end {
        return 0.0;
    }
    let forwards = path_length(&boundary_arc(boundary, start, end, true));
    let backwards = path_length(&boundary_arc(boundary, start, end, false));
    forwards.max(backwards)
}

/// Collapse a cluster of points into straight segments. A segment grows
/// while every point it covers stays within `tolerance` pixels of the line
/// from its first point to its newest one.
pub fn lines_from_points(points: &[Position], tolerance: f32) -> Vec<(Position, Position)> {
    let mut lines = Vec::new();
    if points.len() < 2 {
        return lines;
    }

    let mut start = 0;
    for i in 2..points.len() {
        let fits = points[start + 1..i]
            .iter()
            .all(|p| perpendicular_distance(p, &points[start], &points[i]) <= tolerance);
        if !fits {
            lines.push((points[start], points[i - 1]));
            start = i - 1;
        }
    }
    lines.push((points[start], points[points.len() - 1]));
    lines
}

/// Reduce a dense polyline to the corners of its straight stretches
pub fn simplify_path(points: &[Position], tolerance: f32) -> Vec<Position> {
    let lines = lines_from_points(points, tolerance);
    let Some(first) = lines.first() else {
        return points.to_vec();
    };
    let mut simplified = vec![first.0];
    simplified.extend(lines.iter().map(|(_, end)| *end));
    simplified
}

fn perpendicular_distance(point: &Position, line_start: &Position, line_end: &Position) -> f32 {
    let direction = *line_end - *line_start;
    let length = direction.length();
    if length == 0.0 {
        return point.distance(line_start);
    }
    let offset = *point - *line_start;
    (direction.x * offset.y - direction.y * offset.x).abs() / length
}

/// Minimum distance from `point` to any edge of a closed polygon
pub fn distance_to_polygon(point: &Position, polygon: &[Position]) -> f32 {
    let n = polygon.len();
    (0..n)
        .map(|i| distance_to_segment(point, &polygon[i], &polygon[(i + 1) % n]))
        .min_by_key(|d| OrderedFloat(*d))
        .unwrap_or(f32::INFINITY)
}

fn distance_to_segment(point: &Position, a: &Position, b: &Position) -> f32 {
    let ab = *b - *a;
    let length_sq = ab.dot(&ab);
    if length_sq == 0.0 {
        return point.distance(a);
    }
    let t = ((*point - *a).dot(&ab) / length_sq).clamp(0.0, 1.0);
    point.distance(&a.lerp(b, t))
}

/// Even-odd point-in-polygon test
pub fn point_in_polygon(point: &Position, polygon: &[Position]) -> bool {
    let n = polygon.len();
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Signed shortest rotation from `from` to `to` in degrees, in [-180, 180)
pub fn angle_difference(from: f32, to: f32) -> f32 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}
