// UTILS

use glam::Vec2;
use spade::Point2;
use crate::systems::mesh::Polygon;

/// Proper crossing of two segments, touching endpoints excluded.
pub fn segments_cross(p1: Vec2, p2: Vec2, p3: Vec2, p4: Vec2) -> bool {
    const EPS: f32 = 1e-4;
    let s1 = p2 - p1;
    let s2 = p4 - p3;
    let denom = s1.perp_dot(s2);
    if denom.abs() < 1e-6 {
        return false;
    }
    let d = p3 - p1;
    let t = d.perp_dot(s2) / denom;
    let u = d.perp_dot(s1) / denom;
    t > EPS && t < 1.0 - EPS && u > EPS && u < 1.0 - EPS
}

/// Intersection of two infinite lines given as point + direction.
/// # Returns the parameters `(t, u)` along each direction, `None` when parallel
pub fn intersect_lines(p1: Vec2, d1: Vec2, p2: Vec2, d2: Vec2) -> Option<(f32, f32)> {
    let denom = d1.perp_dot(d2);
    if denom.abs() < 1e-9 {
        return None;
    }
    let d = p2 - p1;
    Some((d.perp_dot(d2) / denom, d.perp_dot(d1) / denom))
}

/// Computes the signed area of a polygon
/// # Returns the polygon's area as an `f32`. Returns 0.0 for polygons with fewer than 3 vertices.
pub fn polygon_area(polygon: &Polygon) -> f32 {
    if polygon.len() < 3 {
        return 0.0;
    }

    let n = polygon.len();
    let mut area = 0.0f64;

    for i in 0..n {
        let j = (i + 1) % n;
        area += polygon[i].x as f64 * polygon[j].y as f64 - polygon[j].x as f64 * polygon[i].y as f64;
    }

    (area / 2.0) as f32
}

/// Calculates the centroid of a polygon
/// Returns a `Vec2` representing the centroid position. Falls back to the vertex mean for degenerate polygons.
pub fn polygon_centroid(polygon: &Polygon, area: f32) -> Vec2 {
    if polygon.is_empty() {
        return Vec2::ZERO;
    }
    if polygon.len() < 3 || area.abs() < f32::EPSILON {
        return vertex_mean(polygon);
    }

    let n = polygon.len();
    let (mut cx, mut cy) = (0.0f64, 0.0f64);

    for i in 0..n {
        let j = (i + 1) % n;
        let p = polygon[i].x as f64 * polygon[j].y as f64 - polygon[j].x as f64 * polygon[i].y as f64;
        cx += (polygon[i].x + polygon[j].x) as f64 * p;
        cy += (polygon[i].y + polygon[j].y) as f64 * p;
    }

    let area_6 = 6.0 * area as f64;
    Vec2::new((cx / area_6) as f32, (cy / area_6) as f32)
}

pub fn vertex_mean(polygon: &[Vec2]) -> Vec2 {
    if polygon.is_empty() {
        return Vec2::ZERO;
    }
    polygon.iter().fold(Vec2::ZERO, |acc, p| acc + *p) / polygon.len() as f32
}

pub fn polygon_perimeter(polygon: &[Vec2]) -> f32 {
    let n = polygon.len();
    (0..n).map(|i| polygon[i].distance(polygon[(i + 1) % n])).sum()
}

/// Calculates the circumcenter of a triangle given by three points.
/// # Returns a tuple `(x, y)` representing the circumcenter coordinates.
/// Falls back to the triangle centroid if points are collinear.
pub fn calculate_circumcenter(p1: Point2<f64>, p2: Point2<f64>, p3: Point2<f64>) -> (f64, f64) {
    let (ax, ay) = (p1.x, p1.y);
    let (bx, by) = (p2.x, p2.y);
    let (cx, cy) = (p3.x, p3.y);

    // d = 2 * det | 1 x1 y1 |
    //             | 1 x2 y2 |
    //             | 1 x3 y3 |
    let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));

    if d.abs() < f64::EPSILON {
        return ((ax + bx + cx) / 3.0, (ay + by + cy) / 3.0);
    }

    // linearized perpendicular bisector equations
    let ux = ((ax * ax + ay * ay) * (by - cy)
                 + (bx * bx + by * by) * (cy - ay)
                 + (cx * cx + cy * cy) * (ay - by)) / d;

    let uy = ((ax * ax + ay * ay) * (cx - bx)
                 + (bx * bx + by * by) * (ax - cx)
                 + (cx * cx + cy * cy) * (bx - ax)) / d;

    (ux, uy)
}

/// Determines whether a point is inside a polygon using the ray-casting algorithm.
/// # Returns `true` if the point is inside the polygon, otherwise `false`.
pub fn point_in_polygon(point: &Vec2, polygon: &[Vec2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;

    for i in 0..polygon.len() {
        let yi = polygon[i].y;
        let yj = polygon[j].y;
        let xi = polygon[i].x;
        let xj = polygon[j].x;

        if ((yi > point.y) != (yj > point.y)) &&
           (point.x < (xj - xi) * (point.y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Shortest distance from a point to a segment.
pub fn point_to_segment_distance(point: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < f32::EPSILON {
        return point.distance(a);
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}

/// Rotates a vector counterclockwise by `angle` radians.
pub fn rotate(v: Vec2, angle: f32) -> Vec2 {
    let (s, c) = angle.sin_cos();
    Vec2::new(v.x * c - v.y * s, v.x * s + v.y * c)
}

/// Oriented bounding rectangle of a polygon.
#[derive(Clone, Copy, Debug)]
pub struct OrientedBox {
    pub origin: Vec2, // corner at minimum extent along both axes
    pub axis: Vec2,   // unit vector along the long side
    pub normal: Vec2, // unit vector along the short side
    pub length: f32,
    pub width: f32,
}

impl OrientedBox {
    /// Box of `polygon` aligned to `axis`.
    pub fn along(polygon: &[Vec2], axis: Vec2) -> Option<Self> {
        if polygon.is_empty() || axis.length_squared() < 1e-12 {
            return None;
        }
        let axis = axis.normalize();
        let normal = axis.perp();
        let (mut min_u, mut max_u, mut min_v, mut max_v) =
            (f32::INFINITY, f32::NEG_INFINITY, f32::INFINITY, f32::NEG_INFINITY);
        for p in polygon {
            let u = p.dot(axis);
            let v = p.dot(normal);
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }
        let (length, width) = (max_u - min_u, max_v - min_v);
        let origin = axis * min_u + normal * min_v;
        if length >= width {
            Some(Self { origin, axis, normal, length, width })
        } else {
            // keep `axis` on the long side
            let origin = origin + axis * length;
            Some(Self { origin, axis: normal, normal: -axis, length: width, width: length })
        }
    }

    /// Minimum-area box over the polygon's edge directions.
    pub fn fit(polygon: &[Vec2]) -> Option<Self> {
        let n = polygon.len();
        let mut best: Option<Self> = None;
        for i in 0..n {
            let edge = polygon[(i + 1) % n] - polygon[i];
            if edge.length_squared() < 1e-8 {
                continue;
            }
            if let Some(candidate) = Self::along(polygon, edge) {
                let better = match &best {
                    Some(b) => candidate.area() < b.area() - 1e-6,
                    None => true,
                };
                if better {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    pub fn area(&self) -> f32 {
        self.length * self.width
    }

    /// Point at local coordinates `(u, v)` measured along `axis` and `normal`.
    pub fn at(&self, u: f32, v: f32) -> Vec2 {
        self.origin + self.axis * u + self.normal * v
    }

    pub fn center(&self) -> Vec2 {
        self.at(self.length * 0.5, self.width * 0.5)
    }
}

/// Splits a polygon along the line through `point` with direction `dir`.
///
/// The chord used is the one whose span along the line contains `point`,
/// so concave shapes are cut only where the line actually passes through.
/// # Returns the two halves, or `None` if the line misses the shape
pub fn split_polygon(polygon: &Polygon, point: Vec2, dir: Vec2) -> Option<(Polygon, Polygon)> {
    let n = polygon.len();
    if n < 3 || dir.length_squared() < 1e-12 {
        return None;
    }

    // (param along dir, edge index, hit point)
    let mut hits: Vec<(f32, usize, Vec2)> = Vec::new();
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if let Some((t, u)) = intersect_lines(point, dir, a, b - a) {
            if (0.0..1.0).contains(&u) {
                hits.push((t, i, point + dir * t));
            }
        }
    }
    if hits.len() < 2 || hits.len() % 2 != 0 {
        return None;
    }
    hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    // entry/exit pairs alternate along the line
    let pair = hits.chunks(2).find(|c| c[0].0 <= 0.0 && c[1].0 >= 0.0)?;
    let (mut e1, mut p1) = (pair[0].1, pair[0].2);
    let (mut e2, mut p2) = (pair[1].1, pair[1].2);
    if e1 == e2 {
        return None;
    }
    if e1 > e2 {
        std::mem::swap(&mut e1, &mut e2);
        std::mem::swap(&mut p1, &mut p2);
    }

    let mut first = vec![p1];
    first.extend_from_slice(&polygon[e1 + 1..=e2]);
    first.push(p2);

    let mut second = vec![p2];
    second.extend_from_slice(&polygon[e2 + 1..]);
    second.extend_from_slice(&polygon[..=e1]);
    second.push(p1);

    let first = dedup_points(first);
    let second = dedup_points(second);
    if first.len() < 3 || second.len() < 3 {
        return None;
    }
    Some((first, second))
}

/// Drops consecutive duplicates, including the wrap-around pair.
pub fn dedup_points(mut polygon: Polygon) -> Polygon {
    polygon.dedup_by(|a, b| a.distance_squared(*b) < 1e-8);
    while polygon.len() > 1 && polygon[0].distance_squared(polygon[polygon.len() - 1]) < 1e-8 {
        polygon.pop();
    }
    polygon
}

/// Moves every edge of a CCW polygon inward by its own distance.
///
/// # Returns
/// The inset polygon, or `None` if it collapses or turns inside out.
pub fn inset_polygon(polygon: &Polygon, distances: &[f32]) -> Option<Polygon> {
    let n = polygon.len();
    if n < 3 || distances.len() != n {
        return None;
    }
    let area = polygon_area(polygon);
    if area <= 0.0 {
        return None;
    }

    // offset lines, inward is the left normal for CCW
    let lines: Vec<(Vec2, Vec2)> = (0..n)
        .map(|i| {
            let a = polygon[i];
            let b = polygon[(i + 1) % n];
            let dir = b - a;
            let normal = dir.perp().normalize_or_zero();
            (a + normal * distances[i], dir)
        })
        .collect();

    let mut result = Vec::with_capacity(n);
    for i in 0..n {
        let prev = (i + n - 1) % n;
        let (p0, d0) = lines[prev];
        let (p1, d1) = lines[i];
        match intersect_lines(p0, d0, p1, d1) {
            Some((t, _)) => result.push(p0 + d0 * t),
            // collinear neighbours: shift the shared vertex straight in
            None => result.push(polygon[i] + d1.perp().normalize_or_zero() * distances[i]),
        }
    }

    // an offset edge that runs against its source edge has been overrun
    let overrun = (0..n).any(|i| (result[(i + 1) % n] - result[i]).dot(lines[i].1) <= 0.0);
    if overrun {
        return None;
    }

    let result = dedup_points(result);
    let new_area = polygon_area(&result);
    if result.len() < 3 || new_area <= 0.0 || new_area > area {
        return None;
    }
    // self-intersection check for concave input
    for i in 0..result.len() {
        let a1 = result[i];
        let a2 = result[(i + 1) % result.len()];
        for j in (i + 2)..result.len() {
            if i == 0 && j == result.len() - 1 {
                continue;
            }
            let b1 = result[j];
            let b2 = result[(j + 1) % result.len()];
            if segments_cross(a1, a2, b1, b2) {
                return None;
            }
        }
    }
    Some(result)
}

/// Uniform inset by the same distance on every edge.
pub fn shrink(polygon: &Polygon, distance: f32) -> Option<Polygon> {
    inset_polygon(polygon, &vec![distance; polygon.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f32) -> Polygon {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(size, 0.0),
            Vec2::new(size, size),
            Vec2::new(0.0, size),
        ]
    }

    #[test]
    fn test_area_and_centroid() {
        let sq = square(4.0);
        let area = polygon_area(&sq);
        assert!((area - 16.0).abs() < 1e-5);
        assert!(polygon_centroid(&sq, area).distance(Vec2::new(2.0, 2.0)) < 1e-5);
    }

    #[test]
    fn test_segments_cross_ignores_shared_endpoint() {
        let a = Vec2::ZERO;
        assert!(!segments_cross(a, Vec2::X, a, Vec2::Y));
        assert!(segments_cross(Vec2::new(-1.0, 0.5), Vec2::new(1.0, 0.5), Vec2::new(0.0, 0.0), Vec2::new(0.0, 1.0)));
    }

    #[test]
    fn test_split_square_in_half() {
        let sq = square(2.0);
        let (a, b) = split_polygon(&sq, Vec2::new(1.0, 1.0), Vec2::Y).unwrap();
        assert!((polygon_area(&a) - 2.0).abs() < 1e-4);
        assert!((polygon_area(&b) - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_split_misses_outside_point() {
        let sq = square(2.0);
        assert!(split_polygon(&sq, Vec2::new(5.0, 1.0), Vec2::Y).is_none());
    }

    #[test]
    fn test_split_concave_uses_local_chord() {
        // U shape, the vertical line at x=0.5 crosses only the left arm
        let u: Polygon = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(3.0, 0.0),
            Vec2::new(3.0, 3.0),
            Vec2::new(2.0, 3.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 3.0),
            Vec2::new(0.0, 3.0),
        ];
        let (a, b) = split_polygon(&u, Vec2::new(1.5, 0.5), Vec2::Y).unwrap();
        let total = polygon_area(&a) + polygon_area(&b);
        assert!((total - polygon_area(&u)).abs() < 1e-3);
    }

    #[test]
    fn test_inset_square() {
        let sq = square(10.0);
        let inner = inset_polygon(&sq, &[1.0, 2.0, 1.0, 2.0]).unwrap();
        assert!((polygon_area(&inner) - 8.0 * 6.0).abs() < 1e-3);
    }

    #[test]
    fn test_inset_collapse_returns_none() {
        assert!(shrink(&square(2.0), 1.5).is_none());
    }

    #[test]
    fn test_inset_past_the_middle_is_rejected() {
        let hexagon: Polygon = (0..6)
            .map(|i| {
                let a = i as f32 * std::f32::consts::TAU / 6.0;
                Vec2::new(a.cos(), a.sin()) * 2.0
            })
            .collect();
        // apothem is sqrt(3), so 2.5 overruns every edge
        assert!(shrink(&hexagon, 2.5).is_none());
        let inner = shrink(&hexagon, 1.0).unwrap();
        assert!(polygon_area(&inner) < polygon_area(&hexagon));

        // one thick side on a thin strip
        let strip = vec![Vec2::ZERO, Vec2::new(10.0, 0.0), Vec2::new(10.0, 2.0), Vec2::new(0.0, 2.0)];
        assert!(inset_polygon(&strip, &[0.5, 0.5, 1.8, 0.5]).is_none());
        assert!(inset_polygon(&strip, &[0.5, 0.5, 1.0, 0.5]).is_some());
    }

    #[test]
    fn test_oriented_box_of_rotated_rect() {
        let rect: Polygon = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(8.0, 0.0),
            Vec2::new(8.0, 2.0),
            Vec2::new(0.0, 2.0),
        ]
        .into_iter()
        .map(|p| rotate(p, 0.6))
        .collect();
        let obb = OrientedBox::fit(&rect).unwrap();
        assert!((obb.length - 8.0).abs() < 1e-3);
        assert!((obb.width - 2.0).abs() < 1e-3);
        assert!((obb.area() - polygon_area(&rect)).abs() < 1e-2);
    }
}
