use std::f32::consts::TAU;

use glam::Vec2;
use tracing::trace;

use crate::config::{MAX_CUT_ATTEMPTS, MAX_RECURSION_DEPTH};
use crate::systems::mesh::Polygon;
use crate::systems::random::Sequencer;
use super::utils::{
    polygon_area, polygon_centroid, point_to_segment_distance, rotate, split_polygon, OrientedBox,
};

// fixed offsets tried by the fallback cut, as fractions of the long side
const FALLBACK_OFFSETS: usize = 8;

/// One accepted cut.
#[derive(Clone, Copy, Debug)]
pub struct Cut {
    pub start: Vec2,
    pub end: Vec2,
    /// Larger half over smaller half.
    pub ratio: f32,
}

/// Recursive polygon bisection into blocks or lots.
///
/// A shape is terminal once its area drops below a jittered threshold
/// `min_area * variance^|normal4 - 1|`. Otherwise it is cut across the long
/// side of its bounding box; a cut is kept only if both halves reach
/// `min_lot` and the larger half is at most `2 * variance` times the smaller.
#[derive(Clone, Debug)]
pub struct Bisector {
    pub min_area: f32,
    pub variance: f32,
    pub min_lot: f32,
    /// Space left open along every cut (alleys between blocks).
    pub gap: f32,
    pub max_attempts: usize,
    pub max_depth: usize,
    pub cuts: Vec<Cut>,
}

impl Bisector {
    pub fn new(min_area: f32, variance: f32) -> Self {
        Self {
            min_area,
            variance: variance.max(1.0),
            min_lot: min_area * 0.25,
            gap: 0.0,
            max_attempts: MAX_CUT_ATTEMPTS,
            max_depth: MAX_RECURSION_DEPTH,
            cuts: Vec::new(),
        }
    }

    pub fn with_gap(mut self, gap: f32) -> Self {
        self.gap = gap.max(0.0);
        self
    }

    pub fn with_min_lot(mut self, min_lot: f32) -> Self {
        self.min_lot = min_lot.max(0.0);
        self
    }

    pub fn with_limits(mut self, max_attempts: usize, max_depth: usize) -> Self {
        self.max_attempts = max_attempts;
        self.max_depth = max_depth;
        self
    }

    /// Splits `shape` into terminal pieces.
    ///
    /// A shape that cannot be cut comes back whole, so the result is never
    /// empty for a non-degenerate input.
    pub fn partition(&mut self, shape: &Polygon, rng: &mut Sequencer) -> Vec<Polygon> {
        let mut pieces = Vec::new();
        self.subdivide(shape.clone(), 0, rng, &mut pieces);
        pieces
    }

    fn subdivide(&mut self, shape: Polygon, depth: usize, rng: &mut Sequencer, out: &mut Vec<Polygon>) {
        // constrain depth
        if depth >= self.max_depth || shape.len() < 3 || self.is_atomic(&shape, rng) {
            out.push(shape);
            return;
        }

        match self.make_cut(&shape, rng) {
            Some((first, second, cut)) => {
                self.cuts.push(cut);
                self.subdivide(first, depth + 1, rng, out);
                self.subdivide(second, depth + 1, rng, out);
            }
            None => out.push(shape),
        }
    }

    fn is_atomic(&self, shape: &Polygon, rng: &mut Sequencer) -> bool {
        let threshold = self.min_area * self.variance.powf((rng.normal4() - 1.0).abs());
        polygon_area(shape).abs() < threshold
    }

    fn make_cut(&self, shape: &Polygon, rng: &mut Sequencer) -> Option<(Polygon, Polygon, Cut)> {
        let area = polygon_area(shape);
        if area < self.min_lot * 2.0 {
            return None;
        }
        let centroid = polygon_centroid(shape, area);

        for attempt in 0..self.max_attempts {
            // first try the tight box, then tilt the axis a tenth of a turn per attempt
            let obb = if attempt == 0 {
                OrientedBox::fit(shape)
            } else {
                OrientedBox::along(shape, rotate(Vec2::X, attempt as f32 / 10.0 * TAU))
            };
            let Some(obb) = obb else { continue };
            if obb.length < f32::EPSILON {
                return None;
            }

            let local = centroid - obb.origin;
            let projection = local.dot(obb.axis) / obb.length;
            let offset = (projection + rng.normal3()) * 0.5;
            let point = obb.at(offset * obb.length, local.dot(obb.normal));

            match self.try_cut(shape, area, point, obb) {
                Some(result) => return Some(result),
                None => trace!(attempt, "bisector rejected cut"),
            }
        }

        self.fallback_cut(shape, area)
    }

    // most balanced of a few fixed offsets along the tight box
    fn fallback_cut(&self, shape: &Polygon, area: f32) -> Option<(Polygon, Polygon, Cut)> {
        let obb = OrientedBox::fit(shape)?;
        let local = polygon_centroid(shape, area) - obb.origin;
        (1..FALLBACK_OFFSETS)
            .filter_map(|k| {
                let u = k as f32 / FALLBACK_OFFSETS as f32 * obb.length;
                self.try_cut(shape, area, obb.at(u, local.dot(obb.normal)), obb)
            })
            .min_by(|a, b| a.2.ratio.partial_cmp(&b.2.ratio).unwrap_or(std::cmp::Ordering::Equal))
    }

    fn try_cut(&self, shape: &Polygon, area: f32, point: Vec2, obb: OrientedBox) -> Option<(Polygon, Polygon, Cut)> {
        let (first, second) = split_polygon(shape, point, obb.normal)?;

        // a cut through a pinched outline can drop or double area
        let (a0, a1) = (polygon_area(&first), polygon_area(&second));
        if a0 <= 0.0 || a1 <= 0.0 || (a0 + a1 - area).abs() > area * 0.01 {
            return None;
        }

        let (cut_start, cut_end) = chord(&first, point, obb.normal);
        let reach = obb.length + obb.width;
        let start = point - obb.normal * reach;
        let end = point + obb.normal * reach;
        let (first, second) = if self.gap > 0.0 {
            (
                push_polygon_from_line(&first, start, end, self.gap * 0.5),
                push_polygon_from_line(&second, start, end, self.gap * 0.5),
            )
        } else {
            (first, second)
        };

        let (a0, a1) = (polygon_area(&first), polygon_area(&second));
        let (small, large) = if a0 < a1 { (a0, a1) } else { (a1, a0) };
        if small < self.min_lot || small <= 0.0 {
            return None;
        }
        let ratio = large / small;
        if ratio > 2.0 * self.variance {
            return None;
        }

        Some((first, second, Cut { start: cut_start, end: cut_end, ratio }))
    }
}

// extent of the cut line over a half, for drawing alleys
fn chord(polygon: &Polygon, point: Vec2, dir: Vec2) -> (Vec2, Vec2) {
    let mut min_t = f32::INFINITY;
    let mut max_t = f32::NEG_INFINITY;
    for &p in polygon {
        let off = p - point;
        // only vertices lying on the cut
        if off.perp_dot(dir).abs() < 1e-3 {
            let t = off.dot(dir);
            min_t = min_t.min(t);
            max_t = max_t.max(t);
        }
    }
    if min_t > max_t {
        return (point, point);
    }
    (point + dir * min_t, point + dir * max_t)
}

/// Shrinks a polygon away from a line by moving vertices that are close to the line.
///
/// # Returns
/// A new polygon with vertices moved away from the line.
/// Returns original if shrinking makes its area degenerate
pub fn push_polygon_from_line(
    polygon: &Polygon,
    line_start: Vec2,
    line_end: Vec2,
    distance: f32,
) -> Polygon {
    if polygon.len() < 3 {
        return polygon.clone();
    }

    let line_dir = (line_end - line_start).normalize_or_zero();
    let line_normal = line_dir.perp();

    // determine which side of the line the polygon centroid is on
    let area = polygon_area(polygon);
    let centroid = polygon_centroid(polygon, area);
    let separation_direction = if (centroid - line_start).dot(line_normal) > 0.0 {
        line_normal
    } else {
        -line_normal
    };

    // move vertices that lie on or right next to the cut
    let shrunk_polygon: Polygon = polygon
        .iter()
        .map(|&vertex| {
            if point_to_segment_distance(vertex, line_start, line_end) < distance * 0.5 {
                vertex + separation_direction * distance
            } else {
                vertex
            }
        })
        .collect();

    // prevent degeneration, fallback
    if polygon_area(&shrunk_polygon) < area * 0.2 {
        polygon.clone()
    } else {
        shrunk_polygon
    }
}
