// handles point generation logic

use std::f32::consts::{FRAC_PI_2, TAU};

use glam::Vec2;

use crate::config::{OUTER_RING_POINTS, PLAZA_OFFSET, SPIRAL_BASE_RADIUS, SPIRAL_STEP, SPIRAL_TURN};
use crate::systems::random::Sequencer;
use super::utils::{polygon_area, polygon_centroid, rotate};
use super::voronoi::tessellate;

// generates points in a spiral around (0,0)
// the angle advances with sqrt(i) so seeds spread evenly, radius grows with jitter
pub fn pgen(num_points: usize, rng: &mut Sequencer) -> Vec<Vec2> {
    let start_angle = rng.float() * TAU;
    let mut points = Vec::with_capacity(num_points);

    for i in 0..num_points {
        let t = i as f32;
        let angle = start_angle + t.sqrt() * SPIRAL_TURN;
        let radius = if i == 0 {
            0.0
        } else {
            SPIRAL_BASE_RADIUS + t * (SPIRAL_STEP + rng.float())
        };
        points.push(Vec2::new(angle.cos() * radius, angle.sin() * radius));
    }

    points
}

// replaces seeds 1..=4 with a cross around seed 0 so the central cell comes out square-ish
// drawn speculatively, the rest of the sequence does not depend on it
pub fn plaza_quincunx(points: &mut [Vec2], rng: &mut Sequencer) {
    if points.len() < 5 {
        return;
    }
    rng.save();
    let angle = rng.float() * TAU;
    let arm = PLAZA_OFFSET + 4.0 * rng.float();
    let center = points[0];
    for (k, point) in points.iter_mut().enumerate().skip(1).take(4) {
        *point = center + rotate(Vec2::new(arm, 0.0), angle + (k - 1) as f32 * FRAC_PI_2);
    }
    rng.restore();
}

// synthetic ring far outside the cloud, bounds every real cell
pub fn outer_ring(radius: f32) -> Vec<Vec2> {
    (0..OUTER_RING_POINTS)
        .map(|i| {
            let angle = i as f32 / OUTER_RING_POINTS as f32 * TAU;
            Vec2::new(angle.cos() * radius, angle.sin() * radius)
        })
        .collect()
}

// constrained lloyd's relaxation, accepts fixed points
// the first `pinned` regular points stay put as well
pub fn prelax(
    regular_points: Vec<Vec2>,
    fixed_points: &[Vec2],
    pinned: usize,
    steps: usize,
    merge_threshold: f32,
) -> Vec<Vec2> {
    let mut regular_points = regular_points;

    for _ in 0..steps {
        let mut all_points = regular_points.clone();
        all_points.extend_from_slice(fixed_points);
        let tessellation = tessellate(&all_points, merge_threshold);

        // move each bounded regular cell's generator to its centroid
        for (i, point) in regular_points.iter_mut().enumerate().skip(pinned) {
            let Some(cell) = &tessellation.cells[i] else { continue };
            let polygon: Vec<Vec2> = cell.iter().map(|&c| tessellation.points[c]).collect();
            let area = polygon_area(&polygon);
            if area > f32::EPSILON {
                *point = polygon_centroid(&polygon, area);
            }
        }
    }

    regular_points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spiral_starts_at_origin_and_grows() {
        let mut rng = Sequencer::new(5);
        let points = pgen(64, &mut rng);
        assert_eq!(points.len(), 64);
        assert_eq!(points[0], Vec2::ZERO);
        assert!(points[63].length() > points[1].length());
        assert!(points[1].length() >= SPIRAL_BASE_RADIUS);
    }

    #[test]
    fn test_quincunx_does_not_shift_stream() {
        let mut a = Sequencer::new(42);
        let mut b = Sequencer::new(42);
        let mut points = pgen(16, &mut a);
        let _ = pgen(16, &mut b);
        plaza_quincunx(&mut points, &mut a);
        assert_eq!(a.float(), b.float());
        let d1 = points[1].distance(points[0]);
        let d3 = points[3].distance(points[0]);
        assert!((d1 - d3).abs() < 1e-3);
    }

    #[test]
    fn test_relax_keeps_pinned_points() {
        let mut rng = Sequencer::new(9);
        let points = pgen(40, &mut rng);
        let ring = outer_ring(points[39].length() * 2.0);
        let relaxed = prelax(points.clone(), &ring, 5, 2, 0.01);
        assert_eq!(relaxed.len(), points.len());
        for i in 0..5 {
            assert_eq!(relaxed[i], points[i]);
        }
        assert!(relaxed.iter().skip(5).zip(points.iter().skip(5)).any(|(a, b)| a != b));
    }
}
