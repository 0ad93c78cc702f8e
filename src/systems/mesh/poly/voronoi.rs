use std::collections::HashMap;

use glam::Vec2;
use spade::{DelaunayTriangulation, Point2, Triangulation as _, LastUsedVertexHintGenerator};

use crate::systems::mesh::SkeletonData;
use super::utils::{calculate_circumcenter, polygon_area};

/// Dual of a Delaunay triangulation: merged circumcenters plus one cell per generator.
pub(crate) struct Tessellation {
    pub points: Vec<Vec2>,
    /// `None` for generators on the convex hull (unbounded cells) or dropped as duplicates.
    pub cells: Vec<Option<Vec<usize>>>,
}

pub(crate) fn tessellate(generators: &[Vec2], merge_threshold: f32) -> Tessellation {
    let mut triangulation: DelaunayTriangulation<Point2<f64>, (), (), (), LastUsedVertexHintGenerator> = DelaunayTriangulation::new();
    let handles: Vec<_> = generators
        .iter()
        .map(|p| triangulation.insert(Point2::new(p.x as f64, p.y as f64)).ok())
        .collect();

    // calculate circumcenters
    let mut face_slot: HashMap<usize, usize> = HashMap::new();
    let mut circumcenters = Vec::new();
    for face in triangulation.inner_faces() {
        let [v1, v2, v3] = face.vertices();
        let (x, y) = calculate_circumcenter(v1.position(), v2.position(), v3.position());
        face_slot.insert(face.fix().index(), circumcenters.len());
        circumcenters.push(Vec2::new(x as f32, y as f32));
    }

    // merge circumcenters that are too close together
    let mut merged = Vec::new();
    let mut index_mapping = vec![0usize; circumcenters.len()];
    let mut used = vec![false; circumcenters.len()];
    for i in 0..circumcenters.len() {
        if used[i] { continue; }

        let mut cluster = vec![i];
        used[i] = true;
        for j in (i + 1)..circumcenters.len() {
            if !used[j] && circumcenters[i].distance(circumcenters[j]) < merge_threshold {
                cluster.push(j);
                used[j] = true;
            }
        }

        let avg = cluster.iter().fold(Vec2::ZERO, |acc, &idx| acc + circumcenters[idx]) / cluster.len() as f32;
        for &old in &cluster {
            index_mapping[old] = merged.len();
        }
        merged.push(avg);
    }

    // walk the faces around each generator; a hull vertex touches the outer face
    let mut seen_vertices = Vec::new();
    let mut cells = Vec::with_capacity(generators.len());
    for handle in handles {
        let Some(handle) = handle else {
            cells.push(None);
            continue;
        };
        if seen_vertices.contains(&handle) {
            // duplicate generator collapsed onto an earlier one
            cells.push(None);
            continue;
        }
        seen_vertices.push(handle);

        let vertex = triangulation.vertex(handle);
        let mut cell: Vec<usize> = Vec::new();
        let mut bounded = true;
        for edge in vertex.out_edges() {
            match edge.face().as_inner() {
                Some(face) => {
                    let Some(&slot) = face_slot.get(&face.fix().index()) else {
                        bounded = false;
                        break;
                    };
                    let idx = index_mapping[slot];
                    if cell.last() != Some(&idx) {
                        cell.push(idx);
                    }
                }
                None => {
                    bounded = false;
                    break;
                }
            }
        }
        if !bounded {
            cells.push(None);
            continue;
        }

        while cell.len() > 1 && cell.first() == cell.last() {
            cell.pop();
        }
        let polygon: Vec<Vec2> = cell.iter().map(|&i| merged[i]).collect();
        if polygon_area(&polygon) < 0.0 {
            cell.reverse();
        }
        cells.push(if cell.len() >= 3 { Some(cell) } else { None });
    }

    Tessellation { points: merged, cells }
}

/// Constructs a Voronoi diagram from a set of generator points.
///
/// Only the first `keep` generators produce cells (the rest are the outer
/// ring), and any cell reaching beyond `cutoff` from the origin is dropped.
///
/// # Returns
/// A SkeletonData struct with CCW cells
pub fn vpoly(
    generator_points: Vec<Vec2>,
    keep: usize,
    cutoff: f32,
    merge_threshold: f32,
) -> SkeletonData {
    let tessellation = tessellate(&generator_points, merge_threshold);

    let mut cells = Vec::new();
    let mut generators = Vec::new();
    for (generator_idx, cell) in tessellation.cells.into_iter().enumerate().take(keep) {
        let Some(cell) = cell else { continue };

        // far cells are slivers squeezed against the ring
        let has_extreme_vertex = cell.iter().any(|&i| tessellation.points[i].length() > cutoff);
        if has_extreme_vertex { continue; }

        cells.push(cell);
        generators.push(generator_idx);
    }

    SkeletonData {
        generator_points,
        points: tessellation.points,
        cells,
        generators,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice() -> Vec<Vec2> {
        let mut points = Vec::new();
        for y in -3..=3 {
            for x in -3..=3 {
                // offset rows so no four points are cocircular
                let shift = if y % 2 == 0 { 0.0 } else { 0.5 };
                points.push(Vec2::new(x as f32 * 10.0 + shift * 10.0, y as f32 * 9.0));
            }
        }
        points
    }

    #[test]
    fn test_interior_cells_are_closed_and_ccw() {
        let points = lattice();
        let skeleton = vpoly(points.clone(), points.len(), 1000.0, 0.01);
        assert!(skeleton.is_valid());
        // hull generators never yield cells
        assert!(skeleton.cells.len() < points.len());
        assert!(!skeleton.cells.is_empty());
    }

    #[test]
    fn test_cell_contains_its_generator() {
        let points = lattice();
        let skeleton = vpoly(points.clone(), points.len(), 1000.0, 0.01);
        for (cell_idx, &g) in skeleton.generators.iter().enumerate() {
            let polygon = skeleton.cell_polygon(cell_idx);
            assert!(super::super::utils::point_in_polygon(&points[g], &polygon));
        }
    }

    #[test]
    fn test_cutoff_drops_far_cells() {
        let points = lattice();
        let all = vpoly(points.clone(), points.len(), 1000.0, 0.01);
        let near = vpoly(points.clone(), points.len(), 15.0, 0.01);
        assert!(near.cells.len() < all.cells.len());
    }
}
