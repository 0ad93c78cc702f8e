// settlement layout: patch mesh, fortifications, waterways, districts and wards
use glam::Vec2;

use crate::config::*;

pub mod canal;
pub mod city;
pub mod dcel;
pub mod district;
pub mod patch;
pub mod poly;
pub mod topology;
pub mod town;
pub mod wall;
pub mod ward;

// my 2d polygon datatype
// abstraction of meshes allows for easier geometric manipulation
pub type Polygon = Vec<Vec2>;

/// Voronoi tessellation before it becomes a half-edge mesh.
#[derive(Clone, Debug, Default)]
pub struct SkeletonData {
    pub generator_points: Vec<Vec2>, // seed points, one per cell
    pub points: Vec<Vec2>,           // merged circumcenters
    pub cells: Vec<Vec<usize>>,      // CCW circumcenter indices per kept cell
    pub generators: Vec<usize>,      // generator index of each kept cell
}

impl SkeletonData {
    pub fn cell_polygon(&self, cell: usize) -> Polygon {
        self.cells[cell].iter().map(|&i| self.points[i]).collect()
    }

    pub fn is_valid(&self) -> bool {
        if self.points.is_empty() || self.cells.is_empty() {
            return false;
        }

        for (cell_idx, cell) in self.cells.iter().enumerate() {
            if cell.len() < 3 {
                return false; // cells must have at least 3 points
            }
            if cell.iter().any(|&i| i >= self.points.len()) {
                return false;
            }
            if poly::utils::polygon_area(&self.cell_polygon(cell_idx)) <= f32::EPSILON {
                return false; // degenerate or clockwise cell
            }
        }

        self.cells.len() == self.generators.len()
    }
}

// town generation parameters
#[derive(Clone, Debug)]
pub struct Params {
    pub points_per_patch: usize,
    pub relax_steps: usize,
    pub circumcenter_merge_threshold: f32,
    pub gate_spacing: f32,
    pub alley_width: f32,
    pub lot_inset: f32,
    pub min_lot_area: f32,
    pub max_cut_attempts: usize,
    pub max_recursion_depth: usize,
    pub building_cell: f32,
    pub building_grow_prob: f32,
    pub empty_prob: f32,
    pub max_docks: usize,
    pub park_chance: f32,
    pub max_attempts: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            points_per_patch: POINTS_PER_PATCH,
            relax_steps: RELAX_STEPS,
            circumcenter_merge_threshold: CIRCUMCENTER_MERGE_THRESHOLD,
            gate_spacing: GATE_SPACING,
            alley_width: ALLEY_WIDTH,
            lot_inset: LOT_INSET,
            min_lot_area: LOT_AREA_MIN,
            max_cut_attempts: MAX_CUT_ATTEMPTS,
            max_recursion_depth: MAX_RECURSION_DEPTH,
            building_cell: BUILDING_CELL,
            building_grow_prob: BUILDING_GROW_PROB,
            empty_prob: EMPTY_PROB,
            max_docks: MAX_DOCKS,
            park_chance: PARK_CHANCE,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}
