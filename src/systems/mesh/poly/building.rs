// building footprints grown cell by cell on a grid laid over a lot

use glam::{IVec2, Vec2};

use crate::config::BUILDING_GRID_MAX;
use crate::systems::mesh::Polygon;
use crate::systems::random::Sequencer;
use super::utils::{point_in_polygon, OrientedBox};

/// Occupancy grid, row-major.
#[derive(Clone, Debug)]
pub struct Plan {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<bool>,
}

impl Plan {
    fn idx(&self, x: usize, y: usize) -> usize {
        x + y * self.width
    }

    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return false;
        }
        self.cells[self.idx(x as usize, y as usize)]
    }

    pub fn count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    fn touches_occupied(&self, x: usize, y: usize) -> bool {
        let (x, y) = (x as i32, y as i32);
        self.get(x - 1, y) || self.get(x + 1, y) || self.get(x, y - 1) || self.get(x, y + 1)
    }
}

/// Grows a 4-connected blob from one random eligible cell.
///
/// Growth keeps flipping random unoccupied cells next to the blob. Once the
/// blob's extent spans every eligible row and column (or stops changing for
/// a while) each further step continues only with probability `grow_prob`.
///
/// # Returns
/// `None` when no cell is eligible
pub fn plan(width: usize, height: usize, eligible: &[bool], grow_prob: f32, rng: &mut Sequencer) -> Option<Plan> {
    let total = width * height;
    if total == 0 || eligible.len() != total {
        return None;
    }
    let open: Vec<usize> = (0..total).filter(|&i| eligible[i]).collect();
    if open.is_empty() {
        return None;
    }

    // extent the blob could reach
    let (mut lim_x0, mut lim_x1, mut lim_y0, mut lim_y1) = (width, 0, height, 0);
    for &i in &open {
        let (x, y) = (i % width, i / width);
        lim_x0 = lim_x0.min(x);
        lim_x1 = lim_x1.max(x);
        lim_y0 = lim_y0.min(y);
        lim_y1 = lim_y1.max(y);
    }

    let mut plan = Plan { width, height, cells: vec![false; total] };
    let start = open[rng.index(open.len())];
    plan.cells[start] = true;
    let mut unfilled = open.len() - 1;
    let (mut x0, mut x1, mut y0, mut y1) = (start % width, start % width, start / width, start / width);

    let stable_after = total * 4;
    let max_draws = total * 32;
    let mut since_change = 0;

    for _ in 0..max_draws {
        if unfilled == 0 {
            break;
        }
        let x = rng.index(width);
        let y = rng.index(height);
        let idx = plan.idx(x, y);
        since_change += 1;

        if eligible[idx] && !plan.cells[idx] && plan.touches_occupied(x, y) {
            plan.cells[idx] = true;
            unfilled -= 1;
            if x < x0 || x > x1 || y < y0 || y > y1 {
                since_change = 0;
            }
            x0 = x0.min(x);
            x1 = x1.max(x);
            y0 = y0.min(y);
            y1 = y1.max(y);
        }

        let spans = x0 <= lim_x0 && x1 >= lim_x1 && y0 <= lim_y0 && y1 >= lim_y1;
        if (spans || since_change > stable_after) && rng.float() >= grow_prob {
            break;
        }
    }

    Some(plan)
}

/// Grows a plan then mirrors it across the vertical axis.
pub fn plan_symmetric(width: usize, height: usize, eligible: &[bool], rng: &mut Sequencer) -> Option<Plan> {
    let mut plan = plan(width, height, eligible, 0.0, rng)?;
    for y in 0..height {
        for x in 0..width / 2 {
            let a = plan.idx(x, y);
            let b = plan.idx(width - 1 - x, y);
            let both = plan.cells[a] || plan.cells[b];
            plan.cells[a] = both;
            plan.cells[b] = both;
        }
    }
    Some(plan)
}

/// Outer outline of the occupied cells, CCW, in grid corner coordinates.
///
/// Traced with the occupied side on the left, turning right first at every
/// corner so diagonal contacts with enclosed holes are stepped over.
pub fn circumference(plan: &Plan) -> Vec<IVec2> {
    // directed boundary edges, occupied cell on the left
    let mut edges: Vec<(IVec2, IVec2)> = Vec::new();
    for y in 0..plan.height as i32 {
        for x in 0..plan.width as i32 {
            if !plan.get(x, y) {
                continue;
            }
            if !plan.get(x, y - 1) {
                edges.push((IVec2::new(x, y), IVec2::new(x + 1, y)));
            }
            if !plan.get(x + 1, y) {
                edges.push((IVec2::new(x + 1, y), IVec2::new(x + 1, y + 1)));
            }
            if !plan.get(x, y + 1) {
                edges.push((IVec2::new(x + 1, y + 1), IVec2::new(x, y + 1)));
            }
            if !plan.get(x - 1, y) {
                edges.push((IVec2::new(x, y + 1), IVec2::new(x, y)));
            }
        }
    }
    // the first edge pushed is the bottom of the lowest, leftmost cell: always outer
    let Some(&first) = edges.first() else {
        return Vec::new();
    };

    let mut used = vec![false; edges.len()];
    used[0] = true;
    let mut outline = vec![first.0];
    let (mut from, mut to) = first;

    for _ in 0..edges.len() {
        if to == first.0 {
            break;
        }
        outline.push(to);
        let dir = to - from;

        let mut best: Option<(usize, i32)> = None;
        for (i, &(a, b)) in edges.iter().enumerate() {
            if used[i] || a != to {
                continue;
            }
            let out = b - a;
            let cross = dir.x * out.y - dir.y * out.x;
            // right turn, then straight, then left
            let rank = if cross < 0 { 0 } else if cross == 0 { 1 } else { 2 };
            if best.is_none_or(|(_, r)| rank < r) {
                best = Some((i, rank));
            }
        }
        let Some((i, _)) = best else { break };
        used[i] = true;
        from = edges[i].0;
        to = edges[i].1;
    }

    simplify_collinear(outline)
}

fn simplify_collinear(points: Vec<IVec2>) -> Vec<IVec2> {
    let n = points.len();
    if n < 4 {
        return points;
    }
    let kept: Vec<IVec2> = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            let d1 = points[i] - prev;
            let d2 = next - points[i];
            d1.x * d2.y - d1.y * d2.x != 0
        })
        .map(|i| points[i])
        .collect();
    if kept.len() < 3 { points } else { kept }
}

/// Synthesizes a footprint for `lot`.
///
/// The grid is laid over the lot's oriented bounding box; cells whose
/// centre falls outside the lot are never occupied. A lot too small for a
/// two-cell grid is returned whole.
pub fn footprint(lot: &Polygon, cell_size: f32, grow_prob: f32, symmetric: bool, rng: &mut Sequencer) -> Polygon {
    let Some(obb) = OrientedBox::fit(lot) else {
        return lot.clone();
    };
    let width = ((obb.length / cell_size).round() as usize).clamp(1, BUILDING_GRID_MAX);
    let height = ((obb.width / cell_size).round() as usize).clamp(1, BUILDING_GRID_MAX);
    if width * height < 2 {
        return lot.clone();
    }
    let cw = obb.length / width as f32;
    let ch = obb.width / height as f32;

    let eligible: Vec<bool> = (0..width * height)
        .map(|i| {
            let (x, y) = ((i % width) as f32, (i / width) as f32);
            point_in_polygon(&obb.at((x + 0.5) * cw, (y + 0.5) * ch), lot)
        })
        .collect();

    let grown = if symmetric {
        plan_symmetric(width, height, &eligible, rng)
    } else {
        plan(width, height, &eligible, grow_prob, rng)
    };
    let Some(grown) = grown else {
        return lot.clone();
    };

    let outline: Polygon = circumference(&grown)
        .into_iter()
        .map(|c| obb.at(c.x as f32 * cw, c.y as f32 * ch))
        .collect();
    if outline.len() < 3 { lot.clone() } else { outline }
}
