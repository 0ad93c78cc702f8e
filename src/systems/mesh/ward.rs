//! Land use of a patch and the geometry each use lays out.
//!
//! A ward never looks at the mesh. The orchestrator hands it a
//! [`WardContext`] with the patch outline and what lies across every edge,
//! and the ward turns that into blocks, lots, buildings and trees drawn
//! from the patch's own sequencer.

use std::f32::consts::TAU;

use glam::Vec2;
use rand::distr::Distribution;
use rand_distr::Normal;
use serde::Serialize;

use super::poly::building::footprint;
use super::poly::subdivision::Bisector;
use super::poly::utils::{
    inset_polygon, point_in_polygon, point_to_segment_distance, polygon_area, polygon_centroid, rotate, shrink,
    OrientedBox,
};
use super::{Params, Polygon};
use crate::config::{COAST_INSET, DEFAULT_INSET, PLAZA_INSET, ROAD_INSET, WALL_INSET};
use crate::systems::random::Sequencer;

const TREE_SPACING: f32 = 3.0;
const PIER_WIDTH: f32 = 2.5;
const MIN_PIER_EDGE: f32 = 6.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Ward {
    Alleys,
    Castle,
    Cathedral,
    Market,
    Farm,
    Harbour,
    Park,
    Wilderness,
}

/// What a viewer may offer for a patch of a given ward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WardAction {
    Reroll,
    ShowLots,
    ShowTrees,
}

/// What lies across one edge of the patch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Frontage {
    Wall,
    Road,
    /// Canal of the given width.
    Canal(f32),
    Coast,
    Plaza,
    Plain,
}

impl Frontage {
    fn margin(self, scale: f32) -> f32 {
        match self {
            Frontage::Wall => WALL_INSET * scale,
            Frontage::Road => ROAD_INSET * scale,
            // never narrower than the water itself
            Frontage::Canal(width) => width / 2.0 + 1.0,
            Frontage::Coast => COAST_INSET * scale,
            Frontage::Plaza => PLAZA_INSET * scale,
            Frontage::Plain => DEFAULT_INSET * scale,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FeatureKind {
    Monument,
    Pier,
}

#[derive(Clone, Debug)]
pub struct Feature {
    pub kind: FeatureKind,
    pub shape: Polygon,
}

/// Everything a ward lays out inside its patch.
#[derive(Clone, Debug, Default)]
pub struct PatchGeometry {
    pub available: Polygon,
    pub blocks: Vec<Polygon>,
    pub lots: Vec<Polygon>,
    pub buildings: Vec<Polygon>,
    pub alleys: Vec<[Vec2; 2]>,
    pub features: Vec<Feature>,
    pub trees: Vec<Vec2>,
}

/// Patch outline plus what the ward needs to know about its surroundings.
#[derive(Clone, Debug)]
pub struct WardContext<'a> {
    pub shape: &'a Polygon,
    /// One entry per edge, edge `i` running from `shape[i]` to `shape[i + 1]`.
    pub frontage: Vec<Frontage>,
    pub urban: bool,
    pub water: bool,
    pub greenery: bool,
    pub params: &'a Params,
}

impl<'a> WardContext<'a> {
    pub fn new(shape: &'a Polygon, params: &'a Params) -> Self {
        Self {
            shape,
            frontage: vec![Frontage::Plain; shape.len()],
            urban: false,
            water: false,
            greenery: false,
            params,
        }
    }

    fn frontage(&self, edge: usize) -> Frontage {
        self.frontage.get(edge).copied().unwrap_or(Frontage::Plain)
    }
}

/// Per-patch knobs of a residential quarter.
#[derive(Clone, Copy, Debug)]
struct AlleyParams {
    min_sq: f32,
    grid_chaos: f32,
    size_chaos: f32,
    block_size: f32,
}

impl AlleyParams {
    fn draw(base: f32, rng: &mut Sequencer) -> Self {
        Self {
            min_sq: base + 40.0 * (rng.normal4() - 1.0).abs(),
            grid_chaos: 0.2 + 0.8 * rng.normal3(),
            size_chaos: 0.4 + 0.6 * rng.normal3(),
            block_size: 4.0 + 10.0 * rng.normal3(),
        }
    }
}

impl Ward {
    pub fn label(self) -> &'static str {
        match self {
            Ward::Alleys => "Alleys",
            Ward::Castle => "Castle",
            Ward::Cathedral => "Cathedral",
            Ward::Market => "Market",
            Ward::Farm => "Farm",
            Ward::Harbour => "Harbour",
            Ward::Park => "Park",
            Ward::Wilderness => "Wilderness",
        }
    }

    pub fn bears_buildings(self) -> bool {
        matches!(self, Ward::Alleys | Ward::Castle | Ward::Cathedral | Ward::Farm | Ward::Harbour)
    }

    pub fn context_actions(self) -> &'static [WardAction] {
        match self {
            Ward::Alleys | Ward::Farm | Ward::Harbour => &[WardAction::Reroll, WardAction::ShowLots],
            Ward::Castle | Ward::Cathedral | Ward::Market => &[WardAction::Reroll],
            Ward::Park => &[WardAction::Reroll, WardAction::ShowTrees],
            Ward::Wilderness => &[WardAction::ShowTrees],
        }
    }

    fn margin_scale(self) -> f32 {
        match self {
            Ward::Castle => 1.5,
            Ward::Cathedral => 1.3,
            Ward::Farm => 0.8,
            Ward::Wilderness => 0.5,
            _ => 1.0,
        }
    }

    /// Patch outline pulled in from every edge by what lies across it.
    ///
    /// Falls back to half the margins, then to the bare outline.
    pub fn available_area(self, ctx: &WardContext) -> Polygon {
        if ctx.water {
            return ctx.shape.clone();
        }
        let scale = self.margin_scale();
        let distances: Vec<f32> = (0..ctx.shape.len()).map(|i| ctx.frontage(i).margin(scale)).collect();
        let halved: Vec<f32> = distances.iter().map(|d| d * 0.5).collect();
        inset_polygon(ctx.shape, &distances)
            .or_else(|| inset_polygon(ctx.shape, &halved))
            .unwrap_or_else(|| ctx.shape.clone())
    }

    pub fn create_geometry(self, ctx: &WardContext, rng: &mut Sequencer) -> PatchGeometry {
        let available = self.available_area(ctx);
        let mut geometry = match self {
            Ward::Alleys => alleys(&available, ctx, rng),
            Ward::Castle => landmark_building(&available, ctx.params.building_cell * 2.0, false, 2.0, rng),
            Ward::Cathedral => landmark_building(&available, ctx.params.building_cell * 1.5, true, 1.0, rng),
            Ward::Market => market(&available, rng),
            Ward::Farm => farm(&available, ctx, rng),
            Ward::Harbour => harbour(&available, ctx, rng),
            Ward::Park | Ward::Wilderness => PatchGeometry::default(),
        };
        if self.bears_buildings() && geometry.lots.is_empty() && available.len() >= 3 {
            geometry.lots.push(available.clone());
        }
        geometry.available = available;
        geometry
    }

    pub fn spawn_trees(self, ctx: &WardContext, geometry: &PatchGeometry, rng: &mut Sequencer) -> Vec<Vec2> {
        let area = &geometry.available;
        match self {
            Ward::Park => fill_area(area, 0.8, rng),
            Ward::Wilderness if ctx.water => Vec::new(),
            Ward::Wilderness => fill_area(area, if ctx.greenery { 0.3 } else { 0.1 }, rng),
            Ward::Farm => fill_area(area, 0.03, rng)
                .into_iter()
                .filter(|p| !geometry.buildings.iter().any(|b| point_in_polygon(p, b)))
                .collect(),
            Ward::Alleys | Ward::Castle | Ward::Cathedral if ctx.greenery => fill_area(area, 0.1, rng)
                .into_iter()
                .filter(|p| !geometry.buildings.iter().any(|b| point_in_polygon(p, b)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn alleys(available: &Polygon, ctx: &WardContext, rng: &mut Sequencer) -> PatchGeometry {
    let params = ctx.params;
    let mut knobs = AlleyParams::draw(params.min_lot_area, rng);
    if !ctx.urban {
        // shanties sprawl in bigger, rougher blocks
        knobs.block_size *= 1.5;
    }

    let mut block_cutter = Bisector::new(knobs.min_sq * knobs.block_size, 16.0 * knobs.grid_chaos)
        .with_gap(params.alley_width)
        .with_min_lot(knobs.min_sq)
        .with_limits(params.max_cut_attempts, params.max_recursion_depth);
    let blocks = block_cutter.partition(available, rng);

    let mut geometry = PatchGeometry {
        alleys: block_cutter.cuts.iter().map(|c| [c.start, c.end]).collect(),
        ..PatchGeometry::default()
    };

    for block in &blocks {
        let mut lot_cutter = Bisector::new(knobs.min_sq, (4.0 * knobs.size_chaos).max(1.2))
            .with_min_lot(params.min_lot_area)
            .with_limits(params.max_cut_attempts, params.max_recursion_depth);
        let lots = lot_cutter.partition(block, rng);
        let lots = drop_courtyards(block, lots);

        for lot in lots {
            let lot = if params.lot_inset > 0.0 {
                setback(block, &lot, params.lot_inset, params.min_lot_area)
            } else {
                lot
            };
            if buildable(&lot, knobs.min_sq) && !rng.chance(params.empty_prob) {
                geometry
                    .buildings
                    .push(footprint(&lot, params.building_cell, params.building_grow_prob, false, rng));
            }
            geometry.lots.push(lot);
        }
    }
    geometry.blocks = blocks;
    geometry
}

/// Lots with no edge on the block outline cannot be reached from a street.
fn drop_courtyards(block: &Polygon, lots: Vec<Polygon>) -> Vec<Polygon> {
    if lots.len() < 2 {
        return lots;
    }
    let (open, enclosed): (Vec<Polygon>, Vec<Polygon>) =
        lots.into_iter().partition(|lot| (0..lot.len()).any(|i| on_outline(block, lot, i)));
    if open.is_empty() { enclosed } else { open }
}

fn on_outline(block: &Polygon, lot: &Polygon, edge: usize) -> bool {
    let a = lot[edge];
    let b = lot[(edge + 1) % lot.len()];
    let mid = (a + b) * 0.5;
    (0..block.len()).any(|j| point_to_segment_distance(mid, block[j], block[(j + 1) % block.len()]) < 1e-2)
}

/// Pulls the street-facing edges of a lot back from the street.
///
/// A lot the setback would shrink below `min_area` keeps its full outline.
fn setback(block: &Polygon, lot: &Polygon, inset: f32, min_area: f32) -> Polygon {
    let distances: Vec<f32> = (0..lot.len())
        .map(|i| if on_outline(block, lot, i) { inset } else { 0.0 })
        .collect();
    let floor = min_area.min(polygon_area(lot));
    inset_polygon(lot, &distances)
        .filter(|pulled| polygon_area(pulled) >= floor)
        .unwrap_or_else(|| lot.clone())
}

// too small, too thin or too ragged lots stay empty
fn buildable(lot: &Polygon, min_sq: f32) -> bool {
    let area = polygon_area(lot);
    let Some(obb) = OrientedBox::fit(lot) else {
        return false;
    };
    area >= min_sq / 4.0 && obb.width >= 1.2 && obb.length >= 1.2 && area / obb.area().max(f32::EPSILON) > 0.5
}

fn landmark_building(available: &Polygon, cell: f32, symmetric: bool, margin: f32, rng: &mut Sequencer) -> PatchGeometry {
    let site = shrink(available, margin).unwrap_or_else(|| available.clone());
    let building = footprint(&site, cell, 0.8, symmetric, rng);
    PatchGeometry {
        blocks: vec![available.clone()],
        lots: vec![available.clone()],
        buildings: vec![building],
        ..PatchGeometry::default()
    }
}

fn market(available: &Polygon, rng: &mut Sequencer) -> PatchGeometry {
    let area = polygon_area(available);
    let center = if area > f32::EPSILON { polygon_centroid(available, area) } else { available[0] };
    let half = 1.0 + rng.float();
    let angle = rng.float() * TAU;
    let shape: Polygon = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
        .iter()
        .map(|&(x, y)| center + rotate(Vec2::new(x, y) * half, angle))
        .collect();
    PatchGeometry {
        features: vec![Feature { kind: FeatureKind::Monument, shape }],
        ..PatchGeometry::default()
    }
}

fn farm(available: &Polygon, ctx: &WardContext, rng: &mut Sequencer) -> PatchGeometry {
    let params = ctx.params;
    let mut cutter = Bisector::new(params.min_lot_area * 20.0, 2.0)
        .with_min_lot(params.min_lot_area * 5.0)
        .with_limits(params.max_cut_attempts, params.max_recursion_depth);
    let fields = cutter.partition(available, rng);

    let mut geometry = PatchGeometry::default();
    if let Some(field) = rng.pick(&fields) {
        if let Some(site) = farmhouse_site(field) {
            geometry
                .buildings
                .push(footprint(&site, params.building_cell, params.building_grow_prob, false, rng));
        }
    }
    geometry.alleys = cutter.cuts.iter().map(|c| [c.start, c.end]).collect();
    geometry.blocks = fields.clone();
    geometry.lots = fields;
    geometry
}

// small rectangle at the middle of a field, aligned with it
fn farmhouse_site(field: &Polygon) -> Option<Polygon> {
    let obb = OrientedBox::fit(field)?;
    let length = (obb.length * 0.5).min(10.0);
    let width = (obb.width * 0.5).min(7.0);
    if length < 2.0 || width < 2.0 {
        return None;
    }
    let (u0, v0) = ((obb.length - length) / 2.0, (obb.width - width) / 2.0);
    let site = vec![
        obb.at(u0, v0),
        obb.at(u0 + length, v0),
        obb.at(u0 + length, v0 + width),
        obb.at(u0, v0 + width),
    ];
    site.iter().all(|p| point_in_polygon(p, field)).then_some(site)
}

fn harbour(available: &Polygon, ctx: &WardContext, rng: &mut Sequencer) -> PatchGeometry {
    let params = ctx.params;
    let mut cutter = Bisector::new(params.min_lot_area * 6.0, 2.0)
        .with_min_lot(params.min_lot_area * 2.0)
        .with_limits(params.max_cut_attempts, params.max_recursion_depth);
    let lots = cutter.partition(available, rng);

    let mut geometry = PatchGeometry::default();
    for lot in &lots {
        geometry
            .buildings
            .push(footprint(lot, params.building_cell * 1.5, 0.9, false, rng));
    }
    geometry.blocks = vec![available.clone()];
    geometry.lots = lots;

    let shape = ctx.shape;
    for i in 0..shape.len() {
        if ctx.frontage(i) != Frontage::Coast {
            continue;
        }
        let a = shape[i];
        let b = shape[(i + 1) % shape.len()];
        if a.distance(b) < MIN_PIER_EDGE {
            continue;
        }
        let along = (b - a).normalize_or_zero();
        // inward is the left normal of a CCW outline
        let out = -along.perp();
        let reach = 8.0 + 8.0 * rng.float();
        let mid = (a + b) * 0.5;
        let half = along * PIER_WIDTH * 0.5;
        geometry.features.push(Feature {
            kind: FeatureKind::Pier,
            shape: vec![mid - half, mid - half + out * reach, mid + half + out * reach, mid + half],
        });
    }
    geometry
}

/// Jittered hex grid of tree positions inside `area`, each kept with `density`.
pub fn fill_area(area: &Polygon, density: f32, rng: &mut Sequencer) -> Vec<Vec2> {
    if area.len() < 3 || density <= 0.0 {
        return Vec::new();
    }
    let min = area.iter().copied().fold(Vec2::splat(f32::MAX), Vec2::min);
    let max = area.iter().copied().fold(Vec2::splat(f32::MIN), Vec2::max);
    let row_step = TREE_SPACING * 3f32.sqrt() / 2.0;
    let jitter = Normal::new(0.0, TREE_SPACING * 0.25).ok();

    let mut trees = Vec::new();
    let mut row = 0;
    let mut y = min.y;
    while y <= max.y {
        let mut x = min.x + if row % 2 == 1 { TREE_SPACING / 2.0 } else { 0.0 };
        while x <= max.x {
            let offset = match &jitter {
                Some(normal) => Vec2::new(normal.sample(rng), normal.sample(rng)),
                None => Vec2::ZERO,
            };
            let keep = rng.chance(density);
            let p = Vec2::new(x, y) + offset;
            if keep && point_in_polygon(&p, area) {
                trees.push(p);
            }
            x += TREE_SPACING;
        }
        y += row_step;
        row += 1;
    }
    trees
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(w: f32, h: f32) -> Polygon {
        vec![Vec2::new(0.0, 0.0), Vec2::new(w, 0.0), Vec2::new(w, h), Vec2::new(0.0, h)]
    }

    #[test]
    fn test_available_area_respects_frontage() {
        let shape = rect(40.0, 40.0);
        let params = Params::default();
        let mut ctx = WardContext::new(&shape, &params);
        ctx.frontage[0] = Frontage::Wall;
        let available = Ward::Alleys.available_area(&ctx);
        let lowest = available.iter().map(|p| p.y).fold(f32::MAX, f32::min);
        let leftmost = available.iter().map(|p| p.x).fold(f32::MAX, f32::min);
        assert!((lowest - WALL_INSET).abs() < 1e-3);
        assert!((leftmost - DEFAULT_INSET).abs() < 1e-3);
    }

    #[test]
    fn test_canal_margin_clears_water() {
        assert!((Frontage::Canal(6.0).margin(0.5) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_alleys_fill_patch_with_lots() {
        let shape = rect(80.0, 60.0);
        let params = Params::default();
        let mut ctx = WardContext::new(&shape, &params);
        ctx.urban = true;
        let mut rng = Sequencer::new(42);
        let geometry = Ward::Alleys.create_geometry(&ctx, &mut rng);
        assert!(geometry.blocks.len() > 1);
        assert!(geometry.lots.len() >= geometry.blocks.len());
        assert!(!geometry.buildings.is_empty());
        assert!(!geometry.alleys.is_empty());
        let covered: f32 = geometry.lots.iter().map(polygon_area).sum();
        assert!(covered <= polygon_area(&geometry.available) + 1e-2);
    }

    #[test]
    fn test_setback_never_drops_below_min_lot_area() {
        let block = rect(10.0, 2.0);
        // every edge fronts the street
        let kept = setback(&block, &block, 0.3, 20.0);
        assert_eq!(kept, block);
        let pulled = setback(&block, &block, 0.3, 10.0);
        assert!((polygon_area(&pulled) - 9.4 * 1.4).abs() < 1e-3);

        let shape = rect(80.0, 60.0);
        let params = Params::default();
        let mut ctx = WardContext::new(&shape, &params);
        ctx.urban = true;
        for seed in 1..6 {
            let geometry = Ward::Alleys.create_geometry(&ctx, &mut Sequencer::new(seed));
            for lot in &geometry.lots {
                assert!(polygon_area(lot) >= params.min_lot_area - 1e-3);
            }
        }
    }

    #[test]
    fn test_tiny_patch_still_has_a_lot() {
        let shape = rect(3.0, 3.0);
        let params = Params::default();
        let ctx = WardContext::new(&shape, &params);
        for ward in [Ward::Alleys, Ward::Castle, Ward::Cathedral, Ward::Farm, Ward::Harbour] {
            let mut rng = Sequencer::new(5);
            let geometry = ward.create_geometry(&ctx, &mut rng);
            assert!(!geometry.lots.is_empty(), "{ward:?}");
        }
    }

    #[test]
    fn test_cathedral_is_mirrored() {
        let shape = rect(40.0, 30.0);
        let params = Params::default();
        let ctx = WardContext::new(&shape, &params);
        let mut rng = Sequencer::new(9);
        let geometry = Ward::Cathedral.create_geometry(&ctx, &mut rng);
        assert_eq!(geometry.buildings.len(), 1);
        assert!(polygon_area(&geometry.buildings[0]) > 0.0);
    }

    #[test]
    fn test_harbour_piers_face_water() {
        let shape = rect(40.0, 30.0);
        let params = Params::default();
        let mut ctx = WardContext::new(&shape, &params);
        ctx.frontage[0] = Frontage::Coast;
        let mut rng = Sequencer::new(3);
        let geometry = Ward::Harbour.create_geometry(&ctx, &mut rng);
        let piers: Vec<&Feature> = geometry.features.iter().filter(|f| f.kind == FeatureKind::Pier).collect();
        assert_eq!(piers.len(), 1);
        // the bottom edge is the coast, so the pier reaches below it
        assert!(piers[0].shape.iter().any(|p| p.y < -7.9));
        assert!(polygon_area(&piers[0].shape) > 0.0);
    }

    #[test]
    fn test_market_has_monument_and_no_buildings() {
        let shape = rect(20.0, 20.0);
        let params = Params::default();
        let ctx = WardContext::new(&shape, &params);
        let mut rng = Sequencer::new(1);
        let geometry = Ward::Market.create_geometry(&ctx, &mut rng);
        assert!(geometry.buildings.is_empty());
        assert_eq!(geometry.features.len(), 1);
        assert!(point_in_polygon(&vertex_mean_of(&geometry.features[0].shape), &shape));
    }

    fn vertex_mean_of(poly: &Polygon) -> Vec2 {
        poly.iter().copied().sum::<Vec2>() / poly.len() as f32
    }

    #[test]
    fn test_trees_density_by_ward() {
        let shape = rect(60.0, 60.0);
        let params = Params::default();
        let mut ctx = WardContext::new(&shape, &params);
        let park = Ward::Park.create_geometry(&ctx, &mut Sequencer::new(2));
        let dense = Ward::Park.spawn_trees(&ctx, &park, &mut Sequencer::new(2));
        let wild = Ward::Wilderness.create_geometry(&ctx, &mut Sequencer::new(2));
        let sparse = Ward::Wilderness.spawn_trees(&ctx, &wild, &mut Sequencer::new(2));
        assert!(dense.len() > sparse.len() * 2);
        ctx.water = true;
        assert!(Ward::Wilderness.spawn_trees(&ctx, &wild, &mut Sequencer::new(2)).is_empty());
    }

    #[test]
    fn test_same_seed_same_geometry() {
        let shape = rect(70.0, 50.0);
        let params = Params::default();
        let ctx = WardContext::new(&shape, &params);
        let a = Ward::Alleys.create_geometry(&ctx, &mut Sequencer::new(77));
        let b = Ward::Alleys.create_geometry(&ctx, &mut Sequencer::new(77));
        assert_eq!(a.lots, b.lots);
        assert_eq!(a.buildings, b.buildings);
    }

    #[test]
    fn test_context_actions() {
        assert!(Ward::Alleys.context_actions().contains(&WardAction::Reroll));
        assert!(!Ward::Wilderness.context_actions().contains(&WardAction::Reroll));
        assert!(Ward::Harbour.bears_buildings());
        assert!(!Ward::Market.bears_buildings());
    }
}
