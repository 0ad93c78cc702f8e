//! One generated settlement and the stages that build it.
//!
//! Stages run in a fixed order, each drawing from the same sequencer:
//! patches, junctions, walls, towers, roads, canal, wards, districts,
//! geometry and finally landmarks with the summary. Per-patch geometry is
//! the exception: it draws from the patch's own seed, so one patch can be
//! rerolled without touching the rest.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::f32::consts::TAU;

use glam::Vec2;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{
    Blueprint, GateMode, AREA_PER_RESIDENT, COAST_FREQUENCY, COAST_OCTAVES, FARM_RADIUS, FLOORS,
    MAX_JUNCTION_PASSES, MAX_ROAD_TARGETS, OUTER_CUTOFF, ROAD_SMOOTHING, TOWER_RADIUS,
};
use crate::error::{GenerationError, Result};
use crate::systems::random::Sequencer;
use super::Params;
use super::canal::{Canal, RiverContext};
use super::dcel::{EdgeTag, FaceId, HalfEdgeId, PlanarMesh, VertexId};
use super::district::{self, District, DistrictKind, NameSource};
use super::patch::Patch;
use super::poly::point_gen::{outer_ring, pgen, plaza_quincunx, prelax};
use super::poly::utils::rotate;
use super::poly::voronoi::vpoly;
use super::topology::Topology;
use super::wall::{CurtainWall, WallKind};
use super::ward::{Frontage, Ward, WardContext};

// mixes the variant into the post-wall reseed
const VARIANT_STRIDE: u32 = 7919;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RoadKind {
    /// Gate to plaza, inside the city.
    Street,
    /// Gate to the edge of the map.
    Road,
}

#[derive(Clone, Debug)]
pub struct Road {
    pub kind: RoadKind,
    pub vertices: Vec<VertexId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LandmarkKind {
    Plaza,
    Castle,
    Cathedral,
    Gate,
    Bridge,
}

#[derive(Clone, Debug)]
pub struct Landmark {
    pub kind: LandmarkKind,
    pub name: String,
    pub position: Vec2,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Summary {
    pub name: String,
    pub patches: usize,
    pub inner_patches: usize,
    pub buildings: usize,
    pub population: f32,
    pub gates: usize,
    pub towers: usize,
    pub bridges: usize,
}

#[derive(Clone, Debug)]
pub struct City {
    /// What was actually built, after any reseeding retries.
    pub blueprint: Blueprint,
    pub mesh: PlanarMesh,
    pub patches: Vec<Patch>,
    pub plaza: Option<FaceId>,
    pub citadel: Option<FaceId>,
    pub wall: Option<CurtainWall>,
    pub citadel_wall: Option<CurtainWall>,
    /// Gates of an unwalled city.
    pub entrances: Vec<VertexId>,
    pub roads: Vec<Road>,
    pub canals: Vec<Canal>,
    pub districts: Vec<District>,
    pub landmarks: Vec<Landmark>,
    pub summary: Summary,
    // boundary chain of the city, walled or not
    border: Vec<VertexId>,
    seq: Sequencer,
}

impl City {
    /// Runs every stage once with the blueprint's seed.
    pub fn build(blueprint: &Blueprint, params: &Params, names: &dyn NameSource) -> Result<Self> {
        blueprint.validate()?;
        let mut seq = Sequencer::new(blueprint.seed);

        let mut city = Self::lay_out(blueprint, params, &mut seq)?;
        debug!(patches = city.patches.len(), "patches laid out");

        city.optimize_junctions();
        city.build_walls(params, &mut seq)?;
        if blueprint.variant > 0 {
            let reseed = seq.next_seed().wrapping_add(blueprint.variant.wrapping_mul(VARIANT_STRIDE));
            seq.reset(reseed);
        }
        city.raise_towers();
        city.build_roads();
        if blueprint.flags.river {
            city.build_canal(&mut seq)?;
        }
        city.mesh.validate()?;

        city.assign_wards(params, &mut seq);
        city.build_districts(names, &mut seq)?;
        city.build_geometry(params);
        city.summarize(names, &mut seq);

        city.seq = seq;
        Ok(city)
    }

    pub fn patch(&self, face: FaceId) -> &Patch {
        &self.patches[face.0]
    }

    /// Gates of the city wall, or the entrances of an open city.
    pub fn gates(&self) -> &[VertexId] {
        match &self.wall {
            Some(wall) => &wall.gates,
            None => &self.entrances,
        }
    }

    pub fn border(&self) -> &[VertexId] {
        &self.border
    }

    pub fn inner_faces(&self) -> BTreeSet<FaceId> {
        self.patches.iter().filter(|p| p.within_city).map(|p| p.face).collect()
    }

    fn water_faces(&self) -> BTreeSet<FaceId> {
        self.patches.iter().filter(|p| p.waterbody).map(|p| p.face).collect()
    }

    fn land_faces(&self) -> BTreeSet<FaceId> {
        self.patches.iter().filter(|p| !p.waterbody).map(|p| p.face).collect()
    }

    /// Vertices where land meets water.
    fn shore_vertices(&self) -> BTreeSet<VertexId> {
        self.mesh
            .alive_vertices()
            .filter(|&v| {
                let faces = self.mesh.vertex_faces(v);
                faces.iter().any(|f| self.patches[f.0].waterbody) && faces.iter().any(|f| !self.patches[f.0].waterbody)
            })
            .collect()
    }

    fn citadel_vertices(&self) -> BTreeSet<VertexId> {
        self.citadel
            .map(|f| self.mesh.face_vertices(f).into_iter().collect())
            .unwrap_or_default()
    }

    fn refresh_shapes(&mut self) {
        for patch in &mut self.patches {
            patch.refresh_shape(&self.mesh);
        }
    }

    /// Rebuilds one patch's geometry from a fresh seed drawn from the city stream.
    pub fn reroll_patch(&mut self, id: usize, params: &Params) -> Result<()> {
        if id >= self.patches.len() {
            return Err(GenerationError::UnknownPatch(id));
        }
        self.patches[id].seed = self.seq.next_seed();
        self.rebuild_patch(id, params);
        self.census();
        debug!(patch = id, ward = self.patches[id].ward.label(), "patch rerolled");
        Ok(())
    }

    // stage 1

    fn lay_out(blueprint: &Blueprint, params: &Params, seq: &mut Sequencer) -> Result<Self> {
        let flags = blueprint.flags;
        let mut points = pgen(blueprint.size * params.points_per_patch, seq);
        let pinned = if flags.plaza {
            plaza_quincunx(&mut points, seq);
            5
        } else {
            1
        };

        let radius = points.iter().map(|p| p.length()).fold(0.0, f32::max);
        let ring = outer_ring(radius * 2.0);
        let points = prelax(points, &ring, pinned, params.relax_steps, params.circumcenter_merge_threshold);
        let keep = points.len();
        let mut generators = points;
        generators.extend_from_slice(&ring);

        let skeleton = vpoly(generators, keep, radius * OUTER_CUTOFF, params.circumcenter_merge_threshold);
        if !skeleton.is_valid() {
            return Err(GenerationError::DegenerateMesh(format!(
                "tessellation of {} seeds kept {} cells",
                keep,
                skeleton.cells.len()
            )));
        }

        // innermost first
        let distance = |cell: usize| skeleton.generator_points[skeleton.generators[cell]].length();
        let mut order: Vec<usize> = (0..skeleton.cells.len()).collect();
        order.sort_by(|&a, &b| distance(a).partial_cmp(&distance(b)).unwrap_or(Ordering::Equal).then(a.cmp(&b)));
        let cells: Vec<Vec<usize>> = order.iter().map(|&i| skeleton.cells[i].clone()).collect();
        let mesh = PlanarMesh::from_polygons(&skeleton.points, &cells)?;

        let patches: Vec<Patch> = (0..mesh.face_count())
            .map(|i| Patch::new(FaceId(i), mesh.face_polygon(FaceId(i)), seq.next_seed()))
            .collect();

        let mut city = Self {
            blueprint: blueprint.clone(),
            mesh,
            patches,
            plaza: None,
            citadel: None,
            wall: None,
            citadel_wall: None,
            entrances: Vec::new(),
            roads: Vec::new(),
            canals: Vec::new(),
            districts: Vec::new(),
            landmarks: Vec::new(),
            summary: Summary::default(),
            border: Vec::new(),
            seq: Sequencer::new(blueprint.seed),
        };
        if flags.coast {
            city.carve_coast(radius, seq);
        }
        city.mark_inner(blueprint.size)?;
        Ok(city)
    }

    fn carve_coast(&mut self, radius: f32, seq: &mut Sequencer) {
        let angle = seq.float() * TAU;
        let f = 20.0 + 40.0 * seq.float();
        let k = 0.3 * radius * (2.0 * seq.normal3() - 1.0);
        let n = radius * (0.2 + (seq.normal4() - 1.0).abs());
        let fbm: Fbm<Perlin> = Fbm::new(seq.next_seed())
            .set_octaves(COAST_OCTAVES)
            .set_frequency(COAST_FREQUENCY);

        let center = Vec2::new(n + f, k);
        // the central patch always stays dry
        for patch in self.patches.iter_mut().skip(1) {
            let c = rotate(patch.centroid(), -angle);
            let grain = fbm.get([(c.x / radius) as f64, (c.y / radius) as f64]) as f32;
            patch.waterbody = c.distance(center) - n + grain * n * (c.length() / radius).sqrt() < 0.0;
        }

        let shoreline: Vec<HalfEdgeId> = self
            .mesh
            .alive_half_edges()
            .filter(|&he| {
                self.mesh.twin(he).is_some_and(|t| {
                    self.patches[self.mesh.face_of(he).0].waterbody != self.patches[self.mesh.face_of(t).0].waterbody
                })
            })
            .collect();
        for he in shoreline {
            self.mesh.tag_edge(he, Some(EdgeTag::Coast));
        }
        debug!(water = self.water_faces().len(), "coast carved");
    }

    // nearest land patch not in `set` but touching it
    fn next_land(&self, set: &BTreeSet<FaceId>) -> Option<FaceId> {
        self.patches
            .iter()
            .filter(|p| !p.waterbody && !set.contains(&p.face))
            .find(|p| self.mesh.face_neighbours(p.face).iter().any(|f| set.contains(f)))
            .map(|p| p.face)
    }

    fn mark_inner(&mut self, size: usize) -> Result<()> {
        let flags = self.blueprint.flags;
        let mut inner = BTreeSet::from([FaceId(0)]);
        while inner.len() < size {
            let Some(face) = self.next_land(&inner) else {
                return Err(GenerationError::NoLand(inner.len()));
            };
            inner.insert(face);
        }
        if flags.plaza {
            self.plaza = Some(FaceId(0));
        }

        if flags.citadel {
            let citadel = if flags.inner_citadel {
                inner.iter().copied().find(|&f| Some(f) != self.plaza)
            } else {
                self.next_land(&inner)
            };
            let Some(citadel) = citadel else {
                return Err(GenerationError::NoLand(inner.len()));
            };
            inner.insert(citadel);
            self.citadel = Some(citadel);
        }

        for patch in &mut self.patches {
            patch.within_city = inner.contains(&patch.face);
            patch.within_walls = flags.walls && patch.within_city && Some(patch.face) != self.citadel;
        }
        Ok(())
    }

    // stage 2

    // water, citadel, city and outside are separate regions
    fn region(&self, face: FaceId) -> u8 {
        let patch = &self.patches[face.0];
        if patch.waterbody {
            1
        } else if Some(face) == self.citadel {
            2
        } else if patch.within_city {
            4
        } else {
            8
        }
    }

    fn region_mask(&self, v: VertexId) -> u8 {
        let mut mask = self.mesh.vertex_faces(v).into_iter().fold(0, |m, f| m | self.region(f));
        if self.mesh.is_horizon_vertex(v) {
            mask |= 16;
        }
        mask
    }

    // boundary vertices only merge with vertices on the same boundary, along it
    fn can_merge(&self, he: HalfEdgeId) -> bool {
        let a = self.region_mask(self.mesh.origin(he));
        let b = self.region_mask(self.mesh.destination(he));
        if a.count_ones() < 2 && b.count_ones() < 2 {
            return true;
        }
        if a != b {
            return false;
        }
        let here = self.region(self.mesh.face_of(he));
        let there = self.mesh.twin(he).map_or(16, |t| self.region(self.mesh.face_of(t)));
        here != there
    }

    fn optimize_junctions(&mut self) {
        let lengths: Vec<f32> = self
            .inner_faces()
            .into_iter()
            .flat_map(|f| self.mesh.face_cycle(f))
            .map(|he| self.mesh.edge_length(he))
            .collect();
        if lengths.is_empty() {
            return;
        }
        let mean = lengths.iter().sum::<f32>() / lengths.len() as f32;
        let threshold = (3.0 * TOWER_RADIUS).max(mean / 3.0);

        let mut collapsed = 0;
        for _ in 0..MAX_JUNCTION_PASSES {
            let short: Vec<HalfEdgeId> = self
                .mesh
                .alive_half_edges()
                .filter(|&he| self.patches[self.mesh.face_of(he).0].within_city)
                .filter(|&he| self.mesh.edge_length(he) < threshold)
                .collect();
            let mut changed = false;
            for he in short {
                // earlier collapses may have removed or stretched it
                if !self.mesh.half_edges[he.0].alive || self.mesh.edge_length(he) >= threshold {
                    continue;
                }
                if !self.can_merge(he) || !self.mesh.can_collapse(he) {
                    continue;
                }
                if self.mesh.collapse_edge(he).is_ok() {
                    collapsed += 1;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        self.refresh_shapes();
        debug!(collapsed, threshold, "junctions merged");
    }

    // stage 3

    fn build_walls(&mut self, params: &Params, seq: &mut Sequencer) -> Result<()> {
        let flags = self.blueprint.flags;
        let water = self.water_faces();
        let shore = self.shore_vertices();

        let inner: BTreeSet<FaceId> = self
            .patches
            .iter()
            .filter(|p| p.within_city && Some(p.face) != self.citadel)
            .map(|p| p.face)
            .collect();
        let mut reserved = shore.clone();
        reserved.extend(self.citadel_vertices());

        let mut wall = CurtainWall::new(&mut self.mesh, inner, &reserved, flags.walls)?;
        let coast_egress = wall.chain.iter().any(|v| shore.contains(v));
        wall.select_gates(
            &mut self.mesh,
            &water,
            &reserved,
            self.blueprint.gates,
            coast_egress,
            params.gate_spacing,
            seq,
        )?;
        self.split_gates(&wall, &water, seq)?;
        self.border = wall.chain.clone();
        if flags.walls {
            self.wall = Some(wall);
        } else {
            self.entrances = wall.gates;
        }

        if let Some(citadel) = self.citadel {
            // corners facing away from the city stay closed
            let mut closed: BTreeSet<VertexId> = self
                .citadel_vertices()
                .into_iter()
                .filter(|&v| {
                    !self
                        .mesh
                        .vertex_faces(v)
                        .iter()
                        .any(|&f| f != citadel && self.patches[f.0].within_city)
                })
                .collect();
            closed.extend(shore.iter().copied());
            let mut keep = CurtainWall::new(&mut self.mesh, BTreeSet::from([citadel]), &closed, true)?;
            keep.select_gates(&mut self.mesh, &water, &closed, GateMode::Fixed(1), false, params.gate_spacing, seq)?;
            self.citadel_wall = Some(keep);
        }

        self.refresh_shapes();
        debug!(
            gates = self.gates().len(),
            border = self.border.len(),
            walled = flags.walls,
            citadel = self.citadel_wall.is_some(),
            "walls built"
        );
        Ok(())
    }

    fn split_gates(&mut self, wall: &CurtainWall, water: &BTreeSet<FaceId>, seq: &mut Sequencer) -> Result<()> {
        for (old, new) in wall.split_gate_faces(&mut self.mesh, water)? {
            if new.0 != self.patches.len() {
                return Err(GenerationError::Invariant(format!(
                    "split face {} does not follow the {} patches",
                    new,
                    self.patches.len()
                )));
            }
            let shape = self.mesh.face_polygon(new);
            let patch = self.patches[old.0].split_off(new, shape, seq.next_seed());
            self.patches.push(patch);
            self.patches[old.0].refresh_shape(&self.mesh);
        }
        Ok(())
    }

    // stage 4

    fn raise_towers(&mut self) {
        let water = self.water_faces();
        let citadel = self.citadel;
        if let Some(wall) = &mut self.wall {
            wall.disable_segments(&self.mesh, |f| f.is_some_and(|f| water.contains(&f) || Some(f) == citadel));
            wall.build_towers();
            wall.tag(&mut self.mesh);
        }
        if let Some(keep) = &mut self.citadel_wall {
            keep.disable_segments(&self.mesh, |f| f.is_some_and(|f| water.contains(&f)));
            keep.build_towers();
            keep.tag(&mut self.mesh);
        }
    }

    // stage 5

    fn build_roads(&mut self) {
        let gates: Vec<VertexId> = self.gates().to_vec();
        let citadel_vertices = self.citadel_vertices();
        let citadel_gate = self.citadel_wall.as_ref().and_then(|w| w.gates.first().copied());
        let shore = self.shore_vertices();

        let town: Vec<FaceId> = self
            .patches
            .iter()
            .filter(|p| p.within_city && Some(p.face) != self.citadel)
            .map(|p| p.face)
            .collect();
        let mut streets = Topology::build(&self.mesh, town, &[]);
        streets.exclude_vertices(self.border.iter().copied().filter(|v| !gates.contains(v)));
        streets.exclude_vertices(citadel_vertices.iter().copied().filter(|&v| Some(v) != citadel_gate));

        let centre = self.mesh.face_vertices(self.plaza.unwrap_or(FaceId(0)));
        for &gate in gates.iter().chain(citadel_gate.iter()) {
            let origin = self.mesh.point(gate);
            let target = centre.iter().copied().min_by(|&a, &b| {
                self.mesh
                    .point(a)
                    .distance(origin)
                    .partial_cmp(&self.mesh.point(b).distance(origin))
                    .unwrap_or(Ordering::Equal)
                    .then(a.cmp(&b))
            });
            match target.and_then(|t| streets.shortest_path(gate, t)) {
                Some(path) if path.len() > 1 => self.roads.push(Road { kind: RoadKind::Street, vertices: path }),
                Some(_) => {}
                None => warn!(%gate, "no street from gate to the centre"),
            }
        }

        let country: Vec<FaceId> = self
            .patches
            .iter()
            .filter(|p| !p.within_city && !p.waterbody)
            .map(|p| p.face)
            .collect();
        let mut roads = Topology::build(&self.mesh, country, &[]);
        roads.exclude_vertices(self.border.iter().copied());
        roads.exclude_vertices(shore.iter().copied());
        roads.exclude_vertices(citadel_vertices.iter().copied());
        let horizon: Vec<VertexId> = roads
            .vertices()
            .filter(|&v| self.mesh.is_horizon_vertex(v) && !roads.is_excluded(v))
            .collect();

        for &gate in &gates {
            if !roads.contains(gate) {
                continue;
            }
            let origin = self.mesh.point(gate);
            let heading = origin.normalize_or_zero();
            let alignment = |v: VertexId| (self.mesh.point(v) - origin).normalize_or_zero().dot(heading);
            let mut targets = horizon.clone();
            targets.sort_by(|&a, &b| alignment(b).partial_cmp(&alignment(a)).unwrap_or(Ordering::Equal).then(a.cmp(&b)));

            let path = targets
                .iter()
                .take(MAX_ROAD_TARGETS)
                .find_map(|&t| roads.shortest_path(gate, t));
            match path {
                Some(path) => self.roads.push(Road { kind: RoadKind::Road, vertices: path }),
                None => warn!(%gate, "no road from gate to the edge of the map"),
            }
        }

        self.smooth_roads(&gates, &shore);
        for road in &self.roads {
            self.mesh.tag_chain(&road.vertices, EdgeTag::Road);
        }
        self.refresh_shapes();
        debug!(roads = self.roads.len(), "roads routed");
    }

    fn smooth_roads(&mut self, gates: &[VertexId], shore: &BTreeSet<VertexId>) {
        let mut fixed: BTreeSet<VertexId> = self.border.iter().copied().collect();
        fixed.extend(gates.iter().copied());
        fixed.extend(shore.iter().copied());
        if let Some(keep) = &self.citadel_wall {
            fixed.extend(keep.chain.iter().copied());
        }

        let mut smoothed = BTreeSet::new();
        for road in &self.roads {
            let chain = &road.vertices;
            for i in 1..chain.len().saturating_sub(1) {
                let cur = chain[i];
                if fixed.contains(&cur) || self.mesh.is_horizon_vertex(cur) || !smoothed.insert(cur) {
                    continue;
                }
                let prev = self.mesh.point(chain[i - 1]);
                let next = self.mesh.point(chain[i + 1]);
                let point = (prev + self.mesh.point(cur) * ROAD_SMOOTHING + next) / (2.0 + ROAD_SMOOTHING);
                self.mesh.set_point(cur, point);
            }
        }
    }

    // stage 6

    fn build_canal(&mut self, seq: &mut Sequencer) -> Result<()> {
        let land = self.land_faces();
        let city = self.inner_faces();
        let shore = self.shore_vertices();
        let mut excluded = self.citadel_vertices();
        excluded.extend(self.gates().iter().copied());
        if let Some(keep) = &self.citadel_wall {
            excluded.extend(keep.gates.iter().copied());
        }
        let roads: Vec<Vec<VertexId>> = self.roads.iter().map(|r| r.vertices.clone()).collect();
        let mut walls = Vec::new();
        if let Some(wall) = &self.wall {
            walls.push((WallKind::City, wall.chain.clone()));
        }
        if let Some(keep) = &self.citadel_wall {
            walls.push((WallKind::Citadel, keep.chain.clone()));
        }

        let ctx = RiverContext {
            land: &land,
            city: &city,
            shore: &shore,
            excluded: &excluded,
            roads: &roads,
            walls: &walls,
            inner_count: city.len(),
        };
        let canal = Canal::route(&self.mesh, &ctx, self.blueprint.flags.coast, seq)?;

        let index = self.canals.len();
        for (&v, &kind) in &canal.gates {
            let wall = match kind {
                WallKind::City => self.wall.as_mut(),
                WallKind::Citadel => self.citadel_wall.as_mut(),
            };
            if let Some(wall) = wall {
                wall.add_watergate(v, index);
            }
        }
        canal.tag(&mut self.mesh);
        self.canals.push(canal);
        Ok(())
    }

    // stage 7

    fn touches_water(&self, face: FaceId) -> bool {
        self.mesh.face_neighbours(face).iter().any(|f| self.patches[f.0].waterbody)
    }

    fn touches_road(&self, face: FaceId) -> bool {
        let gates = self.gates();
        self.mesh.face_cycle(face).into_iter().any(|he| {
            self.mesh.tag(he) == Some(EdgeTag::Road) || gates.contains(&self.mesh.origin(he))
        })
    }

    fn assign_wards(&mut self, params: &Params, seq: &mut Sequencer) {
        let flags = self.blueprint.flags;
        let n = self.patches.len();
        let mut assigned = vec![false; n];

        for i in 0..n {
            if self.patches[i].waterbody {
                set_ward(&mut self.patches, &mut assigned, i, Ward::Wilderness);
            }
        }
        if let Some(plaza) = self.plaza {
            set_ward(&mut self.patches, &mut assigned, plaza.0, Ward::Market);
        }
        if let Some(citadel) = self.citadel {
            set_ward(&mut self.patches, &mut assigned, citadel.0, Ward::Castle);
        }

        let free = |patches: &[Patch], assigned: &[bool], i: usize| !assigned[i] && patches[i].within_city;
        if flags.temple {
            let temple = (0..n).filter(|&i| free(&self.patches, &assigned, i)).min_by(|&a, &b| {
                self.patches[a]
                    .centroid()
                    .length()
                    .partial_cmp(&self.patches[b].centroid().length())
                    .unwrap_or(Ordering::Equal)
                    .then(a.cmp(&b))
            });
            if let Some(i) = temple {
                set_ward(&mut self.patches, &mut assigned, i, Ward::Cathedral);
            }
        }

        let docks: Vec<usize> = (0..n)
            .filter(|&i| free(&self.patches, &assigned, i) && self.touches_water(FaceId(i)))
            .take(params.max_docks)
            .collect();
        for i in docks {
            set_ward(&mut self.patches, &mut assigned, i, Ward::Harbour);
        }

        for i in 0..n {
            if !free(&self.patches, &assigned, i) {
                continue;
            }
            let ward = if flags.greenery && seq.chance(params.park_chance) { Ward::Park } else { Ward::Alleys };
            set_ward(&mut self.patches, &mut assigned, i, ward);
        }

        let reach = self
            .patches
            .iter()
            .filter(|p| p.within_city)
            .map(|p| p.centroid().length())
            .fold(f32::EPSILON, f32::max);
        for i in 0..n {
            if assigned[i] {
                continue;
            }
            let ward = if flags.shantytown && self.touches_road(FaceId(i)) {
                self.patches[i].within_city = true;
                Ward::Alleys
            } else {
                let d = self.patches[i].centroid().length() / reach;
                let p = ((FARM_RADIUS - d) / (FARM_RADIUS - 1.0)).clamp(0.0, 1.0);
                if seq.chance(p) { Ward::Farm } else { Ward::Wilderness }
            };
            set_ward(&mut self.patches, &mut assigned, i, ward);
        }
        debug!(
            alleys = self.patches.iter().filter(|p| p.ward == Ward::Alleys).count(),
            farms = self.patches.iter().filter(|p| p.ward == Ward::Farm).count(),
            "wards assigned"
        );
    }

    // stage 8

    fn land_face_at(&self, v: VertexId) -> Option<FaceId> {
        let mut faces = self.mesh.vertex_faces(v);
        faces.sort();
        faces.into_iter().find(|f| !self.patches[f.0].waterbody)
    }

    fn build_districts(&mut self, names: &dyn NameSource, seq: &mut Sequencer) -> Result<()> {
        let mut seeds: Vec<(FaceId, DistrictKind)> = Vec::new();
        if let Some(plaza) = self.plaza {
            seeds.push((plaza, DistrictKind::Center));
        }
        if let Some(citadel) = self.citadel {
            seeds.push((citadel, DistrictKind::Castle));
        }
        if let Some(wall) = &self.wall {
            for &gate in &wall.gates {
                let mut faces = self.mesh.vertex_faces(gate);
                faces.sort();
                if let Some(&face) = faces.iter().find(|f| self.patches[f.0].within_walls) {
                    seeds.push((face, DistrictKind::Gate));
                }
            }
        }
        for canal in &self.canals {
            for (&v, road) in &canal.bridges {
                if road.is_some() {
                    if let Some(face) = self.land_face_at(v) {
                        seeds.push((face, DistrictKind::Bridge));
                    }
                }
            }
            if let Some(face) = canal.course.get(canal.course.len() / 2).and_then(|&v| self.land_face_at(v)) {
                seeds.push((face, DistrictKind::Bank));
            }
        }
        if let Some(harbour) = self.patches.iter().find(|p| p.ward == Ward::Harbour) {
            seeds.push((harbour.face, DistrictKind::Docks));
        }
        for patch in self.patches.iter().filter(|p| p.ward == Ward::Park) {
            seeds.push((patch.face, DistrictKind::Park));
        }

        let districts = district::partition(&self.mesh, &self.patches, &seeds, names, seq)?;
        for (index, district) in districts.iter().enumerate() {
            for face in &district.faces {
                self.patches[face.0].district = Some(index);
            }
        }
        self.districts = districts;
        Ok(())
    }

    // stage 9

    fn frontage(&self, patch: &Patch, he: HalfEdgeId) -> Frontage {
        let across = self.mesh.twin(he).map(|t| &self.patches[self.mesh.face_of(t).0]);
        match self.mesh.tag(he) {
            Some(EdgeTag::Wall) => Frontage::Wall,
            Some(EdgeTag::Canal) => {
                let (a, b) = (self.mesh.origin(he), self.mesh.destination(he));
                let width = self
                    .canals
                    .iter()
                    .find(|c| c.contains_edge(a, b))
                    .map_or(0.0, |c| c.width);
                Frontage::Canal(width)
            }
            Some(EdgeTag::Road) => Frontage::Road,
            _ if !patch.waterbody && across.is_some_and(|p| p.waterbody) => Frontage::Coast,
            _ if Some(patch.face) != self.plaza && across.is_some_and(|p| Some(p.face) == self.plaza) => {
                Frontage::Plaza
            }
            _ => Frontage::Plain,
        }
    }

    fn rebuild_patch(&mut self, index: usize, params: &Params) {
        let patch = &self.patches[index];
        let frontage = self
            .mesh
            .face_cycle(patch.face)
            .into_iter()
            .map(|he| self.frontage(patch, he))
            .collect();
        let ctx = WardContext {
            shape: &patch.shape,
            frontage,
            urban: patch.within_city,
            water: patch.waterbody,
            greenery: self.blueprint.flags.greenery,
            params,
        };
        let mut rng = Sequencer::new(patch.seed);
        let mut geometry = patch.ward.create_geometry(&ctx, &mut rng);
        geometry.trees = patch.ward.spawn_trees(&ctx, &geometry, &mut rng);
        self.patches[index].geometry = geometry;
    }

    fn build_geometry(&mut self, params: &Params) {
        self.refresh_shapes();
        for index in 0..self.patches.len() {
            self.rebuild_patch(index, params);
        }
        debug!(
            lots = self.patches.iter().map(|p| p.geometry.lots.len()).sum::<usize>(),
            "geometry built"
        );
    }

    // stage 10

    fn census(&mut self) {
        for district in &mut self.districts {
            let floor_area: f32 = district.faces.iter().map(|f| self.patches[f.0].building_area()).sum();
            district.population = floor_area * FLOORS / AREA_PER_RESIDENT;
        }
        self.summary.buildings = self.patches.iter().map(|p| p.geometry.buildings.len()).sum();
        self.summary.population = self.districts.iter().map(|d| d.population).sum();
    }

    fn place_landmarks(&mut self) {
        let mut marks = Vec::new();
        if let Some(plaza) = self.plaza {
            marks.push(Landmark {
                kind: LandmarkKind::Plaza,
                name: "Market Square".to_string(),
                position: self.patch(plaza).centroid(),
            });
        }
        if let Some(citadel) = self.citadel {
            marks.push(Landmark {
                kind: LandmarkKind::Castle,
                name: "Castle".to_string(),
                position: self.patch(citadel).centroid(),
            });
        }
        for patch in self.patches.iter().filter(|p| p.ward == Ward::Cathedral) {
            marks.push(Landmark {
                kind: LandmarkKind::Cathedral,
                name: "Cathedral".to_string(),
                position: patch.centroid(),
            });
        }
        for &gate in self.gates() {
            let position = self.mesh.point(gate);
            marks.push(Landmark {
                kind: LandmarkKind::Gate,
                name: format!("{} Gate", compass(position)),
                position,
            });
        }
        if let Some(&gate) = self.citadel_wall.as_ref().and_then(|w| w.gates.first()) {
            marks.push(Landmark {
                kind: LandmarkKind::Gate,
                name: "Castle Gate".to_string(),
                position: self.mesh.point(gate),
            });
        }
        let mut count = 0;
        for canal in &self.canals {
            for (&v, road) in &canal.bridges {
                if road.is_none() {
                    continue;
                }
                count += 1;
                marks.push(Landmark {
                    kind: LandmarkKind::Bridge,
                    name: format!("Bridge {count}"),
                    position: self.mesh.point(v),
                });
            }
        }
        self.landmarks = marks;
    }

    fn summarize(&mut self, names: &dyn NameSource, seq: &mut Sequencer) {
        self.place_landmarks();
        self.summary = Summary {
            name: names.city_name(seq),
            patches: self.patches.len(),
            inner_patches: self.patches.iter().filter(|p| p.within_city).count(),
            gates: self.gates().len(),
            towers: self.wall.iter().chain(self.citadel_wall.iter()).map(|w| w.towers.len()).sum(),
            bridges: self
                .canals
                .iter()
                .map(|c| c.bridges.values().filter(|r| r.is_some()).count())
                .sum(),
            ..Summary::default()
        };
        self.census();
        debug!(
            name = %self.summary.name,
            buildings = self.summary.buildings,
            population = self.summary.population,
            "settlement summarized"
        );
    }
}

fn set_ward(patches: &mut [Patch], assigned: &mut [bool], i: usize, ward: Ward) {
    patches[i].ward = ward;
    assigned[i] = true;
}

// eight-point compass name of a direction from the centre
fn compass(direction: Vec2) -> &'static str {
    const NAMES: [&str; 8] = [
        "East", "North-East", "North", "North-West", "West", "South-West", "South", "South-East",
    ];
    let angle = direction.y.atan2(direction.x).rem_euclid(TAU);
    NAMES[(angle / (TAU / 8.0)).round() as usize % 8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compass_points() {
        assert_eq!(compass(Vec2::X), "East");
        assert_eq!(compass(Vec2::Y), "North");
        assert_eq!(compass(Vec2::new(-1.0, -1.0)), "South-West");
        assert_eq!(compass(Vec2::new(1.0, -0.01)), "East");
    }
}
