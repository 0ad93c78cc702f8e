//! Curtain walls: boundary chain, gates and towers.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;
use serde::Serialize;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use tracing::{debug, trace};

use crate::config::{GateMode, GATE_EXCLUSION_WINDOW, WALL_SMOOTHING};
use crate::error::{GenerationError, Result};
use crate::systems::random::Sequencer;
use super::Polygon;
use super::dcel::{EdgeTag, FaceId, PlanarMesh, VertexId};
use super::poly::utils::{intersect_lines, polygon_perimeter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum WallKind {
    City,
    Citadel,
}

/// Closed boundary around a set of patches.
///
/// `segments[i]` runs from `chain[i]` to `chain[i + 1]` and says whether a
/// wall actually stands there. A non-real wall only carries gates; it is
/// how an unwalled city finds its entrances.
#[derive(Clone, Debug)]
pub struct CurtainWall {
    pub real: bool,
    pub patches: BTreeSet<FaceId>,
    pub chain: Vec<VertexId>,
    pub segments: Vec<bool>,
    pub gates: Vec<VertexId>,
    pub towers: Vec<VertexId>,
    /// Chain vertex where a canal passes, mapped to the canal index.
    pub watergates: BTreeMap<VertexId, usize>,
}

// new = (prev + cur * f + next) / (2 + f)
fn smooth_vertex(prev: Vec2, cur: Vec2, next: Vec2, f: f32) -> Vec2 {
    (prev + cur * f + next) / (2.0 + f)
}

impl CurtainWall {
    pub fn new(
        mesh: &mut PlanarMesh,
        patches: BTreeSet<FaceId>,
        reserved: &BTreeSet<VertexId>,
        real: bool,
    ) -> Result<Self> {
        let chain = if patches.len() == 1 {
            patches
                .first()
                .map(|&f| mesh.face_vertices(f))
                .unwrap_or_default()
        } else {
            // a disjoint union walls its largest piece
            mesh.chain_vertices(&mesh.outer_circumference(&patches))
        };
        if chain.len() < 3 {
            return Err(GenerationError::DegenerateMesh(format!(
                "wall around {} patches has a {}-vertex boundary",
                patches.len(),
                chain.len()
            )));
        }

        if real && patches.len() > 1 {
            let factor = (WALL_SMOOTHING / patches.len() as f32).min(1.0);
            let n = chain.len();
            let smoothed: Vec<Vec2> = (0..n)
                .map(|i| {
                    let cur = mesh.point(chain[i]);
                    if reserved.contains(&chain[i]) {
                        cur
                    } else {
                        let prev = mesh.point(chain[(i + n - 1) % n]);
                        let next = mesh.point(chain[(i + 1) % n]);
                        smooth_vertex(prev, cur, next, factor)
                    }
                })
                .collect();
            for (&v, p) in chain.iter().zip(smoothed) {
                mesh.set_point(v, p);
            }
        }

        let segments = vec![true; chain.len()];
        Ok(Self {
            real,
            patches,
            chain,
            segments,
            gates: Vec::new(),
            towers: Vec::new(),
            watergates: BTreeMap::new(),
        })
    }

    pub fn polygon(&self, mesh: &PlanarMesh) -> Polygon {
        self.chain.iter().map(|&v| mesh.point(v)).collect()
    }

    pub fn perimeter(&self, mesh: &PlanarMesh) -> f32 {
        polygon_perimeter(&self.polygon(mesh))
    }

    pub fn radius(&self, mesh: &PlanarMesh) -> f32 {
        self.chain.iter().map(|&v| mesh.point(v).length()).fold(0.0, f32::max)
    }

    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.chain.contains(&v)
    }

    pub fn position(&self, v: VertexId) -> Option<usize> {
        self.chain.iter().position(|&c| c == v)
    }

    pub fn is_gate(&self, v: VertexId) -> bool {
        self.gates.contains(&v)
    }

    pub fn is_tower(&self, v: VertexId) -> bool {
        self.towers.contains(&v)
    }

    // face across segment i, if any
    fn outer_face(&self, mesh: &PlanarMesh, i: usize) -> Option<FaceId> {
        let a = self.chain[i];
        let b = self.chain[(i + 1) % self.chain.len()];
        let he = mesh.find_half_edge(a, b)?;
        mesh.twin(he).map(|t| mesh.face_of(t))
    }

    /// Picks gate vertices by weighted sampling along the chain.
    ///
    /// A candidate must touch two patches of the walled set and one land patch
    /// outside it; a single-patch wall accepts any unreserved vertex. Every
    /// gate closes the chain positions around it.
    pub fn select_gates(
        &mut self,
        mesh: &mut PlanarMesh,
        water: &BTreeSet<FaceId>,
        reserved: &BTreeSet<VertexId>,
        mode: GateMode,
        coast_egress: bool,
        spacing: f32,
        rng: &mut Sequencer,
    ) -> Result<()> {
        let n = self.chain.len();
        let eligible = |v: VertexId, strict: bool| -> bool {
            if reserved.contains(&v) {
                return false;
            }
            if self.patches.len() == 1 {
                return true;
            }
            let faces = mesh.vertex_faces(v);
            let inner = faces.iter().filter(|f| self.patches.contains(f)).count();
            let outer_land = faces
                .iter()
                .any(|f| !self.patches.contains(f) && !water.contains(f));
            inner > 1 && (outer_land || !strict)
        };

        let mut weights: Vec<f32> = self
            .chain
            .iter()
            .map(|&v| if eligible(v, true) { 1.0 } else { 0.0 })
            .collect();
        if weights.iter().all(|&w| w == 0.0) {
            weights = self
                .chain
                .iter()
                .map(|&v| if eligible(v, false) { 1.0 } else { 0.0 })
                .collect();
        }

        let (target, window) = match mode {
            GateMode::EveryVertex => (n, 0),
            GateMode::Fixed(count) => (count.max(1), GATE_EXCLUSION_WINDOW),
            GateMode::Auto => {
                let by_length = ((self.perimeter(mesh) / spacing) as usize).max(1);
                let count = if coast_egress { by_length - by_length / 3 } else { by_length };
                (count.max(1), GATE_EXCLUSION_WINDOW)
            }
        };

        let mut gates = Vec::new();
        while gates.len() < target {
            let Ok(dist) = WeightedIndex::new(&weights) else {
                break; // no candidates left
            };
            let index = dist.sample(rng);
            gates.push(self.chain[index]);
            for offset in 0..=window {
                weights[(index + offset) % n] = 0.0;
                weights[(index + n - offset % n) % n] = 0.0;
            }
        }

        if gates.is_empty() {
            return Err(GenerationError::NoGates(n));
        }

        // pull gates into line with their neighbours
        if self.real {
            for &gate in &gates {
                if let Some(i) = self.position(gate) {
                    let prev = mesh.point(self.chain[(i + n - 1) % n]);
                    let next = mesh.point(self.chain[(i + 1) % n]);
                    let cur = mesh.point(gate);
                    mesh.set_point(gate, smooth_vertex(prev, cur, next, 1.0));
                }
            }
        }

        debug!(gates = gates.len(), chain = n, real = self.real, "gates selected");
        self.gates = gates;
        Ok(())
    }

    /// Splits the single outside patch in front of each gate so a road can
    /// leave the gate between two patches.
    ///
    /// # Returns
    /// `(split face, new face)` for every split made.
    pub fn split_gate_faces(
        &self,
        mesh: &mut PlanarMesh,
        water: &BTreeSet<FaceId>,
    ) -> Result<Vec<(FaceId, FaceId)>> {
        let mut splits = Vec::new();
        let n = self.chain.len();
        for &gate in &self.gates {
            let outside: Vec<FaceId> = mesh
                .vertex_faces(gate)
                .into_iter()
                .filter(|f| !self.patches.contains(f))
                .collect();
            let &[face] = outside.as_slice() else { continue };
            if water.contains(&face) || mesh.face_cycle(face).len() <= 3 {
                continue;
            }
            let Some(i) = self.position(gate) else { continue };

            let wall_dir = mesh.point(self.chain[(i + 1) % n]) - mesh.point(self.chain[(i + n - 1) % n]);
            let out = Vec2::new(wall_dir.y, -wall_dir.x);
            let origin = mesh.point(gate);

            let Some(target) = self.ray_target(mesh, face, gate, origin, out) else {
                trace!(%gate, "no split target in front of gate");
                continue;
            };
            let new_face = mesh.split_face(face, gate, target)?;
            splits.push((face, new_face));
        }
        Ok(splits)
    }

    // vertex where the outward ray from the gate leaves `face`, inserted if needed
    fn ray_target(
        &self,
        mesh: &mut PlanarMesh,
        face: FaceId,
        gate: VertexId,
        origin: Vec2,
        out: Vec2,
    ) -> Option<VertexId> {
        let cycle = mesh.face_cycle(face);
        let neighbours: Vec<VertexId> = cycle
            .iter()
            .filter(|&&he| mesh.origin(he) == gate || mesh.destination(he) == gate)
            .flat_map(|&he| [mesh.origin(he), mesh.destination(he)])
            .collect();

        let mut best: Option<(f32, usize, f32)> = None;
        for (k, &he) in cycle.iter().enumerate() {
            let (a, b) = (mesh.origin(he), mesh.destination(he));
            if a == gate || b == gate || mesh.tag(he) == Some(EdgeTag::Wall) {
                continue;
            }
            let (pa, pb) = mesh.segment(he);
            if let Some((t, u)) = intersect_lines(origin, out, pa, pb - pa) {
                if t > 0.0 && (0.0..=1.0).contains(&u) && best.is_none_or(|(bt, _, _)| t < bt) {
                    best = Some((t, k, u));
                }
            }
        }
        let (_, k, u) = best?;
        let he = cycle[k];

        // snap to an existing corner when the hit is close to one
        let snapped = if u < 0.15 {
            Some(mesh.origin(he))
        } else if u > 0.85 {
            Some(mesh.destination(he))
        } else {
            None
        };
        match snapped {
            Some(v) if !neighbours.contains(&v) => Some(v),
            Some(_) => None,
            None => {
                let (pa, pb) = mesh.segment(he);
                Some(mesh.split_edge(he, pa.lerp(pb, u)))
            }
        }
    }

    /// Drops the wall on every segment whose outer side satisfies `open`.
    pub fn disable_segments(&mut self, mesh: &PlanarMesh, open: impl Fn(Option<FaceId>) -> bool) {
        for i in 0..self.chain.len() {
            if open(self.outer_face(mesh, i)) {
                self.segments[i] = false;
            }
        }
    }

    pub fn build_towers(&mut self) {
        self.towers.clear();
        if !self.real {
            return;
        }
        let n = self.chain.len();
        for i in 0..n {
            let v = self.chain[i];
            if self.is_gate(v) || self.watergates.contains_key(&v) {
                continue;
            }
            if self.segments[(i + n - 1) % n] || self.segments[i] {
                self.towers.push(v);
            }
        }
    }

    /// Marks a canal crossing. A watergate never carries a tower.
    pub fn add_watergate(&mut self, v: VertexId, canal: usize) {
        self.watergates.insert(v, canal);
        self.towers.retain(|&t| t != v);
    }

    /// Tags every standing segment as wall in the mesh.
    pub fn tag(&self, mesh: &mut PlanarMesh) {
        if !self.real {
            return;
        }
        let n = self.chain.len();
        for i in 0..n {
            if !self.segments[i] {
                continue;
            }
            if let Some(he) = mesh.edge_between(self.chain[i], self.chain[(i + 1) % n]) {
                mesh.tag_edge(he, Some(EdgeTag::Wall));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 4x4 grid of 10-unit squares, the walled set is the middle 2x2
    fn grid() -> (PlanarMesh, BTreeSet<FaceId>) {
        let mut points = Vec::new();
        for y in 0..5 {
            for x in 0..5 {
                points.push(Vec2::new(x as f32 * 10.0, y as f32 * 10.0));
            }
        }
        let mut cells = Vec::new();
        for y in 0..4 {
            for x in 0..4 {
                let a = y * 5 + x;
                cells.push(vec![a, a + 1, a + 6, a + 5]);
            }
        }
        let mesh = PlanarMesh::from_polygons(&points, &cells).unwrap();
        let inner = [5, 6, 9, 10].into_iter().map(FaceId).collect();
        (mesh, inner)
    }

    #[test]
    fn test_chain_is_closed_boundary() {
        let (mut mesh, inner) = grid();
        let wall = CurtainWall::new(&mut mesh, inner, &BTreeSet::new(), false).unwrap();
        assert_eq!(wall.chain.len(), 8);
        assert_eq!(wall.segments.len(), 8);
        assert!((wall.perimeter(&mesh) - 80.0).abs() < 1e-3);
    }

    #[test]
    fn test_gates_are_never_towers() {
        let (mut mesh, inner) = grid();
        let mut rng = Sequencer::new(4);
        let mut wall = CurtainWall::new(&mut mesh, inner, &BTreeSet::new(), true).unwrap();
        wall.select_gates(&mut mesh, &BTreeSet::new(), &BTreeSet::new(), GateMode::Fixed(2), false, 350.0, &mut rng)
            .unwrap();
        wall.build_towers();
        assert!(!wall.gates.is_empty());
        for gate in &wall.gates {
            assert!(wall.contains_vertex(*gate));
            assert!(!wall.is_tower(*gate));
        }
        assert_eq!(wall.towers.len() + wall.gates.len(), wall.chain.len());
    }

    #[test]
    fn test_only_edge_midpoints_qualify() {
        // corners of the 2x2 block touch one inner patch, midpoints touch two
        let (mut mesh, inner) = grid();
        let mut rng = Sequencer::new(8);
        let mut wall = CurtainWall::new(&mut mesh, inner.clone(), &BTreeSet::new(), false).unwrap();
        wall.select_gates(&mut mesh, &BTreeSet::new(), &BTreeSet::new(), GateMode::EveryVertex, false, 350.0, &mut rng)
            .unwrap();
        assert_eq!(wall.gates.len(), 4);
        for gate in &wall.gates {
            let faces = mesh.vertex_faces(*gate);
            assert_eq!(faces.iter().filter(|f| inner.contains(f)).count(), 2);
        }
    }

    #[test]
    fn test_all_reserved_fails() {
        let (mut mesh, inner) = grid();
        let mut rng = Sequencer::new(8);
        let mut wall = CurtainWall::new(&mut mesh, inner, &BTreeSet::new(), true).unwrap();
        let reserved: BTreeSet<VertexId> = wall.chain.iter().copied().collect();
        let result = wall.select_gates(&mut mesh, &BTreeSet::new(), &reserved, GateMode::Auto, false, 350.0, &mut rng);
        assert!(matches!(result, Err(GenerationError::NoGates(8))));
    }

    #[test]
    fn test_disabled_segments_lose_towers() {
        let (mut mesh, inner) = grid();
        let mut wall = CurtainWall::new(&mut mesh, inner, &BTreeSet::new(), true).unwrap();
        wall.disable_segments(&mesh, |_| true);
        wall.build_towers();
        assert!(wall.towers.is_empty());
    }

    #[test]
    fn test_gate_split_adds_face() {
        let (mut mesh, inner) = grid();
        let mut rng = Sequencer::new(2);
        let mut wall = CurtainWall::new(&mut mesh, inner, &BTreeSet::new(), true).unwrap();
        wall.select_gates(&mut mesh, &BTreeSet::new(), &BTreeSet::new(), GateMode::Fixed(1), false, 350.0, &mut rng)
            .unwrap();
        let before = mesh.face_count();
        let splits = wall.split_gate_faces(&mut mesh, &BTreeSet::new()).unwrap();
        assert_eq!(mesh.face_count(), before + splits.len());
        mesh.validate().unwrap();
    }
}
