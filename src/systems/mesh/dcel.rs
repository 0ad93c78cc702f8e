//! Half-edge mesh over the settlement's patches.
//!
//! Vertices, half-edges and faces live in flat arenas addressed by typed
//! indices. A half-edge without a twin lies on the outer boundary of the
//! mesh (the horizon). Collapsed elements are tombstoned rather than removed
//! so that ids handed out earlier stay valid.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use glam::Vec2;
use serde::Serialize;

use crate::error::{GenerationError, Result};
use crate::systems::mesh::Polygon;
use crate::systems::mesh::poly::utils::polygon_area;

macro_rules! idx {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

idx!(VertexId);
idx!(HalfEdgeId);
idx!(FaceId);

/// What runs along an edge. Routing skips tagged edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EdgeTag {
    Coast,
    Road,
    Wall,
    Canal,
}

#[derive(Clone, Debug)]
pub struct Vertex {
    pub point: Vec2,
    /// Outgoing half-edges.
    pub edges: Vec<HalfEdgeId>,
    pub alive: bool,
}

#[derive(Clone, Debug)]
pub struct HalfEdge {
    pub origin: VertexId,
    pub twin: Option<HalfEdgeId>,
    pub next: HalfEdgeId,
    pub face: FaceId,
    pub tag: Option<EdgeTag>,
    pub alive: bool,
}

#[derive(Clone, Debug)]
pub struct Face {
    pub half_edge: HalfEdgeId,
}

#[derive(Clone, Debug, Default)]
pub struct PlanarMesh {
    pub vertices: Vec<Vertex>,
    pub half_edges: Vec<HalfEdge>,
    pub faces: Vec<Face>,
}

impl PlanarMesh {
    /// Builds the mesh from CCW cells given as indices into `points`.
    ///
    /// Face `i` is cell `i` and vertex `i` is point `i`; points no cell uses
    /// stay as dead vertices. Twins are matched on the reversed vertex pair;
    /// a directed edge used by two cells means the cells overlap and the
    /// tessellation is rejected.
    pub fn from_polygons(points: &[Vec2], cells: &[Vec<usize>]) -> Result<Self> {
        let mut mesh = PlanarMesh {
            vertices: points
                .iter()
                .map(|&point| Vertex { point, edges: Vec::new(), alive: false })
                .collect(),
            ..Default::default()
        };
        let mut directed: HashMap<(VertexId, VertexId), HalfEdgeId> = HashMap::new();

        for (face_idx, cell) in cells.iter().enumerate() {
            if cell.len() < 3 {
                return Err(GenerationError::DegenerateMesh(format!(
                    "cell {} has {} vertices",
                    face_idx,
                    cell.len()
                )));
            }

            let mut ids = Vec::with_capacity(cell.len());
            for &p in cell {
                let Some(vertex) = mesh.vertices.get_mut(p) else {
                    return Err(GenerationError::Invariant(format!("cell {} references point {}", face_idx, p)));
                };
                vertex.alive = true;
                let id = VertexId(p);
                if ids.contains(&id) {
                    return Err(GenerationError::DegenerateMesh(format!(
                        "cell {} repeats a vertex",
                        face_idx
                    )));
                }
                ids.push(id);
            }

            let face = FaceId(face_idx);
            let first = HalfEdgeId(mesh.half_edges.len());
            let n = ids.len();
            for i in 0..n {
                let he = HalfEdgeId(first.0 + i);
                let key = (ids[i], ids[(i + 1) % n]);
                if directed.insert(key, he).is_some() {
                    return Err(GenerationError::DegenerateMesh(format!(
                        "edge {} -> {} shared by two cells",
                        key.0, key.1
                    )));
                }
                mesh.half_edges.push(HalfEdge {
                    origin: ids[i],
                    twin: None,
                    next: HalfEdgeId(first.0 + (i + 1) % n),
                    face,
                    tag: None,
                    alive: true,
                });
                mesh.vertices[ids[i].0].edges.push(he);
            }
            mesh.faces.push(Face { half_edge: first });
        }

        for i in 0..mesh.half_edges.len() {
            let he = HalfEdgeId(i);
            let key = (mesh.destination(he), mesh.half_edges[i].origin);
            mesh.half_edges[i].twin = directed.get(&key).copied();
        }

        Ok(mesh)
    }

    pub fn point(&self, v: VertexId) -> Vec2 {
        self.vertices[v.0].point
    }

    pub fn set_point(&mut self, v: VertexId, point: Vec2) {
        self.vertices[v.0].point = point;
    }

    pub fn origin(&self, he: HalfEdgeId) -> VertexId {
        self.half_edges[he.0].origin
    }

    pub fn destination(&self, he: HalfEdgeId) -> VertexId {
        self.half_edges[self.half_edges[he.0].next.0].origin
    }

    pub fn next(&self, he: HalfEdgeId) -> HalfEdgeId {
        self.half_edges[he.0].next
    }

    pub fn twin(&self, he: HalfEdgeId) -> Option<HalfEdgeId> {
        self.half_edges[he.0].twin
    }

    pub fn face_of(&self, he: HalfEdgeId) -> FaceId {
        self.half_edges[he.0].face
    }

    pub fn tag(&self, he: HalfEdgeId) -> Option<EdgeTag> {
        self.half_edges[he.0].tag
    }

    pub fn prev(&self, he: HalfEdgeId) -> HalfEdgeId {
        let mut cur = he;
        for _ in 0..self.half_edges.len() {
            let next = self.next(cur);
            if next == he {
                return cur;
            }
            cur = next;
        }
        he
    }

    pub fn edge_length(&self, he: HalfEdgeId) -> f32 {
        self.point(self.origin(he)).distance(self.point(self.destination(he)))
    }

    pub fn segment(&self, he: HalfEdgeId) -> (Vec2, Vec2) {
        (self.point(self.origin(he)), self.point(self.destination(he)))
    }

    pub fn alive_half_edges(&self) -> impl Iterator<Item = HalfEdgeId> + '_ {
        self.half_edges
            .iter()
            .enumerate()
            .filter(|(_, he)| he.alive)
            .map(|(i, _)| HalfEdgeId(i))
    }

    pub fn alive_vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.alive)
            .map(|(i, _)| VertexId(i))
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Half-edges around `face`, starting at its anchor.
    pub fn face_cycle(&self, face: FaceId) -> Vec<HalfEdgeId> {
        let start = self.faces[face.0].half_edge;
        let mut cycle = vec![start];
        let mut cur = self.next(start);
        while cur != start && cycle.len() <= self.half_edges.len() {
            cycle.push(cur);
            cur = self.next(cur);
        }
        cycle
    }

    pub fn face_vertices(&self, face: FaceId) -> Vec<VertexId> {
        self.face_cycle(face).into_iter().map(|he| self.origin(he)).collect()
    }

    pub fn face_polygon(&self, face: FaceId) -> Polygon {
        self.face_cycle(face).into_iter().map(|he| self.point(self.origin(he))).collect()
    }

    /// Faces around a vertex, in outgoing-edge order.
    pub fn vertex_faces(&self, v: VertexId) -> Vec<FaceId> {
        let mut faces = Vec::new();
        for &he in &self.vertices[v.0].edges {
            let f = self.face_of(he);
            if !faces.contains(&f) {
                faces.push(f);
            }
        }
        faces
    }

    pub fn vertex_neighbours(&self, v: VertexId) -> Vec<VertexId> {
        let mut result = Vec::new();
        for &he in &self.vertices[v.0].edges {
            let d = self.destination(he);
            if !result.contains(&d) {
                result.push(d);
            }
            // incoming horizon edge has no outgoing twin to find it by
            let incoming = self.prev(he);
            if self.twin(incoming).is_none() {
                let o = self.origin(incoming);
                if !result.contains(&o) {
                    result.push(o);
                }
            }
        }
        result
    }

    /// Faces across the edges of `face`, sorted.
    pub fn face_neighbours(&self, face: FaceId) -> Vec<FaceId> {
        let mut result: Vec<FaceId> = self
            .face_cycle(face)
            .into_iter()
            .filter_map(|he| self.twin(he).map(|t| self.face_of(t)))
            .collect();
        result.sort();
        result.dedup();
        result
    }

    pub fn find_half_edge(&self, a: VertexId, b: VertexId) -> Option<HalfEdgeId> {
        self.vertices[a.0]
            .edges
            .iter()
            .copied()
            .find(|&he| self.destination(he) == b)
    }

    /// Any half-edge between `a` and `b`, in either direction.
    pub fn edge_between(&self, a: VertexId, b: VertexId) -> Option<HalfEdgeId> {
        self.find_half_edge(a, b).or_else(|| self.find_half_edge(b, a))
    }

    pub fn is_horizon_edge(&self, he: HalfEdgeId) -> bool {
        self.twin(he).is_none()
    }

    pub fn is_horizon_vertex(&self, v: VertexId) -> bool {
        self.vertices[v.0]
            .edges
            .iter()
            .any(|&he| self.twin(he).is_none() || self.twin(self.prev(he)).is_none())
    }

    /// Tags both halves of an edge.
    pub fn tag_edge(&mut self, he: HalfEdgeId, tag: Option<EdgeTag>) {
        self.half_edges[he.0].tag = tag;
        if let Some(t) = self.twin(he) {
            self.half_edges[t.0].tag = tag;
        }
    }

    /// Tags every edge along a vertex chain. Missing links are skipped.
    pub fn tag_chain(&mut self, chain: &[VertexId], tag: EdgeTag) {
        for pair in chain.windows(2) {
            if let Some(he) = self.edge_between(pair[0], pair[1]) {
                self.tag_edge(he, Some(tag));
            }
        }
    }

    /// Whether merging the two ends of `he` keeps the mesh a valid subdivision.
    pub fn can_collapse(&self, he: HalfEdgeId) -> bool {
        if !self.half_edges[he.0].alive {
            return false;
        }
        if self.face_cycle(self.face_of(he)).len() <= 3 {
            return false;
        }
        if let Some(t) = self.twin(he) {
            if self.face_cycle(self.face_of(t)).len() <= 3 {
                return false;
            }
        }

        let a = self.origin(he);
        let b = self.destination(he);

        // two horizon vertices joined through the interior would pinch the outline
        if self.twin(he).is_some() && self.is_horizon_vertex(a) && self.is_horizon_vertex(b) {
            return false;
        }

        let na = self.vertex_neighbours(a);
        self.vertex_neighbours(b)
            .iter()
            .all(|n| *n == a || !na.contains(n))
    }

    /// Merges the destination of `he` into its origin, which moves to the midpoint.
    ///
    /// # Returns
    /// The surviving vertex.
    pub fn collapse_edge(&mut self, he: HalfEdgeId) -> Result<VertexId> {
        if !self.can_collapse(he) {
            return Err(GenerationError::Invariant(format!("edge {} cannot be collapsed", he)));
        }

        let a = self.origin(he);
        let b = self.destination(he);
        let twin = self.twin(he);

        let prev_he = self.prev(he);
        let next_he = self.next(he);
        self.half_edges[prev_he.0].next = next_he;
        let face = self.face_of(he);
        self.faces[face.0].half_edge = next_he;
        self.half_edges[he.0].alive = false;

        if let Some(t) = twin {
            let prev_t = self.prev(t);
            let next_t = self.next(t);
            self.half_edges[prev_t.0].next = next_t;
            let tf = self.face_of(t);
            self.faces[tf.0].half_edge = next_t;
            self.half_edges[t.0].alive = false;
        }

        let moved: Vec<HalfEdgeId> = std::mem::take(&mut self.vertices[b.0].edges)
            .into_iter()
            .filter(|&e| Some(e) != twin)
            .collect();
        for &e in &moved {
            self.half_edges[e.0].origin = a;
        }

        let midpoint = (self.point(a) + self.point(b)) * 0.5;
        let vertex_a = &mut self.vertices[a.0];
        vertex_a.edges.retain(|&e| e != he);
        vertex_a.edges.extend(moved);
        vertex_a.point = midpoint;
        self.vertices[b.0].alive = false;

        Ok(a)
    }

    /// Inserts a vertex at `point` on the edge of `he`, splitting its twin too.
    pub fn split_edge(&mut self, he: HalfEdgeId, point: Vec2) -> VertexId {
        let m = VertexId(self.vertices.len());
        self.vertices.push(Vertex { point, edges: Vec::new(), alive: true });

        let tag = self.tag(he);
        let twin = self.twin(he);

        // he: a -> m, n: m -> b
        let n = HalfEdgeId(self.half_edges.len());
        self.half_edges.push(HalfEdge {
            origin: m,
            twin: None,
            next: self.next(he),
            face: self.face_of(he),
            tag,
            alive: true,
        });
        self.half_edges[he.0].next = n;
        self.vertices[m.0].edges.push(n);

        if let Some(t) = twin {
            // t: b -> m, u: m -> a
            let u = HalfEdgeId(self.half_edges.len());
            self.half_edges.push(HalfEdge {
                origin: m,
                twin: Some(he),
                next: self.next(t),
                face: self.face_of(t),
                tag,
                alive: true,
            });
            self.half_edges[t.0].next = u;
            self.half_edges[he.0].twin = Some(u);
            self.half_edges[t.0].twin = Some(n);
            self.half_edges[n.0].twin = Some(t);
            self.vertices[m.0].edges.push(u);
        }

        m
    }

    /// Cuts `face` along a new edge from `a` to `b`.
    ///
    /// The part of the boundary running from `a` to `b` becomes the new face;
    /// the old face keeps the rest.
    pub fn split_face(&mut self, face: FaceId, a: VertexId, b: VertexId) -> Result<FaceId> {
        let cycle = self.face_cycle(face);
        let he_a = cycle.iter().copied().find(|&he| self.origin(he) == a);
        let he_b = cycle.iter().copied().find(|&he| self.origin(he) == b);
        let (Some(he_a), Some(he_b)) = (he_a, he_b) else {
            return Err(GenerationError::Invariant(format!(
                "{} and {} are not both on {}",
                a, b, face
            )));
        };
        if self.destination(he_a) == b || self.destination(he_b) == a {
            return Err(GenerationError::Invariant(format!(
                "{} and {} are already adjacent on {}",
                a, b, face
            )));
        }

        let prev_a = self.prev(he_a);
        let prev_b = self.prev(he_b);
        let new_face = FaceId(self.faces.len());
        let d1 = HalfEdgeId(self.half_edges.len());
        let d2 = HalfEdgeId(d1.0 + 1);

        self.half_edges.push(HalfEdge {
            origin: a,
            twin: Some(d2),
            next: he_b,
            face,
            tag: None,
            alive: true,
        });
        self.half_edges.push(HalfEdge {
            origin: b,
            twin: Some(d1),
            next: he_a,
            face: new_face,
            tag: None,
            alive: true,
        });
        self.half_edges[prev_a.0].next = d1;
        self.half_edges[prev_b.0].next = d2;
        self.vertices[a.0].edges.push(d1);
        self.vertices[b.0].edges.push(d2);

        self.faces[face.0].half_edge = d1;
        self.faces.push(Face { half_edge: d2 });
        for he in self.face_cycle(new_face) {
            self.half_edges[he.0].face = new_face;
        }

        Ok(new_face)
    }

    /// Boundary loops of a set of faces, each as a chain of half-edges that
    /// belong to the set and face outward.
    pub fn circumference(&self, faces: &BTreeSet<FaceId>) -> Vec<Vec<HalfEdgeId>> {
        let is_border = |he: HalfEdgeId| match self.twin(he) {
            None => true,
            Some(t) => !faces.contains(&self.face_of(t)),
        };

        let mut border: BTreeSet<HalfEdgeId> = BTreeSet::new();
        for &f in faces {
            for he in self.face_cycle(f) {
                if is_border(he) {
                    border.insert(he);
                }
            }
        }

        let mut loops = Vec::new();
        let mut visited: BTreeSet<HalfEdgeId> = BTreeSet::new();
        for &start in &border {
            if visited.contains(&start) {
                continue;
            }
            let mut chain = Vec::new();
            let mut cur = start;
            loop {
                if !visited.insert(cur) {
                    break;
                }
                chain.push(cur);

                // rotate around the destination until the next border edge
                let mut candidate = self.next(cur);
                let mut guard = 0;
                while !is_border(candidate) && guard < self.half_edges.len() {
                    match self.twin(candidate) {
                        Some(t) => candidate = self.next(t),
                        None => break,
                    }
                    guard += 1;
                }
                cur = candidate;
                if cur == start {
                    break;
                }
            }
            loops.push(chain);
        }
        loops
    }

    /// The loop of `circumference` enclosing the largest area.
    pub fn outer_circumference(&self, faces: &BTreeSet<FaceId>) -> Vec<HalfEdgeId> {
        self.circumference(faces)
            .into_iter()
            .max_by(|a, b| {
                self.chain_area(a)
                    .partial_cmp(&self.chain_area(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or_default()
    }

    pub fn chain_area(&self, chain: &[HalfEdgeId]) -> f32 {
        let polygon: Polygon = chain.iter().map(|&he| self.point(self.origin(he))).collect();
        polygon_area(&polygon)
    }

    pub fn chain_vertices(&self, chain: &[HalfEdgeId]) -> Vec<VertexId> {
        chain.iter().map(|&he| self.origin(he)).collect()
    }

    /// Checks twin symmetry, closed face cycles and ownership.
    pub fn validate(&self) -> Result<()> {
        for he in self.alive_half_edges() {
            let record = &self.half_edges[he.0];
            if !self.vertices[record.origin.0].alive {
                return Err(GenerationError::Invariant(format!("{} starts at a dead vertex", he)));
            }
            if !self.vertices[record.origin.0].edges.contains(&he) {
                return Err(GenerationError::Invariant(format!("{} missing from its origin", he)));
            }
            if !self.half_edges[record.next.0].alive {
                return Err(GenerationError::Invariant(format!("{} links to a dead edge", he)));
            }
            if self.face_of(record.next) != record.face {
                return Err(GenerationError::Invariant(format!("{} leaves its face", he)));
            }
            if let Some(t) = record.twin {
                if self.twin(t) != Some(he) || self.origin(t) != self.destination(he) {
                    return Err(GenerationError::Invariant(format!("{} has a broken twin", he)));
                }
                if self.face_of(t) == record.face {
                    return Err(GenerationError::Invariant(format!("{} twins inside one face", he)));
                }
            }
        }
        for (i, face) in self.faces.iter().enumerate() {
            let cycle = self.face_cycle(FaceId(i));
            if cycle.len() < 3 || cycle.len() > self.half_edges.len() {
                return Err(GenerationError::Invariant(format!("face {} is not a closed cycle", i)));
            }
            if cycle.iter().any(|&he| self.face_of(he) != FaceId(i) || !self.half_edges[he.0].alive) {
                return Err(GenerationError::Invariant(format!("face {} owns a foreign edge", i)));
            }
            if !self.half_edges[face.half_edge.0].alive {
                return Err(GenerationError::Invariant(format!("face {} anchor is dead", i)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 3x2 grid of unit squares, CCW
    //  8---9--10--11
    //  | 3 | 4 | 5 |
    //  4---5---6---7
    //  | 0 | 1 | 2 |
    //  0---1---2---3
    fn grid() -> PlanarMesh {
        let mut points = Vec::new();
        for y in 0..3 {
            for x in 0..4 {
                points.push(Vec2::new(x as f32, y as f32));
            }
        }
        let mut cells = Vec::new();
        for y in 0..2 {
            for x in 0..3 {
                let a = y * 4 + x;
                cells.push(vec![a, a + 1, a + 5, a + 4]);
            }
        }
        PlanarMesh::from_polygons(&points, &cells).unwrap()
    }

    #[test]
    fn test_twins_and_horizon() {
        let mesh = grid();
        mesh.validate().unwrap();
        let horizon = mesh.alive_half_edges().filter(|&he| mesh.is_horizon_edge(he)).count();
        assert_eq!(horizon, 10);
        assert!(mesh.is_horizon_vertex(VertexId(0)));
        assert!(!mesh.is_horizon_vertex(VertexId(5)));
    }

    #[test]
    fn test_vertex_ids_follow_points() {
        let mesh = grid();
        for (i, v) in mesh.vertices.iter().enumerate() {
            assert_eq!(v.point, Vec2::new((i % 4) as f32, (i / 4) as f32));
        }
        assert_eq!(mesh.face_vertices(FaceId(3)), vec![VertexId(4), VertexId(5), VertexId(9), VertexId(8)]);

        // a point no cell uses keeps its slot but stays dead
        let points = vec![Vec2::ZERO, Vec2::new(9.0, 9.0), Vec2::X, Vec2::Y];
        let mesh = PlanarMesh::from_polygons(&points, &[vec![0, 2, 3]]).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert!(!mesh.vertices[1].alive);
        assert_eq!(mesh.alive_vertices().collect::<Vec<_>>(), vec![VertexId(0), VertexId(2), VertexId(3)]);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_overlapping_cells_rejected() {
        let points = vec![Vec2::ZERO, Vec2::X, Vec2::Y];
        let cells = vec![vec![0, 1, 2], vec![0, 1, 2]];
        assert!(matches!(
            PlanarMesh::from_polygons(&points, &cells),
            Err(GenerationError::DegenerateMesh(_))
        ));
    }

    #[test]
    fn test_neighbours_include_horizon_incoming() {
        let mesh = grid();
        let mut n = mesh.vertex_neighbours(VertexId(0));
        n.sort();
        assert_eq!(n, vec![VertexId(1), VertexId(4)]);
        assert_eq!(mesh.vertex_neighbours(VertexId(5)).len(), 4);
    }

    #[test]
    fn test_circumference_of_pair() {
        let mesh = grid();
        let faces: BTreeSet<FaceId> = [FaceId(0), FaceId(1)].into_iter().collect();
        let loops = mesh.circumference(&faces);
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 6);
        assert!((mesh.chain_area(&loops[0]) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_circumference_of_disjoint_faces() {
        let mesh = grid();
        let faces: BTreeSet<FaceId> = [FaceId(0), FaceId(2)].into_iter().collect();
        assert_eq!(mesh.circumference(&faces).len(), 2);
    }

    #[test]
    fn test_split_edge_keeps_twins() {
        let mut mesh = grid();
        let he = mesh.find_half_edge(VertexId(1), VertexId(5)).unwrap();
        let m = mesh.split_edge(he, Vec2::new(1.0, 0.5));
        mesh.validate().unwrap();
        assert_eq!(mesh.face_cycle(FaceId(0)).len(), 5);
        assert_eq!(mesh.face_cycle(FaceId(1)).len(), 5);
        assert!(mesh.find_half_edge(m, VertexId(5)).is_some());
        assert!(mesh.find_half_edge(VertexId(5), m).is_some());
    }

    #[test]
    fn test_split_face() {
        let mut mesh = grid();
        let new_face = mesh.split_face(FaceId(1), VertexId(1), VertexId(6)).unwrap();
        mesh.validate().unwrap();
        assert_eq!(mesh.face_cycle(FaceId(1)).len(), 3);
        assert_eq!(mesh.face_cycle(new_face).len(), 3);
        assert!(mesh.split_face(FaceId(0), VertexId(0), VertexId(1)).is_err());
    }

    #[test]
    fn test_collapse_interior_edge() {
        // pentagon ring so that faces keep four or more vertices
        let mut mesh = grid();
        let h1 = mesh.find_half_edge(VertexId(1), VertexId(5)).unwrap();
        mesh.split_edge(h1, Vec2::new(1.0, 0.5));
        let h2 = mesh.find_half_edge(VertexId(5), VertexId(9)).unwrap();
        mesh.split_edge(h2, Vec2::new(1.0, 1.5));
        let he = mesh.find_half_edge(VertexId(5), VertexId(6)).unwrap();
        // 5 and 6 share no neighbour, faces 1 and 4 have four vertices
        assert!(mesh.can_collapse(he));
        let kept = mesh.collapse_edge(he).unwrap();
        mesh.validate().unwrap();
        assert_eq!(mesh.point(kept), Vec2::new(1.5, 1.0));
        assert!(!mesh.vertices[6].alive);
    }

    #[test]
    fn test_collapse_refuses_triangles() {
        let mut mesh = grid();
        mesh.split_face(FaceId(1), VertexId(1), VertexId(6)).unwrap();
        let he = mesh.find_half_edge(VertexId(1), VertexId(2)).unwrap();
        assert!(!mesh.can_collapse(he));
        assert!(mesh.collapse_edge(he).is_err());
    }

    #[test]
    fn test_tag_edge_marks_twin() {
        let mut mesh = grid();
        mesh.tag_chain(&[VertexId(4), VertexId(5), VertexId(6)], EdgeTag::Road);
        let back = mesh.find_half_edge(VertexId(6), VertexId(5)).unwrap();
        assert_eq!(mesh.tag(back), Some(EdgeTag::Road));
    }
}
