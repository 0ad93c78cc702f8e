//! Routing graph over mesh edges.
//!
//! Streets, outer roads and rivers each build their own graph from a subset
//! of faces, drop the edges carrying a skipped tag, and exclude the vertices
//! the route must not pass through. The ends of a route are always allowed,
//! so a street can start at a gate that is closed to every other street.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use glam::Vec2;

use super::dcel::{EdgeTag, FaceId, PlanarMesh, VertexId};

/// Node in the A* open set
#[derive(Debug, Clone, Copy)]
struct PathNode {
    vertex: VertexId,
    f_cost: f32, // g_cost + heuristic
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PathNode {}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap, lower id first on ties
        other
            .f_cost
            .partial_cmp(&self.f_cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, Default)]
pub struct Topology {
    adjacency: BTreeMap<VertexId, Vec<VertexId>>,
    points: HashMap<VertexId, Vec2>,
    excluded: BTreeSet<VertexId>,
    excluded_edges: BTreeSet<(VertexId, VertexId)>,
}

impl Topology {
    /// Graph over the edges of `faces`, minus edges tagged with any of `skip`.
    pub fn build(mesh: &PlanarMesh, faces: impl IntoIterator<Item = FaceId>, skip: &[EdgeTag]) -> Self {
        let mut topology = Self::default();
        for face in faces {
            for he in mesh.face_cycle(face) {
                if mesh.tag(he).is_some_and(|t| skip.contains(&t)) {
                    continue;
                }
                let a = mesh.origin(he);
                let b = mesh.destination(he);
                topology.points.insert(a, mesh.point(a));
                topology.points.insert(b, mesh.point(b));
                topology.link(a, b);
                topology.link(b, a);
            }
        }
        topology
    }

    fn link(&mut self, a: VertexId, b: VertexId) {
        let list = self.adjacency.entry(a).or_default();
        if !list.contains(&b) {
            list.push(b);
            list.sort();
        }
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.adjacency.contains_key(&v)
    }

    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn exclude_vertex(&mut self, v: VertexId) {
        self.excluded.insert(v);
    }

    pub fn exclude_vertices(&mut self, vertices: impl IntoIterator<Item = VertexId>) {
        self.excluded.extend(vertices);
    }

    /// Closes the edge between `a` and `b` in both directions.
    pub fn exclude_edge(&mut self, a: VertexId, b: VertexId) {
        self.excluded_edges.insert((a.min(b), a.max(b)));
    }

    pub fn is_excluded(&self, v: VertexId) -> bool {
        self.excluded.contains(&v)
    }

    fn passable(&self, a: VertexId, b: VertexId) -> bool {
        !self.excluded_edges.contains(&(a.min(b), a.max(b)))
    }

    fn point(&self, v: VertexId) -> Vec2 {
        self.points.get(&v).copied().unwrap_or(Vec2::ZERO)
    }

    /// Graph vertex closest to `point`, excluded ones skipped.
    pub fn nearest_vertex(&self, point: Vec2) -> Option<VertexId> {
        self.adjacency
            .keys()
            .copied()
            .filter(|v| !self.excluded.contains(v))
            .min_by(|&a, &b| {
                self.point(a)
                    .distance(point)
                    .partial_cmp(&self.point(b).distance(point))
                    .unwrap_or(Ordering::Equal)
                    .then(a.cmp(&b))
            })
    }

    /// Find path using A* algorithm
    ///
    /// Returns None if no path exists.
    pub fn shortest_path(&self, start: VertexId, goal: VertexId) -> Option<Vec<VertexId>> {
        if !self.contains(start) || !self.contains(goal) {
            return None;
        }
        if start == goal {
            return Some(vec![start]);
        }

        let goal_point = self.point(goal);
        let mut open_set = BinaryHeap::new();
        let mut came_from: HashMap<VertexId, VertexId> = HashMap::new();
        let mut g_scores: HashMap<VertexId, f32> = HashMap::new();
        let mut closed: BTreeSet<VertexId> = BTreeSet::new();

        g_scores.insert(start, 0.0);
        open_set.push(PathNode {
            vertex: start,
            f_cost: self.point(start).distance(goal_point),
        });

        while let Some(current) = open_set.pop() {
            if current.vertex == goal {
                return Some(reconstruct_path(&came_from, goal));
            }
            if !closed.insert(current.vertex) {
                continue;
            }

            let current_g = *g_scores.get(&current.vertex).unwrap_or(&f32::INFINITY);
            let Some(neighbours) = self.adjacency.get(&current.vertex) else {
                continue;
            };

            for &neighbour in neighbours {
                if neighbour != goal && self.excluded.contains(&neighbour) {
                    continue;
                }
                if !self.passable(current.vertex, neighbour) || closed.contains(&neighbour) {
                    continue;
                }

                let tentative_g = current_g + self.point(current.vertex).distance(self.point(neighbour));
                let neighbour_g = *g_scores.get(&neighbour).unwrap_or(&f32::INFINITY);

                if tentative_g < neighbour_g {
                    came_from.insert(neighbour, current.vertex);
                    g_scores.insert(neighbour, tentative_g);
                    open_set.push(PathNode {
                        vertex: neighbour,
                        f_cost: tentative_g + self.point(neighbour).distance(goal_point),
                    });
                }
            }
        }

        None // No path found
    }

    pub fn path_length(&self, path: &[VertexId]) -> f32 {
        path.windows(2)
            .map(|pair| self.point(pair[0]).distance(self.point(pair[1])))
            .sum()
    }
}

/// Reconstruct path from came_from map
fn reconstruct_path(came_from: &HashMap<VertexId, VertexId>, mut current: VertexId) -> Vec<VertexId> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    // 3x3 grid of unit squares
    fn grid() -> PlanarMesh {
        let mut points = Vec::new();
        for y in 0..4 {
            for x in 0..4 {
                points.push(Vec2::new(x as f32, y as f32));
            }
        }
        let mut cells = Vec::new();
        for y in 0..3 {
            for x in 0..3 {
                let a = y * 4 + x;
                cells.push(vec![a, a + 1, a + 5, a + 4]);
            }
        }
        PlanarMesh::from_polygons(&points, &cells).unwrap()
    }

    fn all_faces(mesh: &PlanarMesh) -> Vec<FaceId> {
        (0..mesh.face_count()).map(FaceId).collect()
    }

    #[test]
    fn test_straight_path_along_bottom() {
        let mesh = grid();
        let topology = Topology::build(&mesh, all_faces(&mesh), &[]);
        let path = topology.shortest_path(VertexId(0), VertexId(3)).unwrap();
        assert_eq!(path, vec![VertexId(0), VertexId(1), VertexId(2), VertexId(3)]);
        assert!((topology.path_length(&path) - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_exclusion_forces_detour() {
        let mesh = grid();
        let mut topology = Topology::build(&mesh, all_faces(&mesh), &[]);
        topology.exclude_vertex(VertexId(1));
        topology.exclude_vertex(VertexId(2));
        let path = topology.shortest_path(VertexId(0), VertexId(3)).unwrap();
        assert!(!path.contains(&VertexId(1)));
        assert!(!path.contains(&VertexId(2)));
        assert!((topology.path_length(&path) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_excluded_edge_is_closed_both_ways() {
        let mesh = grid();
        let mut topology = Topology::build(&mesh, all_faces(&mesh), &[]);
        topology.exclude_edge(VertexId(2), VertexId(1));
        let path = topology.shortest_path(VertexId(1), VertexId(2)).unwrap();
        assert_eq!(path.len(), 4);
        assert!(topology.shortest_path(VertexId(0), VertexId(1)).is_some());
    }

    #[test]
    fn test_disconnected_returns_none() {
        let mesh = grid();
        let mut topology = Topology::build(&mesh, all_faces(&mesh), &[]);
        // wall off the left column
        for v in [1, 5, 9, 13] {
            topology.exclude_vertex(VertexId(v));
        }
        assert!(topology.shortest_path(VertexId(0), VertexId(3)).is_none());
    }

    #[test]
    fn test_excluded_endpoints_still_reachable() {
        let mesh = grid();
        let mut topology = Topology::build(&mesh, all_faces(&mesh), &[]);
        topology.exclude_vertex(VertexId(0));
        topology.exclude_vertex(VertexId(15));
        assert!(topology.shortest_path(VertexId(0), VertexId(15)).is_some());
        assert_ne!(topology.nearest_vertex(Vec2::ZERO), Some(VertexId(0)));
    }

    #[test]
    fn test_tagged_edges_are_skipped() {
        let mut mesh = grid();
        let he = mesh.find_half_edge(VertexId(1), VertexId(2)).unwrap();
        mesh.tag_edge(he, Some(EdgeTag::Wall));
        let topology = Topology::build(&mesh, all_faces(&mesh), &[EdgeTag::Wall]);
        let path = topology.shortest_path(VertexId(1), VertexId(2)).unwrap();
        assert!(path.len() > 2);
    }

    #[test]
    fn test_ties_break_deterministically() {
        let mesh = grid();
        let topology = Topology::build(&mesh, all_faces(&mesh), &[]);
        let a = topology.shortest_path(VertexId(0), VertexId(15)).unwrap();
        let b = topology.shortest_path(VertexId(0), VertexId(15)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 7);
    }
}
