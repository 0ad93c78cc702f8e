//! River and canal routing.
//!
//! A coastal settlement gets a delta river running inland from a shore
//! vertex; an inland one gets a river that enters at the horizon, passes the
//! centre and leaves on the far side. Either way the course follows mesh
//! edges, so it can only meet a wall or a road at a shared vertex.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;
use tracing::{debug, trace, warn};

use crate::config::{MAX_RIVER_CANDIDATES, RIVER_ALIGNMENT, RURAL_WIDTH_FACTOR};
use crate::error::{GenerationError, Result};
use crate::systems::random::Sequencer;
use super::dcel::{EdgeTag, FaceId, PlanarMesh, VertexId};
use super::topology::Topology;
use super::wall::WallKind;

/// Everything the router needs to know about the settlement so far.
pub struct RiverContext<'a> {
    pub land: &'a BTreeSet<FaceId>,
    pub city: &'a BTreeSet<FaceId>,
    /// Vertices between land and water.
    pub shore: &'a BTreeSet<VertexId>,
    /// Gates and citadel corners.
    pub excluded: &'a BTreeSet<VertexId>,
    pub roads: &'a [Vec<VertexId>],
    pub walls: &'a [(WallKind, Vec<VertexId>)],
    pub inner_count: usize,
}

#[derive(Clone, Debug)]
pub struct Canal {
    pub course: Vec<VertexId>,
    pub width: f32,
    /// Runs entirely outside the city.
    pub rural: bool,
    /// Course vertex on a road, mapped to the road it carries; `None` is a ford.
    pub bridges: BTreeMap<VertexId, Option<usize>>,
    /// Course vertex on a wall chain.
    pub gates: BTreeMap<VertexId, WallKind>,
}

impl Canal {
    pub fn route(mesh: &PlanarMesh, ctx: &RiverContext, coastal: bool, rng: &mut Sequencer) -> Result<Self> {
        let mut topology = Topology::build(
            mesh,
            ctx.land.iter().copied(),
            &[EdgeTag::Coast, EdgeTag::Wall, EdgeTag::Road, EdgeTag::Canal],
        );
        topology.exclude_vertices(ctx.excluded.iter().copied());

        let required = land_boundary(mesh, ctx.land) / 5.0;
        let candidates = if coastal && !ctx.shore.is_empty() {
            delta_courses(mesh, ctx, &mut topology, required)
        } else {
            topology.exclude_vertices(ctx.shore.iter().copied());
            regular_courses(mesh, ctx, &topology, rng)
        };

        let tried = candidates.len();
        let mut fallback = None;
        let mut chosen = None;
        for course in candidates {
            if !validate(mesh, ctx, &topology, &course, required) {
                continue;
            }
            if crosses_road(ctx, &course) {
                chosen = Some(course);
                break;
            }
            trace!(len = course.len(), "course without a road crossing kept as fallback");
            fallback.get_or_insert(course);
        }
        let Some(course) = chosen.or(fallback) else {
            return Err(GenerationError::NoRiverCourse(tried));
        };

        let interior = &course[1..course.len() - 1];
        let rural = !interior
            .iter()
            .any(|&v| mesh.vertex_faces(v).iter().any(|f| ctx.city.contains(f)));
        let mut width = (3.0 + ctx.inner_count as f32 / 5.0) * (0.8 + 0.4 * rng.float());
        if rural {
            width *= RURAL_WIDTH_FACTOR;
        }

        let bridges = find_bridges(mesh, ctx, &course, rural, rng);
        let mut gates = BTreeMap::new();
        for &v in &course {
            if let Some((kind, _)) = ctx.walls.iter().find(|(_, chain)| chain.contains(&v)) {
                gates.insert(v, *kind);
            }
        }

        debug!(
            vertices = course.len(),
            width,
            rural,
            bridges = bridges.len(),
            coastal,
            "river routed"
        );
        Ok(Self { course, width, rural, bridges, gates })
    }

    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.course.contains(&v)
    }

    pub fn contains_edge(&self, a: VertexId, b: VertexId) -> bool {
        self.course
            .windows(2)
            .any(|pair| (pair[0] == a && pair[1] == b) || (pair[0] == b && pair[1] == a))
    }

    pub fn tag(&self, mesh: &mut PlanarMesh) {
        mesh.tag_chain(&self.course, EdgeTag::Canal);
    }

    pub fn polyline(&self, mesh: &PlanarMesh) -> Vec<Vec2> {
        self.course.iter().map(|&v| mesh.point(v)).collect()
    }

    pub fn length(&self, mesh: &PlanarMesh) -> f32 {
        self.polyline(mesh).windows(2).map(|p| p[0].distance(p[1])).sum()
    }
}

// horizon plus shore, the outline of all land
fn land_boundary(mesh: &PlanarMesh, land: &BTreeSet<FaceId>) -> f32 {
    mesh.circumference(land)
        .iter()
        .flatten()
        .map(|&he| mesh.edge_length(he))
        .sum()
}

fn land_faces_at(mesh: &PlanarMesh, ctx: &RiverContext, v: VertexId) -> usize {
    mesh.vertex_faces(v).iter().filter(|f| ctx.land.contains(f)).count()
}

fn delta_courses(
    mesh: &PlanarMesh,
    ctx: &RiverContext,
    topology: &mut Topology,
    required: f32,
) -> Vec<Vec<VertexId>> {
    let mut mouths: Vec<VertexId> = ctx
        .shore
        .iter()
        .copied()
        .filter(|&v| land_faces_at(mesh, ctx, v) > 1 && !ctx.excluded.contains(&v))
        .collect();
    mouths.sort_by(|&a, &b| {
        mesh.point(a)
            .length()
            .partial_cmp(&mesh.point(b).length())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    // only the mouth itself may touch the shore
    topology.exclude_vertices(ctx.shore.iter().copied());

    let inland: Vec<VertexId> = topology
        .vertices()
        .filter(|v| !ctx.shore.contains(v) && !topology.is_excluded(*v) && !mesh.is_horizon_vertex(*v))
        .collect();

    let mut courses = Vec::new();
    for &mouth in mouths.iter().take(MAX_RIVER_CANDIDATES) {
        let origin = mesh.point(mouth);
        let normal = shore_normal(mesh, ctx, mouth);
        let target = inland
            .iter()
            .copied()
            .filter(|&v| {
                let offset = mesh.point(v) - origin;
                let distance = offset.length();
                distance >= required && offset.dot(normal) / distance >= RIVER_ALIGNMENT
            })
            .min_by(|&a, &b| {
                mesh.point(a)
                    .distance(origin)
                    .partial_cmp(&mesh.point(b).distance(origin))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });
        let Some(target) = target else {
            trace!(%mouth, "no inland target aligned with the shore");
            continue;
        };
        if let Some(path) = topology.shortest_path(mouth, target) {
            courses.push(path);
        }
    }
    courses
}

// points from the water towards the land around `v`
fn shore_normal(mesh: &PlanarMesh, ctx: &RiverContext, v: VertexId) -> Vec2 {
    let p = mesh.point(v);
    let water: Vec<Vec2> = mesh
        .vertex_faces(v)
        .into_iter()
        .filter(|f| !ctx.land.contains(f))
        .map(|f| {
            let poly = mesh.face_polygon(f);
            poly.iter().copied().sum::<Vec2>() / poly.len().max(1) as f32
        })
        .collect();
    let away = if water.is_empty() {
        -p
    } else {
        water.iter().map(|&c| p - c).sum::<Vec2>()
    };
    away.try_normalize().unwrap_or(-p.normalize_or_zero())
}

fn regular_courses(
    mesh: &PlanarMesh,
    ctx: &RiverContext,
    topology: &Topology,
    rng: &mut Sequencer,
) -> Vec<Vec<VertexId>> {
    let mut remaining: Vec<VertexId> = topology
        .vertices()
        .filter(|&v| mesh.is_horizon_vertex(v) && land_faces_at(mesh, ctx, v) > 1 && !topology.is_excluded(v))
        .collect();

    let center = topology
        .vertices()
        .filter(|&v| !topology.is_excluded(v) && mesh.vertex_faces(v).iter().any(|f| ctx.city.contains(f)))
        .min_by(|&a, &b| {
            mesh.point(a)
                .length()
                .partial_cmp(&mesh.point(b).length())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        })
        .or_else(|| topology.nearest_vertex(Vec2::ZERO));
    let Some(center) = center else {
        return Vec::new();
    };

    let mut courses = Vec::new();
    while remaining.len() > 1 && courses.len() < MAX_RIVER_CANDIDATES {
        let k = remaining[rng.index(remaining.len())];
        let kp = mesh.point(k);
        let opposite = remaining
            .iter()
            .copied()
            .filter(|&h| h != k)
            .min_by(|&a, &b| {
                kp.dot(mesh.point(a).normalize_or_zero())
                    .partial_cmp(&kp.dot(mesh.point(b).normalize_or_zero()))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });
        let Some(n) = opposite else { break };
        remaining.retain(|&v| v != k && v != n);

        let (Some(inbound), Some(outbound)) =
            (topology.shortest_path(n, center), topology.shortest_path(center, k))
        else {
            trace!(%k, %n, "horizon pair not connected through the centre");
            continue;
        };

        if let Some(course) = join_legs(&inbound, &outbound) {
            if course.len() >= 3 {
                courses.push(course);
            }
        }
    }
    courses
}

// cut at the first inbound vertex the outbound leg also visits
fn join_legs(inbound: &[VertexId], outbound: &[VertexId]) -> Option<Vec<VertexId>> {
    let (j, i) = inbound
        .iter()
        .enumerate()
        .find_map(|(j, v)| outbound.iter().position(|u| u == v).map(|i| (j, i)))?;
    let mut course = inbound[..=j].to_vec();
    course.extend_from_slice(&outbound[i + 1..]);
    Some(course)
}

fn validate(mesh: &PlanarMesh, ctx: &RiverContext, topology: &Topology, course: &[VertexId], required: f32) -> bool {
    if course.len() < 3 {
        return false;
    }
    let unique: BTreeSet<VertexId> = course.iter().copied().collect();
    if unique.len() != course.len() {
        trace!("course revisits a vertex");
        return false;
    }
    if topology.path_length(course) < required {
        trace!(length = topology.path_length(course), required, "course too short");
        return false;
    }
    if course[1..course.len() - 1].iter().any(|v| ctx.shore.contains(v)) {
        trace!("course touches the shore midway");
        return false;
    }
    // walls and roads may only be met at a vertex
    let runs_along = course.windows(2).any(|pair| {
        mesh.edge_between(pair[0], pair[1])
            .and_then(|he| mesh.tag(he))
            .is_some_and(|t| matches!(t, EdgeTag::Wall | EdgeTag::Road))
    });
    !runs_along
}

fn crosses_road(ctx: &RiverContext, course: &[VertexId]) -> bool {
    course.iter().any(|v| ctx.roads.iter().any(|road| road.contains(v)))
}

// keeps the bridge nearest the centre, thins the rest
fn find_bridges(
    mesh: &PlanarMesh,
    ctx: &RiverContext,
    course: &[VertexId],
    rural: bool,
    rng: &mut Sequencer,
) -> BTreeMap<VertexId, Option<usize>> {
    let mut candidates: Vec<(VertexId, usize)> = course
        .iter()
        .filter_map(|&v| ctx.roads.iter().position(|road| road.contains(&v)).map(|r| (v, r)))
        .collect();

    let mut bridges = BTreeMap::new();
    if rural {
        bridges.extend(candidates.into_iter().map(|(v, r)| (v, Some(r))));
        return bridges;
    }

    candidates.sort_by(|a, b| {
        mesh.point(a.0)
            .length()
            .partial_cmp(&mesh.point(b.0).length())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    let mut kept = 0usize;
    for (k, (v, road)) in candidates.into_iter().enumerate() {
        if k == 0 || rng.chance(1.0 / (1.0 + kept as f32)) {
            kept += 1;
            bridges.insert(v, Some(road));
        } else {
            warn!(vertex = %v, "river crossing left as a ford");
            bridges.insert(v, None);
        }
    }
    bridges
}

#[cfg(test)]
mod tests {
    use super::*;

    // 6x6 grid of 10-unit squares centred on the origin
    fn grid() -> PlanarMesh {
        let mut points = Vec::new();
        for y in 0..7 {
            for x in 0..7 {
                points.push(Vec2::new(x as f32 * 10.0 - 30.0, y as f32 * 10.0 - 30.0));
            }
        }
        let mut cells = Vec::new();
        for y in 0..6 {
            for x in 0..6 {
                let a = y * 7 + x;
                cells.push(vec![a, a + 1, a + 8, a + 7]);
            }
        }
        PlanarMesh::from_polygons(&points, &cells).unwrap()
    }

    fn faces(ids: impl IntoIterator<Item = usize>) -> BTreeSet<FaceId> {
        ids.into_iter().map(FaceId).collect()
    }

    #[test]
    fn test_inland_river_crosses_the_map() {
        let mesh = grid();
        let land = faces(0..36);
        let city = faces([14, 15, 20, 21]);
        // a street through the centre, east to west
        let road: Vec<VertexId> = (21..28).map(VertexId).collect();
        let roads = vec![road];
        let empty = BTreeSet::new();
        let ctx = RiverContext {
            land: &land,
            city: &city,
            shore: &empty,
            excluded: &empty,
            roads: &roads,
            walls: &[],
            inner_count: 4,
        };
        let mut rng = Sequencer::new(17);
        let canal = Canal::route(&mesh, &ctx, false, &mut rng).unwrap();

        let unique: BTreeSet<_> = canal.course.iter().collect();
        assert_eq!(unique.len(), canal.course.len());
        assert!(mesh.is_horizon_vertex(canal.course[0]));
        assert!(mesh.is_horizon_vertex(*canal.course.last().unwrap()));
        assert!(!canal.rural);
        assert!(!canal.bridges.is_empty());
        // the nearest crossing always gets a bridge
        assert!(canal.bridges.values().any(|b| b.is_some()));
        for pair in canal.course.windows(2) {
            assert!(mesh.edge_between(pair[0], pair[1]).is_some());
        }
    }

    #[test]
    fn test_rural_river_is_wider() {
        let mesh = grid();
        let land = faces(0..36);
        let city = BTreeSet::new();
        let empty = BTreeSet::new();
        let ctx = RiverContext {
            land: &land,
            city: &city,
            shore: &empty,
            excluded: &empty,
            roads: &[],
            walls: &[],
            inner_count: 0,
        };
        let canal = Canal::route(&mesh, &ctx, false, &mut Sequencer::new(3)).unwrap();
        assert!(canal.rural);
        assert!(canal.width >= 3.0 * 0.8 * RURAL_WIDTH_FACTOR - 1e-4);
    }

    #[test]
    fn test_delta_runs_inland_from_shore() {
        let mesh = grid();
        // the top row is sea
        let land = faces(0..30);
        let city = faces([14, 15]);
        let shore: BTreeSet<VertexId> = (35..42).map(VertexId).collect();
        let empty = BTreeSet::new();
        let ctx = RiverContext {
            land: &land,
            city: &city,
            shore: &shore,
            excluded: &empty,
            roads: &[],
            walls: &[],
            inner_count: 2,
        };
        let canal = Canal::route(&mesh, &ctx, true, &mut Sequencer::new(5)).unwrap();
        assert!(shore.contains(&canal.course[0]));
        assert!(canal.course[1..].iter().all(|v| !shore.contains(v)));
    }

    #[test]
    fn test_legs_join_where_they_first_meet() {
        let ids = |v: &[usize]| v.iter().copied().map(VertexId).collect::<Vec<_>>();
        // both legs run up and down the same column below the centre
        let inbound = ids(&[1, 2, 3, 10, 17, 24]);
        let outbound = ids(&[24, 17, 10, 3, 4, 5]);
        assert_eq!(join_legs(&inbound, &outbound).unwrap(), ids(&[1, 2, 3, 4, 5]));

        // legs that only share the centre pass straight through it
        let inbound = ids(&[1, 8, 15, 22, 23, 24]);
        let outbound = ids(&[24, 25, 26, 19, 12, 5]);
        assert_eq!(join_legs(&inbound, &outbound).unwrap(), ids(&[1, 8, 15, 22, 23, 24, 25, 26, 19, 12, 5]));
    }

    #[test]
    fn test_same_side_horizon_pair_never_doubles_back() {
        let mesh = grid();
        let land = faces(0..36);
        let city = faces([14, 15, 20, 21]);
        // only the bottom edge is left open
        let excluded: BTreeSet<VertexId> = (0..49)
            .filter(|i| i % 7 == 0 || i % 7 == 6 || *i >= 42)
            .map(VertexId)
            .collect();
        let empty = BTreeSet::new();
        let ctx = RiverContext {
            land: &land,
            city: &city,
            shore: &empty,
            excluded: &excluded,
            roads: &[],
            walls: &[],
            inner_count: 4,
        };
        let mut topology = Topology::build(&mesh, land.iter().copied(), &[]);
        topology.exclude_vertices(excluded.iter().copied());

        for seed in 0..8 {
            let courses = regular_courses(&mesh, &ctx, &topology, &mut Sequencer::new(seed));
            assert!(!courses.is_empty());
            for course in &courses {
                let unique: BTreeSet<_> = course.iter().collect();
                assert_eq!(unique.len(), course.len(), "{course:?} revisits a vertex");
                assert!(course[0].0 < 7 && course[course.len() - 1].0 < 7);
            }
        }
    }

    #[test]
    fn test_excluded_everything_fails() {
        let mesh = grid();
        let land = faces(0..36);
        let city = BTreeSet::new();
        let all: BTreeSet<VertexId> = (0..49).map(VertexId).collect();
        let empty = BTreeSet::new();
        let ctx = RiverContext {
            land: &land,
            city: &city,
            shore: &empty,
            excluded: &all,
            roads: &[],
            walls: &[],
            inner_count: 0,
        };
        let result = Canal::route(&mesh, &ctx, false, &mut Sequencer::new(5));
        assert!(matches!(result, Err(GenerationError::NoRiverCourse(_))));
    }
}
