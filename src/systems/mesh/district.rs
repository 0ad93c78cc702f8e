//! Grouping patches into named districts.
//!
//! Districts are seeded at notable features, grown one patch at a time at a
//! rate that depends on their kind, and never cross from the city to the
//! countryside or from land to water. A district that ends up wrapped around
//! something else is cut back to its seed and regrown.

use std::cell::OnceCell;
use std::collections::BTreeSet;

use glam::Vec2;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::{DISTRICT_FORCE_ROUNDS, DISTRICT_HOLE_RETRIES};
use crate::error::{GenerationError, Result};
use crate::systems::random::Sequencer;
use super::dcel::{FaceId, PlanarMesh, VertexId};
use super::patch::Patch;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DistrictKind {
    Center,
    Castle,
    Docks,
    Bridge,
    Gate,
    Bank,
    Park,
    Sprawl,
    Regular,
    Water,
}

impl DistrictKind {
    /// Chance per round of claiming a neighbour.
    pub fn growth_rate(self) -> f32 {
        match self {
            DistrictKind::Castle | DistrictKind::Bridge | DistrictKind::Gate => 0.1,
            DistrictKind::Center | DistrictKind::Docks => 0.3,
            DistrictKind::Bank | DistrictKind::Park => 0.5,
            DistrictKind::Regular | DistrictKind::Sprawl | DistrictKind::Water => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DistrictKind::Center => "Center",
            DistrictKind::Castle => "Castle",
            DistrictKind::Docks => "Docks",
            DistrictKind::Bridge => "Bridge",
            DistrictKind::Gate => "Gate",
            DistrictKind::Bank => "Riverbank",
            DistrictKind::Park => "Gardens",
            DistrictKind::Sprawl => "Outskirts",
            DistrictKind::Regular => "Quarter",
            DistrictKind::Water => "Waters",
        }
    }

    fn for_patch(patch: &Patch) -> Self {
        match patch.realm() {
            0 => DistrictKind::Regular,
            1 => DistrictKind::Sprawl,
            _ => DistrictKind::Water,
        }
    }
}

/// Where district and settlement names come from.
pub trait NameSource {
    /// `ordinal` counts districts of the same kind, from 0.
    fn district_name(&self, kind: DistrictKind, ordinal: usize) -> String;
    fn city_name(&self, seq: &mut Sequencer) -> String;
}

/// Kind labels with a running number.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainNames;

const PREFIXES: [&str; 12] = [
    "Ash", "Bel", "Corn", "Dun", "Elm", "Fair", "Gran", "Hart", "Iron", "Kings", "Mar", "Thorn",
];
const SUFFIXES: [&str; 10] = [
    "bury", "ford", "ham", "haven", "mouth", "stead", "ton", "wick", "worth", "gate",
];

impl NameSource for PlainNames {
    fn district_name(&self, kind: DistrictKind, ordinal: usize) -> String {
        if ordinal == 0 {
            kind.label().to_string()
        } else {
            format!("{} {}", kind.label(), ordinal + 1)
        }
    }

    fn city_name(&self, seq: &mut Sequencer) -> String {
        let prefix = seq.pick(&PREFIXES).copied().unwrap_or("New");
        let suffix = seq.pick(&SUFFIXES).copied().unwrap_or("ton");
        format!("{prefix}{suffix}")
    }
}

#[derive(Clone, Debug)]
pub struct District {
    pub kind: DistrictKind,
    pub name: String,
    /// Member faces in claim order; the first is the seed.
    pub faces: Vec<FaceId>,
    pub population: f32,
    border: OnceCell<Vec<VertexId>>,
}

impl District {
    pub fn new(kind: DistrictKind, seed: FaceId) -> Self {
        Self {
            kind,
            name: String::new(),
            faces: vec![seed],
            population: 0.0,
            border: OnceCell::new(),
        }
    }

    pub fn seed(&self) -> FaceId {
        self.faces[0]
    }

    pub fn face_set(&self) -> BTreeSet<FaceId> {
        self.faces.iter().copied().collect()
    }

    fn claim(&mut self, face: FaceId) {
        self.faces.push(face);
        self.border = OnceCell::new();
    }

    // back to the seed alone, returns the rest
    fn cut_back(&mut self) -> Vec<FaceId> {
        self.border = OnceCell::new();
        self.faces.split_off(1)
    }

    /// Outer boundary as a vertex chain, computed on first use.
    pub fn border(&self, mesh: &PlanarMesh) -> &[VertexId] {
        self.border
            .get_or_init(|| mesh.chain_vertices(&mesh.outer_circumference(&self.face_set())))
    }

    pub fn centroid(&self, patches: &[Patch]) -> Vec2 {
        let sum: Vec2 = self.faces.iter().map(|f| patches[f.0].centroid()).sum();
        sum / self.faces.len().max(1) as f32
    }

    /// More than one boundary loop, or a loop that touches itself.
    pub fn has_hole(&self, mesh: &PlanarMesh) -> bool {
        let loops = mesh.circumference(&self.face_set());
        if loops.len() != 1 {
            return true;
        }
        let mut seen = BTreeSet::new();
        loops[0].iter().any(|&he| !seen.insert(mesh.origin(he)))
    }
}

/// Splits every patch into districts.
///
/// `seeds` are the feature districts in priority order; a seed on an
/// already claimed patch is dropped. The result is ordered as a
/// nearest-neighbour walk from the centre (or castle) district and named.
pub fn partition(
    mesh: &PlanarMesh,
    patches: &[Patch],
    seeds: &[(FaceId, DistrictKind)],
    names: &dyn NameSource,
    rng: &mut Sequencer,
) -> Result<Vec<District>> {
    let mut owner: Vec<Option<usize>> = vec![None; patches.len()];
    let mut districts: Vec<District> = Vec::new();

    for &(face, kind) in seeds {
        if face.0 < patches.len() && owner[face.0].is_none() {
            owner[face.0] = Some(districts.len());
            districts.push(District::new(kind, face));
        }
    }

    let target = (patches.len() as f32).sqrt().ceil() as usize;
    while districts.len() < target {
        let free: Vec<usize> = (0..patches.len()).filter(|&i| owner[i].is_none()).collect();
        let Some(&i) = rng.pick(&free) else { break };
        owner[i] = Some(districts.len());
        districts.push(District::new(DistrictKind::for_patch(&patches[i]), patches[i].face));
    }

    grow_all(mesh, patches, &mut districts, &mut owner, rng);

    let mut repairs = 0;
    loop {
        let holed = districts.iter().position(|d| d.has_hole(mesh));
        let Some(index) = holed else { break };
        if repairs >= DISTRICT_HOLE_RETRIES {
            return Err(GenerationError::DistrictHole(index, repairs));
        }
        repairs += 1;
        trace!(index, repairs, "district wraps around a hole, regrowing");

        let kept = districts[index].seed();
        let returned = districts[index].cut_back();
        for face in &returned {
            owner[face.0] = None;
        }
        // a second district on the far side stops the ring closing again
        let anchor = patches[kept.0].centroid();
        let far = returned.iter().copied().max_by(|a, b| {
            patches[a.0]
                .centroid()
                .distance(anchor)
                .partial_cmp(&patches[b.0].centroid().distance(anchor))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.cmp(a))
        });
        if let Some(far) = far {
            owner[far.0] = Some(districts.len());
            districts.push(District::new(DistrictKind::for_patch(&patches[far.0]), far));
        }
        grow_all(mesh, patches, &mut districts, &mut owner, rng);
    }

    let mut ordered = order_districts(patches, districts);
    let mut counts = std::collections::BTreeMap::new();
    for district in &mut ordered {
        let ordinal = counts.entry(district.kind.label()).or_insert(0usize);
        district.name = names.district_name(district.kind, *ordinal);
        *ordinal += 1;
    }

    debug!(districts = ordered.len(), repairs, "districts partitioned");
    Ok(ordered)
}

// grows until every patch is owned, planting new districts where growth cannot reach
fn grow_all(
    mesh: &PlanarMesh,
    patches: &[Patch],
    districts: &mut Vec<District>,
    owner: &mut [Option<usize>],
    rng: &mut Sequencer,
) {
    loop {
        grow(mesh, patches, districts, owner, rng);
        let Some(i) = (0..patches.len()).find(|&i| owner[i].is_none()) else {
            return;
        };
        owner[i] = Some(districts.len());
        districts.push(District::new(DistrictKind::for_patch(&patches[i]), patches[i].face));
    }
}

fn grow(
    mesh: &PlanarMesh,
    patches: &[Patch],
    districts: &mut [District],
    owner: &mut [Option<usize>],
    rng: &mut Sequencer,
) {
    let mut round = 0;
    loop {
        let mut reachable = false;
        for d in 0..districts.len() {
            let realm = patches[districts[d].seed().0].realm();
            let mut candidates: Vec<FaceId> = districts[d]
                .faces
                .iter()
                .flat_map(|&f| mesh.face_neighbours(f))
                .filter(|n| n.0 < patches.len() && owner[n.0].is_none() && patches[n.0].realm() == realm)
                .collect();
            candidates.sort();
            candidates.dedup();
            if candidates.is_empty() {
                continue;
            }
            reachable = true;

            let forced = round >= DISTRICT_FORCE_ROUNDS;
            if forced || rng.chance(districts[d].kind.growth_rate()) {
                if let Some(&face) = rng.pick(&candidates) {
                    owner[face.0] = Some(d);
                    districts[d].claim(face);
                }
            }
        }
        if !reachable {
            return;
        }
        round += 1;
    }
}

fn order_districts(patches: &[Patch], districts: Vec<District>) -> Vec<District> {
    if districts.is_empty() {
        return districts;
    }
    let start = districts
        .iter()
        .position(|d| d.kind == DistrictKind::Center)
        .or_else(|| districts.iter().position(|d| d.kind == DistrictKind::Castle))
        .unwrap_or(0);

    let centroids: Vec<Vec2> = districts.iter().map(|d| d.centroid(patches)).collect();
    let mut order = vec![start];
    let mut left: Vec<usize> = (0..districts.len()).filter(|&i| i != start).collect();
    while !left.is_empty() {
        let last = centroids[order[order.len() - 1]];
        let k = (0..left.len())
            .min_by(|&a, &b| {
                let (da, db) = (centroids[left[a]].distance(last), centroids[left[b]].distance(last));
                da.partial_cmp(&db)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(left[a].cmp(&left[b]))
            })
            .unwrap_or(0);
        order.push(left.remove(k));
    }

    let mut slots: Vec<Option<District>> = districts.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 5x5 grid of 10-unit squares, the middle 3x3 is the city
    fn setup() -> (PlanarMesh, Vec<Patch>) {
        let mut points = Vec::new();
        for y in 0..6 {
            for x in 0..6 {
                points.push(Vec2::new(x as f32 * 10.0 - 25.0, y as f32 * 10.0 - 25.0));
            }
        }
        let mut cells = Vec::new();
        for y in 0..5 {
            for x in 0..5 {
                let a = y * 6 + x;
                cells.push(vec![a, a + 1, a + 7, a + 6]);
            }
        }
        let mesh = PlanarMesh::from_polygons(&points, &cells).unwrap();
        let patches = (0..mesh.face_count())
            .map(|i| {
                let mut p = Patch::new(FaceId(i), mesh.face_polygon(FaceId(i)), i as u32 + 1);
                let (x, y) = (i % 5, i / 5);
                p.within_city = (1..4).contains(&x) && (1..4).contains(&y);
                p
            })
            .collect();
        (mesh, patches)
    }

    #[test]
    fn test_every_patch_in_exactly_one_district() {
        let (mesh, patches) = setup();
        let seeds = [(FaceId(12), DistrictKind::Center)];
        let districts = partition(&mesh, &patches, &seeds, &PlainNames, &mut Sequencer::new(21)).unwrap();
        let mut seen = BTreeSet::new();
        for d in &districts {
            for f in &d.faces {
                assert!(seen.insert(*f), "{} claimed twice", f);
            }
        }
        assert_eq!(seen.len(), patches.len());
        assert_eq!(districts[0].kind, DistrictKind::Center);
        assert_eq!(districts[0].name, "Center");
    }

    #[test]
    fn test_districts_stay_in_their_realm_and_have_no_holes() {
        let (mesh, patches) = setup();
        let seeds = [(FaceId(12), DistrictKind::Center), (FaceId(0), DistrictKind::Sprawl)];
        for seed in 1..20 {
            let districts = partition(&mesh, &patches, &seeds, &PlainNames, &mut Sequencer::new(seed)).unwrap();
            for d in &districts {
                let realm = patches[d.seed().0].realm();
                assert!(d.faces.iter().all(|f| patches[f.0].realm() == realm));
                assert!(!d.has_hole(&mesh));
            }
        }
    }

    #[test]
    fn test_ring_is_a_hole() {
        let (mesh, _) = setup();
        let mut ring = District::new(DistrictKind::Sprawl, FaceId(0));
        for f in [1, 2, 3, 4, 5, 9, 10, 14, 15, 19, 20, 21, 22, 23, 24] {
            ring.claim(FaceId(f));
        }
        assert!(ring.has_hole(&mesh));
        let block = District::new(DistrictKind::Regular, FaceId(6));
        assert!(!block.has_hole(&mesh));
        assert_eq!(block.border(&mesh).len(), 4);
    }

    #[test]
    fn test_plain_names_number_repeats() {
        assert_eq!(PlainNames.district_name(DistrictKind::Gate, 0), "Gate");
        assert_eq!(PlainNames.district_name(DistrictKind::Gate, 1), "Gate 2");
        let name = PlainNames.city_name(&mut Sequencer::new(4));
        assert!(!name.is_empty());
    }
}
