// flattens a generated city into plain point lists
// and writes it out as json

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use glam::Vec2;
use serde::Serialize;

use crate::config::{Blueprint, EXPORT_SCALE};
use crate::error::Result;
use crate::systems::mesh::Polygon;
use crate::systems::mesh::city::{City, LandmarkKind, RoadKind, Summary};
use crate::systems::mesh::dcel::{PlanarMesh, VertexId};
use crate::systems::mesh::district::DistrictKind;
use crate::systems::mesh::wall::{CurtainWall, WallKind};
use crate::systems::mesh::ward::{FeatureKind, Ward};

pub type Point = [f32; 2];

fn point(p: Vec2) -> Point {
    [p.x, p.y]
}

fn points(polygon: &Polygon) -> Vec<Point> {
    polygon.iter().copied().map(point).collect()
}

fn chain(mesh: &PlanarMesh, vertices: &[VertexId]) -> Vec<Point> {
    vertices.iter().map(|&v| point(mesh.point(v))).collect()
}

#[derive(Debug, Serialize)]
pub struct FeatureRecord {
    pub kind: FeatureKind,
    pub shape: Vec<Point>,
}

#[derive(Debug, Serialize)]
pub struct PatchRecord {
    pub id: usize,
    pub ward: Ward,
    pub district: Option<usize>,
    pub water: bool,
    pub within_city: bool,
    pub within_walls: bool,
    pub shape: Vec<Point>,
    pub blocks: Vec<Vec<Point>>,
    pub lots: Vec<Vec<Point>>,
    pub buildings: Vec<Vec<Point>>,
    pub alleys: Vec<[Point; 2]>,
    pub features: Vec<FeatureRecord>,
    pub trees: Vec<Point>,
}

#[derive(Debug, Serialize)]
pub struct DistrictRecord {
    pub name: String,
    pub kind: DistrictKind,
    pub patches: Vec<usize>,
    pub border: Vec<Point>,
    pub population: f32,
}

#[derive(Debug, Serialize)]
pub struct WallRecord {
    pub kind: WallKind,
    pub chain: Vec<Point>,
    pub segments: Vec<bool>,
    pub gates: Vec<Point>,
    pub towers: Vec<Point>,
    pub watergates: Vec<Point>,
}

#[derive(Debug, Serialize)]
pub struct RoadRecord {
    pub kind: RoadKind,
    pub points: Vec<Point>,
}

#[derive(Debug, Serialize)]
pub struct CanalRecord {
    pub width: f32,
    pub rural: bool,
    pub course: Vec<Point>,
    pub bridges: Vec<Point>,
    pub fords: Vec<Point>,
}

#[derive(Debug, Serialize)]
pub struct LandmarkRecord {
    pub kind: LandmarkKind,
    pub name: String,
    pub position: Point,
}

/// Everything a renderer needs, in one coordinate space.
#[derive(Debug, Serialize)]
pub struct CitySnapshot {
    /// Metres per unit.
    pub scale: f32,
    pub blueprint: Blueprint,
    pub summary: Summary,
    pub entrances: Vec<Point>,
    pub patches: Vec<PatchRecord>,
    pub districts: Vec<DistrictRecord>,
    pub walls: Vec<WallRecord>,
    pub roads: Vec<RoadRecord>,
    pub canals: Vec<CanalRecord>,
    pub landmarks: Vec<LandmarkRecord>,
}

fn wall_record(mesh: &PlanarMesh, kind: WallKind, wall: &CurtainWall) -> WallRecord {
    WallRecord {
        kind,
        chain: chain(mesh, &wall.chain),
        segments: wall.segments.clone(),
        gates: chain(mesh, &wall.gates),
        towers: chain(mesh, &wall.towers),
        watergates: wall.watergates.keys().map(|&v| point(mesh.point(v))).collect(),
    }
}

impl CitySnapshot {
    pub fn from_city(city: &City) -> Self {
        let mesh = &city.mesh;
        let patches = city
            .patches
            .iter()
            .map(|p| PatchRecord {
                id: p.id,
                ward: p.ward,
                district: p.district,
                water: p.waterbody,
                within_city: p.within_city,
                within_walls: p.within_walls,
                shape: points(&p.shape),
                blocks: p.geometry.blocks.iter().map(points).collect(),
                lots: p.geometry.lots.iter().map(points).collect(),
                buildings: p.geometry.buildings.iter().map(points).collect(),
                alleys: p.geometry.alleys.iter().map(|[a, b]| [point(*a), point(*b)]).collect(),
                features: p
                    .geometry
                    .features
                    .iter()
                    .map(|f| FeatureRecord { kind: f.kind, shape: points(&f.shape) })
                    .collect(),
                trees: p.geometry.trees.iter().copied().map(point).collect(),
            })
            .collect();

        let districts = city
            .districts
            .iter()
            .map(|d| DistrictRecord {
                name: d.name.clone(),
                kind: d.kind,
                patches: d.faces.iter().map(|f| f.0).collect(),
                border: chain(mesh, d.border(mesh)),
                population: d.population,
            })
            .collect();

        let mut walls = Vec::new();
        if let Some(wall) = &city.wall {
            walls.push(wall_record(mesh, WallKind::City, wall));
        }
        if let Some(keep) = &city.citadel_wall {
            walls.push(wall_record(mesh, WallKind::Citadel, keep));
        }

        let canals = city
            .canals
            .iter()
            .map(|c| CanalRecord {
                width: c.width,
                rural: c.rural,
                course: chain(mesh, &c.course),
                bridges: c
                    .bridges
                    .iter()
                    .filter(|(_, road)| road.is_some())
                    .map(|(&v, _)| point(mesh.point(v)))
                    .collect(),
                fords: c
                    .bridges
                    .iter()
                    .filter(|(_, road)| road.is_none())
                    .map(|(&v, _)| point(mesh.point(v)))
                    .collect(),
            })
            .collect();

        Self {
            scale: EXPORT_SCALE,
            blueprint: city.blueprint.clone(),
            summary: city.summary.clone(),
            entrances: chain(mesh, &city.entrances),
            patches,
            districts,
            walls,
            roads: city
                .roads
                .iter()
                .map(|r| RoadRecord { kind: r.kind, points: chain(mesh, &r.vertices) })
                .collect(),
            canals,
            landmarks: city
                .landmarks
                .iter()
                .map(|l| LandmarkRecord { kind: l.kind, name: l.name.clone(), position: point(l.position) })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Flags;
    use crate::systems::mesh::Params;
    use crate::systems::mesh::town::generate;

    #[test]
    fn test_snapshot_mirrors_city() {
        let blueprint = Blueprint::new(12, 31337, Flags { walls: true, plaza: true, ..Flags::default() });
        let city = generate(&blueprint, &Params::default()).unwrap();
        let snapshot = CitySnapshot::from_city(&city);
        assert_eq!(snapshot.patches.len(), city.patches.len());
        assert_eq!(snapshot.districts.len(), city.districts.len());
        assert_eq!(snapshot.walls.len(), 1);
        assert_eq!(snapshot.scale, EXPORT_SCALE);
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"ward\":\"Market\""));
    }

    #[test]
    fn test_write_json_creates_file() {
        let blueprint = Blueprint::new(10, 8, Flags::default());
        let city = generate(&blueprint, &Params::default()).unwrap();
        let path = std::env::temp_dir().join(format!("burg_gen_export_{}.json", std::process::id()));
        CitySnapshot::from_city(&city).write_json(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["patches"].as_array().map(|a| a.len()), Some(city.patches.len()));
    }
}
