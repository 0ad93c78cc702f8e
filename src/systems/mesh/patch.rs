use glam::Vec2;

use super::Polygon;
use super::dcel::{FaceId, PlanarMesh};
use super::poly::utils::{polygon_area, polygon_centroid};
use super::ward::{PatchGeometry, Ward};

/// One cell of the settlement.
///
/// Created once when the mesh is built and kept for the life of the city.
/// The shape is read back from the mesh once its topology is final.
#[derive(Clone, Debug)]
pub struct Patch {
    pub id: usize,
    pub face: FaceId,
    pub shape: Polygon,
    /// Seed of the private stream the patch geometry is drawn from.
    pub seed: u32,
    pub waterbody: bool,
    pub within_city: bool,
    pub within_walls: bool,
    pub ward: Ward,
    pub district: Option<usize>,
    pub geometry: PatchGeometry,
}

impl Patch {
    pub fn new(face: FaceId, shape: Polygon, seed: u32) -> Self {
        Self {
            id: face.0,
            face,
            shape,
            seed,
            waterbody: false,
            within_city: false,
            within_walls: false,
            ward: Ward::Wilderness,
            district: None,
            geometry: PatchGeometry::default(),
        }
    }

    /// Same flags, new face; used when a gate splits the patch in front of it.
    pub fn split_off(&self, face: FaceId, shape: Polygon, seed: u32) -> Self {
        Self {
            waterbody: self.waterbody,
            within_city: self.within_city,
            within_walls: self.within_walls,
            ward: self.ward,
            ..Self::new(face, shape, seed)
        }
    }

    pub fn refresh_shape(&mut self, mesh: &PlanarMesh) {
        self.shape = mesh.face_polygon(self.face);
    }

    pub fn area(&self) -> f32 {
        polygon_area(&self.shape)
    }

    pub fn centroid(&self) -> Vec2 {
        let area = self.area();
        if area.abs() > f32::EPSILON {
            polygon_centroid(&self.shape, area)
        } else {
            self.shape.iter().copied().sum::<Vec2>() / self.shape.len().max(1) as f32
        }
    }

    /// 0 inside the city, 1 outside on land, 2 on water.
    pub fn realm(&self) -> u8 {
        if self.waterbody {
            2
        } else if self.within_city {
            0
        } else {
            1
        }
    }

    pub fn building_area(&self) -> f32 {
        self.geometry.buildings.iter().map(polygon_area).sum()
    }
}
