pub mod building;
pub mod point_gen;
pub mod subdivision;
pub mod utils;
pub mod voronoi;
