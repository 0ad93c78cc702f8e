pub mod config;
pub mod error;
pub mod systems;


pub use config::{Blueprint, FileConfig, Flags, GateMode};
pub use error::{GenerationError, Result};
pub use systems::export::CitySnapshot;
pub use systems::mesh::Params;
pub use systems::mesh::city::City;
pub use systems::mesh::town::{generate, generate_named, replay, similar};
