use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Invalid blueprint: {0}")]
    InvalidBlueprint(String),

    #[error("Degenerate mesh: {0}")]
    DegenerateMesh(String),

    #[error("Not enough land for a settlement: {0} land patches")]
    NoLand(usize),

    #[error("Bad walled area shape: no gate on a {0}-vertex boundary")]
    NoGates(usize),

    #[error("No valid river course after {0} candidates")]
    NoRiverCourse(usize),

    #[error("District {0} still has a hole after {1} regrowths")]
    DistrictHole(usize, usize),

    #[error("No patch {0} in this settlement")]
    UnknownPatch(usize),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Could not generate a settlement after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        last: Box<GenerationError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl GenerationError {
    /// Geometry that could not be built from the current draws; a reseed may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GenerationError::DegenerateMesh(_)
                | GenerationError::NoLand(_)
                | GenerationError::NoGates(_)
                | GenerationError::NoRiverCourse(_)
                | GenerationError::DistrictHole(..)
        )
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
