// Configuration file, all measurements in real-world meters (1 unit = 1 meter)
// This controls the initial generation parameter settings

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};

// Settlement size (patches)
pub const INITIAL_SEED: u32 = 12345;
pub const DEFAULT_SIZE: usize = 24;
pub const MIN_SIZE: usize = 4;
pub const MAX_SIZE: usize = 160;

// Point generation
pub const POINTS_PER_PATCH: usize = 8;       // seed cloud is this many times the city size
pub const SPIRAL_BASE_RADIUS: f32 = 10.0;    // radius of the first ring of seeds
pub const SPIRAL_STEP: f32 = 2.0;            // radial growth per seed, plus up to one more
pub const SPIRAL_TURN: f32 = 5.0;            // angle step scales with sqrt(i)
pub const RELAX_STEPS: usize = 3;
pub const PLAZA_OFFSET: f32 = 8.0;           // quincunx arm length around the plaza seed
pub const CIRCUMCENTER_MERGE_THRESHOLD: f32 = 0.01;  // merge circumcenters closer than this distance
pub const OUTER_RING_POINTS: usize = 6;
pub const OUTER_CUTOFF: f32 = 1.5;           // drop cells reaching beyond this many seed radii

// Coastline
pub const COAST_OCTAVES: usize = 6;
pub const COAST_FREQUENCY: f64 = 2.0;

// Junction optimization
pub const TOWER_RADIUS: f32 = 1.9;
pub const MAX_JUNCTION_PASSES: usize = 64;

// Walls and gates
pub const GATE_SPACING: f32 = 350.0;         // boundary length per gate
pub const GATE_EXCLUSION_WINDOW: usize = 2;  // chain positions zeroed on each side of a gate
pub const WALL_SMOOTHING: f32 = 40.0;        // smoothing factor is min(1, this / chain length)
pub const ROAD_SMOOTHING: f32 = 3.0;
pub const MAX_ROAD_TARGETS: usize = 4;

// Rivers
pub const RIVER_ALIGNMENT: f32 = 0.75;       // min cosine between course and shore normal
pub const MAX_RIVER_CANDIDATES: usize = 24;
pub const RURAL_WIDTH_FACTOR: f32 = 1.5;

// Edge insets
pub const WALL_INSET: f32 = 2.15;
pub const ROAD_INSET: f32 = 1.2;
pub const PLAZA_INSET: f32 = 1.0;
pub const COAST_INSET: f32 = 1.5;
pub const DEFAULT_INSET: f32 = 0.6;

// Subdivision control parameters
pub const ALLEY_WIDTH: f32 = 1.2;            // gap left along block cuts
pub const LOT_INSET: f32 = 0.3;              // street-facing setback, 0 disables
pub const MAX_CUT_ATTEMPTS: usize = 10;
pub const MAX_RECURSION_DEPTH: usize = 24;
pub const LOT_AREA_MIN: f32 = 15.0;          // smallest lot a cut may produce (m2)

// Building parameters
pub const BUILDING_CELL: f32 = 3.0;          // footprint grid cell size
pub const BUILDING_GRID_MAX: usize = 8;
pub const BUILDING_GROW_PROB: f32 = 0.5;     // chance to keep growing once the extent is full
pub const EMPTY_PROB: f32 = 0.04;            // probability of a lot staying empty

// Wards
pub const MAX_DOCKS: usize = 4;
pub const PARK_CHANCE: f32 = 0.15;
pub const FARM_RADIUS: f32 = 2.5;            // farms thin out beyond this many city radii

// Districts
pub const DISTRICT_FORCE_ROUNDS: usize = 64;
pub const DISTRICT_HOLE_RETRIES: usize = 8;

// Population estimate
pub const FLOORS: f32 = 2.0;
pub const AREA_PER_RESIDENT: f32 = 12.0;

// Pipeline
pub const MAX_ATTEMPTS: usize = 12;

/// Meters per exported unit.
pub const EXPORT_SCALE: f32 = 1.0;

/// How many gates the city wall gets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateMode {
    /// Proportional to the wall length.
    #[default]
    Auto,
    Fixed(usize),
    /// Every eligible boundary vertex.
    EveryVertex,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Flags {
    pub walls: bool,
    pub citadel: bool,
    pub inner_citadel: bool,
    pub plaza: bool,
    pub temple: bool,
    pub coast: bool,
    pub river: bool,
    pub shantytown: bool,
    pub greenery: bool,
}

impl Flags {
    const BITS: [u32; 9] = [1, 2, 4, 8, 16, 32, 64, 128, 256];

    fn as_array(&self) -> [bool; 9] {
        [
            self.walls,
            self.citadel,
            self.inner_citadel,
            self.plaza,
            self.temple,
            self.coast,
            self.river,
            self.shantytown,
            self.greenery,
        ]
    }

    pub fn bits(&self) -> u32 {
        self.as_array()
            .iter()
            .zip(Self::BITS)
            .filter(|(set, _)| **set)
            .map(|(_, bit)| bit)
            .sum()
    }

    pub fn from_bits(bits: u32) -> Self {
        Self {
            walls: bits & 1 != 0,
            citadel: bits & 2 != 0,
            inner_citadel: bits & 4 != 0,
            plaza: bits & 8 != 0,
            temple: bits & 16 != 0,
            coast: bits & 32 != 0,
            river: bits & 64 != 0,
            shantytown: bits & 128 != 0,
            greenery: bits & 256 != 0,
        }
    }
}

/// Everything a settlement is generated from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    pub size: usize,
    pub seed: u32,
    pub flags: Flags,
    pub gates: GateMode,
    /// Reseeds every choice made after the walls ("similar" regeneration).
    pub variant: u32,
}

impl Default for Blueprint {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            seed: INITIAL_SEED,
            flags: Flags {
                walls: true,
                plaza: true,
                temple: true,
                ..Flags::default()
            },
            gates: GateMode::Auto,
            variant: 0,
        }
    }
}

const GATE_BITS_SHIFT: u32 = 16;
const GATE_EVERY_VERTEX: u32 = 0xFF;
/// Largest fixed gate count the share tuple can carry.
pub const MAX_FIXED_GATES: usize = GATE_EVERY_VERTEX as usize - 1;

impl Blueprint {
    pub fn new(size: usize, seed: u32, flags: Flags) -> Self {
        Self { size, seed, flags, gates: GateMode::Auto, variant: 0 }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_SIZE..=MAX_SIZE).contains(&self.size) {
            return Err(GenerationError::InvalidBlueprint(format!(
                "size {} outside {}..={}",
                self.size, MIN_SIZE, MAX_SIZE
            )));
        }
        if self.seed == 0 || self.seed >= 0x7FFF_FFFF {
            return Err(GenerationError::InvalidBlueprint(format!(
                "seed {} is not a positive 31-bit integer",
                self.seed
            )));
        }
        if let GateMode::Fixed(n) = self.gates {
            if n == 0 {
                return Err(GenerationError::InvalidBlueprint("gate count must be positive".into()));
            }
            if n > MAX_FIXED_GATES {
                return Err(GenerationError::InvalidBlueprint(format!(
                    "gate count {} above {}",
                    n, MAX_FIXED_GATES
                )));
            }
        }
        Ok(())
    }

    /// Packs flags and gate mode into one word for shareable tuples.
    ///
    /// Only a validated blueprint packs losslessly.
    pub fn to_tuple(&self) -> (usize, u32, u32) {
        let gates = match self.gates {
            GateMode::Auto => 0,
            GateMode::Fixed(n) => n as u32 & 0xFF,
            GateMode::EveryVertex => GATE_EVERY_VERTEX,
        };
        (self.size, self.seed, self.flags.bits() | (gates << GATE_BITS_SHIFT))
    }

    pub fn from_tuple(size: usize, seed: u32, bits: u32) -> Result<Self> {
        let gates = match (bits >> GATE_BITS_SHIFT) & 0xFF {
            0 => GateMode::Auto,
            GATE_EVERY_VERTEX => GateMode::EveryVertex,
            n => GateMode::Fixed(n as usize),
        };
        let blueprint = Self {
            size,
            seed,
            flags: Flags::from_bits(bits & 0xFFFF),
            gates,
            variant: 0,
        };
        blueprint.validate()?;
        Ok(blueprint)
    }
}

// file config defaults
fn default_size() -> usize {
    DEFAULT_SIZE
}
fn default_seed() -> u32 {
    INITIAL_SEED
}
fn default_attempts() -> usize {
    MAX_ATTEMPTS
}

/// TOML settings file; anything missing keeps its default.
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default = "default_seed")]
    pub seed: u32,
    #[serde(default)]
    pub flags: Flags,
    #[serde(default)]
    pub gates: Option<usize>,
    #[serde(default)]
    pub all_gates: bool,
    #[serde(default)]
    pub variant: u32,
    #[serde(default = "default_attempts")]
    pub max_attempts: usize,
    #[serde(default)]
    pub lot_inset: Option<f32>,
    #[serde(default)]
    pub alley_width: Option<f32>,
    #[serde(default)]
    pub gate_spacing: Option<f32>,
    #[serde(default)]
    pub output: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            seed: default_seed(),
            flags: Flags::default(),
            gates: None,
            all_gates: false,
            variant: 0,
            max_attempts: default_attempts(),
            lot_inset: None,
            alley_width: None,
            gate_spacing: None,
            output: None,
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn blueprint(&self) -> Blueprint {
        let gates = if self.all_gates {
            GateMode::EveryVertex
        } else {
            match self.gates {
                Some(n) => GateMode::Fixed(n),
                None => GateMode::Auto,
            }
        };
        Blueprint {
            size: self.size,
            seed: self.seed,
            flags: self.flags,
            gates,
            variant: self.variant,
        }
    }

    pub fn params(&self) -> crate::systems::mesh::Params {
        let mut params = crate::systems::mesh::Params {
            max_attempts: self.max_attempts,
            ..Default::default()
        };
        if let Some(v) = self.lot_inset {
            params.lot_inset = v;
        }
        if let Some(v) = self.alley_width {
            params.alley_width = v;
        }
        if let Some(v) = self.gate_spacing {
            params.gate_spacing = v;
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_bits_roundtrip() {
        let flags = Flags { walls: true, river: true, greenery: true, ..Flags::default() };
        assert_eq!(flags.bits(), 1 | 64 | 256);
        assert_eq!(Flags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn test_tuple_keeps_gate_mode() {
        let mut bp = Blueprint::new(30, 777, Flags { walls: true, ..Flags::default() });
        bp.gates = GateMode::EveryVertex;
        let (size, seed, bits) = bp.to_tuple();
        let back = Blueprint::from_tuple(size, seed, bits).unwrap();
        assert_eq!(back.gates, GateMode::EveryVertex);
        assert_eq!(back.flags, bp.flags);
    }

    #[test]
    fn test_validate_rejects_bad_seed_and_size() {
        assert!(Blueprint::new(40, 0, Flags::default()).validate().is_err());
        assert!(Blueprint::new(2, 5, Flags::default()).validate().is_err());
        assert!(Blueprint::new(40, 12345, Flags::default()).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_gate_counts_the_tuple_cannot_hold() {
        let mut bp = Blueprint::new(40, 12345, Flags { walls: true, ..Flags::default() });
        bp.gates = GateMode::Fixed(MAX_FIXED_GATES);
        assert!(bp.validate().is_ok());
        let (size, seed, bits) = bp.to_tuple();
        assert_eq!(Blueprint::from_tuple(size, seed, bits).unwrap().gates, GateMode::Fixed(MAX_FIXED_GATES));

        bp.gates = GateMode::Fixed(MAX_FIXED_GATES + 1);
        assert!(matches!(bp.validate(), Err(GenerationError::InvalidBlueprint(_))));
        bp.gates = GateMode::Fixed(0);
        assert!(bp.validate().is_err());
    }

    #[test]
    fn test_file_config_defaults() {
        let cfg = FileConfig::parse("seed = 99\n[flags]\nwalls = true\n").unwrap();
        let bp = cfg.blueprint();
        assert_eq!(bp.seed, 99);
        assert_eq!(bp.size, DEFAULT_SIZE);
        assert!(bp.flags.walls);
        assert!(!bp.flags.river);
        assert_eq!(cfg.params().max_attempts, MAX_ATTEMPTS);
    }

    #[test]
    fn test_file_config_overrides_params() {
        let cfg = FileConfig::parse("gates = 3\nlot_inset = 0.0\n").unwrap();
        assert_eq!(cfg.blueprint().gates, GateMode::Fixed(3));
        assert_eq!(cfg.params().lot_inset, 0.0);
    }
}
