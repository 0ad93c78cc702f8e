use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use burg_gen::config::{FileConfig, GateMode};
use burg_gen::systems::export::CitySnapshot;
use burg_gen::systems::mesh::town;

/// Generate a walled medieval settlement and export it as JSON
///
/// Examples:
///   # A mid-sized walled town with a castle and a river
///   burg_gen --size 40 --seed 12345 --walls --citadel --river -o town.json
///
///   # A coastal village with every possible gate
///   burg_gen --size 12 --coast --walls --gates all
///
///   # Start from a settings file and override the seed
///   burg_gen --config town.toml --seed 7
#[derive(Parser, Debug)]
#[command(name = "burg_gen")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of patches in the settlement
    #[arg(short = 's', long)]
    size: Option<usize>,

    /// Seed, a positive 31-bit integer
    #[arg(long)]
    seed: Option<u32>,

    /// Variant counter for similar settlements
    #[arg(long)]
    variant: Option<u32>,

    /// Gate count: a number, or "all" for every eligible vertex
    #[arg(long, value_parser = parse_gates)]
    gates: Option<GateMode>,

    /// Output JSON path; prints a summary when omitted
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    #[arg(long)]
    walls: bool,

    #[arg(long)]
    citadel: bool,

    /// Put the citadel inside the walls
    #[arg(long)]
    inner_citadel: bool,

    #[arg(long)]
    plaza: bool,

    #[arg(long)]
    temple: bool,

    #[arg(long)]
    coast: bool,

    #[arg(long)]
    river: bool,

    /// Let farms and slums spill outside the walls
    #[arg(long)]
    shantytown: bool,

    #[arg(long)]
    greenery: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn parse_gates(value: &str) -> std::result::Result<GateMode, String> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(GateMode::EveryVertex);
    }
    value
        .parse::<usize>()
        .map(GateMode::Fixed)
        .map_err(|_| format!("expected a gate count or \"all\", got {value:?}"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let file_config = match &args.config {
        Some(path) if path.exists() => {
            FileConfig::load(path).with_context(|| format!("Failed to load config file: {path:?}"))?
        }
        Some(path) => bail!("Config file not found: {path:?}"),
        None => FileConfig::default(),
    };

    // cli wins over the file, feature flags only switch things on
    let mut blueprint = file_config.blueprint();
    let params = file_config.params();
    if let Some(size) = args.size {
        blueprint.size = size;
    }
    if let Some(seed) = args.seed {
        blueprint.seed = seed;
    }
    if let Some(variant) = args.variant {
        blueprint.variant = variant;
    }
    if let Some(gates) = args.gates {
        blueprint.gates = gates;
    }
    let flags = &mut blueprint.flags;
    flags.walls |= args.walls;
    flags.citadel |= args.citadel;
    flags.inner_citadel |= args.inner_citadel;
    flags.plaza |= args.plaza;
    flags.temple |= args.temple;
    flags.coast |= args.coast;
    flags.river |= args.river;
    flags.shantytown |= args.shantytown;
    flags.greenery |= args.greenery;

    let city = town::generate(&blueprint, &params).context("Settlement generation failed")?;
    let (size, seed, bits) = city.blueprint.to_tuple();
    info!(size, seed, bits, "share tuple");

    let output = args.output.or_else(|| file_config.output.as_ref().map(PathBuf::from));
    match output {
        Some(path) => {
            CitySnapshot::from_city(&city)
                .write_json(&path)
                .with_context(|| format!("Failed to write {path:?}"))?;
            info!(path = %path.display(), "settlement written");
        }
        None => {
            let summary = &city.summary;
            println!("{}", summary.name);
            println!("  patches:    {} ({} inside)", summary.patches, summary.inner_patches);
            println!("  buildings:  {}", summary.buildings);
            println!("  population: {:.0}", summary.population);
            println!("  gates:      {}", summary.gates);
            println!("  towers:     {}", summary.towers);
            println!("  bridges:    {}", summary.bridges);
            for district in &city.districts {
                println!("  {:<24} {:>8.0}", district.name, district.population);
            }
            println!("  replay with: --size {size} --seed {seed} (flags {bits:#x})");
        }
    }

    Ok(())
}
