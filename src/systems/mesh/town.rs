// entry points: generate with retries, similar variants, shared tuples
use tracing::{error, info, warn};

use crate::config::Blueprint;
use crate::error::{GenerationError, Result};
use crate::systems::random::Sequencer;
use super::Params;
use super::city::City;
use super::district::{NameSource, PlainNames};

/// Generates a settlement, reseeding on recoverable geometry failures.
pub fn generate(blueprint: &Blueprint, params: &Params) -> Result<City> {
    generate_named(blueprint, params, &PlainNames)
}

/// Same as [`generate`] with a caller-supplied name source.
///
/// Attempt 0 uses the blueprint's own seed. Each retry draws a fresh seed
/// from a stream seeded with it, so the retry sequence is reproducible too.
pub fn generate_named(blueprint: &Blueprint, params: &Params, names: &dyn NameSource) -> Result<City> {
    blueprint.validate()?;
    let attempts = params.max_attempts.max(1);
    let mut reseeder = Sequencer::new(blueprint.seed);
    let mut current = blueprint.clone();
    let mut last = None;

    for attempt in 0..attempts {
        info!(attempt, seed = current.seed, size = current.size, "generating settlement");
        match City::build(&current, params, names) {
            Ok(city) => {
                info!(
                    attempt,
                    patches = city.patches.len(),
                    districts = city.districts.len(),
                    "settlement generated"
                );
                return Ok(city);
            }
            Err(err) if err.is_recoverable() => {
                warn!(attempt, %err, "generation failed, reseeding");
                last = Some(err);
                current.seed = reseeder.next_seed();
            }
            Err(err) => {
                error!(%err, "generation aborted");
                return Err(err);
            }
        }
    }

    Err(GenerationError::RetriesExhausted {
        attempts,
        last: Box::new(last.unwrap_or_else(|| GenerationError::Invariant("no attempt was made".into()))),
    })
}

/// Keeps size, seed and walls of `city` and rerolls everything after them.
pub fn similar(city: &City, params: &Params) -> Result<City> {
    let mut blueprint = city.blueprint.clone();
    blueprint.variant = blueprint.variant.wrapping_add(1);
    generate(&blueprint, params)
}

/// Rebuilds a settlement from its shareable `(size, seed, flags)` tuple.
pub fn replay(size: usize, seed: u32, bits: u32, params: &Params) -> Result<City> {
    let blueprint = Blueprint::from_tuple(size, seed, bits)?;
    generate(&blueprint, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Flags;

    #[test]
    fn test_invalid_blueprint_is_rejected_up_front() {
        let blueprint = Blueprint::new(1, 5, Flags::default());
        let err = generate(&blueprint, &Params::default()).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidBlueprint(_)));
    }

    #[test]
    fn test_zero_budget_still_tries_once() {
        let params = Params { max_attempts: 0, ..Params::default() };
        let blueprint = Blueprint::new(12, 77, Flags::default());
        assert!(generate(&blueprint, &params).is_ok());
    }

    #[test]
    fn test_similar_keeps_layout_and_bumps_variant() {
        let params = Params::default();
        let blueprint = Blueprint::new(
            16,
            4242,
            Flags { walls: true, plaza: true, ..Flags::default() },
        );
        let city = generate(&blueprint, &params).unwrap();
        let other = similar(&city, &params).unwrap();
        assert_eq!(other.blueprint.variant, city.blueprint.variant + 1);
        if other.blueprint.seed == city.blueprint.seed {
            // everything up to the walls comes from the same draws
            assert_eq!(city.border(), other.border());
            assert_eq!(city.gates(), other.gates());
            assert_eq!(city.patches.len(), other.patches.len());
        }
    }

    #[test]
    fn test_replay_matches_generate() {
        let params = Params::default();
        let blueprint = Blueprint::new(12, 99, Flags { walls: true, ..Flags::default() });
        let (size, seed, bits) = blueprint.to_tuple();
        let a = generate(&blueprint, &params).unwrap();
        let b = replay(size, seed, bits, &params).unwrap();
        assert_eq!(a.gates(), b.gates());
        assert_eq!(a.patches.len(), b.patches.len());
    }
}
