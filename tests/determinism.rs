use burg_gen::{Blueprint, CitySnapshot, Flags, Params, generate, replay};

fn snapshot(blueprint: &Blueprint) -> String {
    let city = generate(blueprint, &Params::default()).unwrap();
    CitySnapshot::from_city(&city).to_json().unwrap()
}

#[test]
fn test_same_seed_same_settlement() {
    let flags = Flags { walls: true, citadel: true, river: true, plaza: true, ..Flags::default() };
    let blueprint = Blueprint::new(30, 8675309, flags);
    assert_eq!(snapshot(&blueprint), snapshot(&blueprint));
}

#[test]
fn test_coastal_settlement_is_stable() {
    let flags = Flags { walls: true, coast: true, temple: true, greenery: true, shantytown: true, ..Flags::default() };
    let blueprint = Blueprint::new(20, 4711, flags);
    assert_eq!(snapshot(&blueprint), snapshot(&blueprint));
}

#[test]
fn test_different_seeds_differ() {
    let flags = Flags { walls: true, ..Flags::default() };
    assert_ne!(snapshot(&Blueprint::new(16, 100, flags)), snapshot(&Blueprint::new(16, 101, flags)));
}

#[test]
fn test_replay_from_shared_tuple() {
    let params = Params::default();
    let flags = Flags { walls: true, river: true, ..Flags::default() };
    let city = generate(&Blueprint::new(24, 31415, flags), &params).unwrap();
    let (size, seed, bits) = city.blueprint.to_tuple();

    let again = replay(size, seed, bits, &params).unwrap();
    assert_eq!(
        CitySnapshot::from_city(&city).to_json().unwrap(),
        CitySnapshot::from_city(&again).to_json().unwrap()
    );
}
