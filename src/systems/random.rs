// seeded random stream shared by every generation stage

use rand::RngCore;

const MODULUS: u64 = 2_147_483_647; // 2^31 - 1
const MULTIPLIER: u64 = 48_271;

/// Park-Miller style multiplicative generator.
///
/// Every randomized decision in the pipeline draws from one of these, in a
/// fixed order, so the same seed and call sequence always reproduce the same
/// settlement. `save`/`restore` give a single-level checkpoint for speculative
/// work that must not disturb later draws.
#[derive(Debug, Clone)]
pub struct Sequencer {
    state: u32,
    saved: Option<u32>,
}

impl Sequencer {
    pub fn new(seed: u32) -> Self {
        Self {
            state: Self::clamp_seed(seed),
            saved: None,
        }
    }

    // state must stay in 1..MODULUS
    fn clamp_seed(seed: u32) -> u32 {
        let s = (seed as u64 % MODULUS) as u32;
        if s == 0 { 1 } else { s }
    }

    pub fn reset(&mut self, seed: u32) {
        self.state = Self::clamp_seed(seed);
        self.saved = None;
    }

    /// Current state, usable as a seed for a derived stream.
    pub fn seed(&self) -> u32 {
        self.state
    }

    fn step(&mut self) -> u32 {
        self.state = ((self.state as u64 * MULTIPLIER) % MODULUS) as u32;
        self.state
    }

    /// Advances the stream and returns a value in [0, 1).
    pub fn float(&mut self) -> f32 {
        // f32 rounding could otherwise hit 1.0 near the top of the range
        ((self.step() as f64 / MODULUS as f64) as f32).min(0.999_999_94)
    }

    /// Fresh 31-bit seed for a derived stream, never 0.
    pub fn next_seed(&mut self) -> u32 {
        self.step()
    }

    /// Mean of three draws, bell-shaped around 0.5.
    pub fn normal3(&mut self) -> f32 {
        (self.float() + self.float() + self.float()) / 3.0
    }

    /// Half the sum of four draws, bell-shaped around 1.0.
    pub fn normal4(&mut self) -> f32 {
        (self.float() + self.float() + self.float() + self.float()) / 2.0
    }

    pub fn chance(&mut self, probability: f32) -> bool {
        self.float() < probability
    }

    /// Integer in `min..max`; returns `min` for an empty range.
    pub fn int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max - min) as f32;
        min + ((self.float() * span) as i32).min(max - min - 1)
    }

    pub fn index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        ((self.float() * len as f32) as usize).min(len - 1)
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            let i = self.index(items.len());
            items.get(i)
        }
    }

    /// Fisher-Yates driven by `float`, so the shuffle is part of the stream.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.index(i + 1);
            items.swap(i, j);
        }
    }

    pub fn save(&mut self) {
        self.saved = Some(self.state);
    }

    pub fn restore(&mut self) {
        if let Some(state) = self.saved.take() {
            self.state = state;
        }
    }

    /// Runs `f` between `save` and `restore`; its draws leave no trace.
    pub fn speculate<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.save();
        let result = f(self);
        self.restore();
        result
    }
}

impl RngCore for Sequencer {
    fn next_u32(&mut self) -> u32 {
        // stretch 31 bits over the full u32 range
        let unit = self.step() as f64 / MODULUS as f64;
        (unit * 4_294_967_296.0) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let hi = self.next_u32() as u64;
        let lo = self.next_u32() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::Rng;

    #[test]
    fn test_known_sequence() {
        // 1 * 48271, then 48271^2 mod (2^31 - 1)
        let mut seq = Sequencer::new(1);
        assert_eq!(seq.next_seed(), 48_271);
        assert_eq!(seq.next_seed(), 182_605_794);
    }

    #[test]
    fn test_zero_seed_is_usable() {
        let mut seq = Sequencer::new(0);
        let v = seq.float();
        assert!(v > 0.0 && v < 1.0);
    }

    #[test]
    fn test_replay_matches() {
        let mut a = Sequencer::new(12345);
        let mut b = Sequencer::new(12345);
        for _ in 0..100 {
            assert_eq!(a.float().to_bits(), b.float().to_bits());
        }
    }

    #[test]
    fn test_save_restore_rolls_back() {
        let mut seq = Sequencer::new(777);
        seq.float();
        seq.save();
        let first = seq.float();
        seq.float();
        seq.restore();
        assert_eq!(seq.float(), first);
    }

    #[test]
    fn test_restore_without_save_is_noop() {
        let mut a = Sequencer::new(31);
        let mut b = Sequencer::new(31);
        a.restore();
        assert_eq!(a.float(), b.float());
    }

    #[test]
    fn test_speculate_leaves_no_trace() {
        let mut a = Sequencer::new(99);
        let mut b = Sequencer::new(99);
        let drawn = a.speculate(|s| s.normal4());
        assert!(drawn >= 0.0 && drawn <= 2.0);
        assert_eq!(a.float(), b.float());
    }

    #[test]
    fn test_rng_core_bridges_rand() {
        let mut seq = Sequencer::new(4242);
        let v: f32 = seq.random();
        assert!((0.0..1.0).contains(&v));
        let r = seq.random_range(3..9);
        assert!((3..9).contains(&r));
    }

    proptest! {
        #[test]
        fn test_float_in_unit_range(seed in 0u32..u32::MAX) {
            let mut seq = Sequencer::new(seed);
            for _ in 0..16 {
                let v = seq.float();
                prop_assert!(v >= 0.0 && v < 1.0);
            }
        }

        #[test]
        fn test_int_stays_in_range(seed in 1u32..2_000_000_000, min in -50i32..50, span in 1i32..40) {
            let mut seq = Sequencer::new(seed);
            let v = seq.int(min, min + span);
            prop_assert!(v >= min && v < min + span);
        }
    }
}
