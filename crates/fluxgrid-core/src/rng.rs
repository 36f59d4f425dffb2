//! Deterministic PRNG for particle movement.
//!
//! Uses the SplitMix64 algorithm: fast, 8 bytes of state, and fully
//! reproducible across platforms, so two runs with the same seed evolve the
//! same field.

use crate::fixed::SimFixed;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 1337;

/// Fractional bits carried by [`SimRng::fraction`].
const FRACTION_BITS: u32 = SimFixed::FRAC_BITS;

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform fraction in `[0, 1)`: the low fractional bits of the next
    /// output taken as a raw value.
    pub fn fraction(&mut self) -> SimFixed {
        let mask = (1u64 << FRACTION_BITS) - 1;
        SimFixed::from_raw((self.next_u64() & mask) as i64)
    }

    /// Get the internal state (for hashing).
    pub fn state(&self) -> u64 {
        self.state
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
