//! 32-bit Mersenne Twister (MT19937).
//!
//! Seeded with `init_genrand`, so a given seed yields the same stream as any other MT19937
//! implementation. It implements `rand::RngCore`, so any `rand` distribution can draw from it.

use ndarray_rand::rand::{Error as RandError, RngCore};

const N: usize = 624;
const M: usize = 397;
const MATRIX_A: u32 = 0x9908_b0df;
const UPPER_MASK: u32 = 0x8000_0000;
const LOWER_MASK: u32 = 0x7fff_ffff;

/// Seed substituted for 0.
const ZERO_SEED_REPLACEMENT: u32 = 4357;

/// Seed used for parameter initialisation unless the caller picks another one.
pub const DEFAULT_SEED: u32 = 89_712_349;

#[derive(Clone)]
pub struct Mt19937 {
    state: [u32; N],
    index: usize,
}

impl Mt19937 {
    pub fn new(seed: u32) -> Self {
        let seed = if seed == 0 { ZERO_SEED_REPLACEMENT } else { seed };
        let mut state = [0u32; N];
        state[0] = seed;
        for i in 1..N {
            let prev = state[i - 1];
            state[i] = 1_812_433_253u32
                .wrapping_mul(prev ^ (prev >> 30))
                .wrapping_add(i as u32);
        }
        Self { state, index: N }
    }

    fn twist(&mut self) {
        for k in 0..N {
            let y = (self.state[k] & UPPER_MASK) | (self.state[(k + 1) % N] & LOWER_MASK);
            let mag = if y & 1 == 1 { MATRIX_A } else { 0 };
            self.state[k] = self.state[(k + M) % N] ^ (y >> 1) ^ mag;
        }
        self.index = 0;
    }

    pub fn next_u32(&mut self) -> u32 {
        if self.index >= N {
            self.twist();
        }
        let mut y = self.state[self.index];
        self.index += 1;

        y ^= y >> 11;
        y ^= (y << 7) & 0x9d2c_5680;
        y ^= (y << 15) & 0xefc6_0000;
        y ^= y >> 18;
        y
    }

    /// Uniform draw in [0, 1) with 32 bits of resolution.
    pub fn next_uniform(&mut self) -> f64 {
        uniform_from(self.next_u32())
    }
}

/// Map a raw 32-bit draw onto [0, 1).
pub(crate) fn uniform_from(raw: u32) -> f64 {
    raw as f64 / 4_294_967_296.0
}

impl RngCore for Mt19937 {
    fn next_u32(&mut self) -> u32 {
        Mt19937::next_u32(self)
    }

    fn next_u64(&mut self) -> u64 {
        let low = Mt19937::next_u32(self) as u64;
        let high = Mt19937::next_u32(self) as u64;
        (high << 32) | low
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = Mt19937::next_u32(self).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), RandError> {
        self.fill_bytes(dest);
        Ok(())
    }
}
