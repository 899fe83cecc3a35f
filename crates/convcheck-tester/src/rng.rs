//! Random tensor source.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Uniform range tensors are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRange {
    /// `[-0.1, 1.0)`: mostly positive with enough negatives to exercise both
    /// branches of a rectifying activation.
    Biased,
    /// `[0.0, 1.0)`.
    Unit,
}

impl ValueRange {
    pub fn bounds(&self) -> (f32, f32) {
        match self {
            ValueRange::Biased => (-0.1, 1.0),
            ValueRange::Unit => (0.0, 1.0),
        }
    }
}

/// Seeded generator owned by one test procedure invocation.
///
/// Iterations keep drawing from the same stream; the generator is never
/// reseeded mid-run.
#[derive(Debug, Clone)]
pub struct TensorRng {
    seed: u64,
    rng: ChaCha8Rng,
}

impl TensorRng {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    /// Seed from the wall clock at nanosecond resolution.
    pub fn from_clock() -> Self {
        Self::with_seed(clock_seed())
    }

    /// Use `seed` when given, the wall clock otherwise.
    pub fn from_seed_or_clock(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_clock, Self::with_seed)
    }

    /// Seed this generator was created with, for reproducing a run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Overwrite every element of `buffer`, in order, with a fresh draw.
    pub fn fill(&mut self, buffer: &mut [f32], range: ValueRange) {
        let (low, high) = range.bounds();
        for value in buffer.iter_mut() {
            *value = self.rng.random_range(low..high);
        }
    }
}

fn clock_seed() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or_default()
}
