//! Deterministic integer data sets for the collection benchmarks.
//!
//! Values are drawn uniformly from `0..bound` using per-chunk `ChaCha8Rng`
//! streams derived from a master seed, so a given `(len, seed, bound)` always
//! yields the same slice regardless of how rayon schedules the chunks.

use std::ops::Deref;
use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Values per independently seeded chunk.
const CHUNK: usize = 64 * 1024;

/// Upper bound (exclusive) of generated values.
pub const DEFAULT_BOUND: i32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateConfig {
    pub len: usize,
    pub seed: u64,
    pub bound: i32,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            len: 1_000,
            seed: 42,
            bound: DEFAULT_BOUND,
        }
    }
}

/// Immutable, cheaply clonable slice of generated integers.
#[derive(Debug, Clone)]
pub struct IntDataset {
    values: Arc<[i32]>,
}

impl IntDataset {
    pub fn generate(config: GenerateConfig) -> Self {
        Self {
            values: generate_values(&config).into(),
        }
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.values
    }
}

impl Deref for IntDataset {
    type Target = [i32];

    fn deref(&self) -> &[i32] {
        &self.values
    }
}

fn per_chunk_seed(master_seed: u64, index: usize) -> u64 {
    master_seed
        .wrapping_add(index as u64)
        .wrapping_mul(0x517cc1b727220a95)
}

fn generate_values(config: &GenerateConfig) -> Vec<i32> {
    let bound = config.bound.max(1);
    let chunks = config.len.div_ceil(CHUNK);

    // Range is an IndexedParallelIterator; collect preserves chunk order.
    let parts: Vec<Vec<i32>> = (0..chunks)
        .into_par_iter()
        .map(|i| {
            let start = i * CHUNK;
            let end = (start + CHUNK).min(config.len);
            let mut rng = ChaCha8Rng::seed_from_u64(per_chunk_seed(config.seed, i));
            (start..end).map(|_| rng.gen_range(0..bound)).collect()
        })
        .collect();

    parts.concat()
}
