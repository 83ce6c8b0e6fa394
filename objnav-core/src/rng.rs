// Every controller owns its generator. Nothing here is global, so parallel rollout workers stay
// independent and reproducible.

use rand::{SeedableRng, rngs::StdRng};

/// Seed of the worker with the given rank.
pub fn worker_seed(base_seed: u64, rank: u64) -> u64 {
    base_seed.wrapping_add(rank)
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
