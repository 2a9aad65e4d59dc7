//! Deterministic seed splitting.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Derive `n` sub-seeds from `root`.
///
/// The same root always yields the same sequence, and asking for more seeds
/// only extends it: `split_seed(r, k)` is a prefix of `split_seed(r, n)` for `k <= n`.
pub fn split_seed(root: u64, n: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(root);
    (0..n).map(|_| rng.next_u64()).collect()
}
