//! Deterministic random number generation.
//!
//! RULE: Nothing in the engine may call a platform RNG. The only
//! randomness in the whole pipeline is base risk-score synthesis for
//! rows that arrive without one, and it flows through a ScoreRng seeded
//! from the run configuration. Same seed, same scores.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// Seedable stream for base risk-score synthesis.
pub struct ScoreRng {
    inner: Pcg64Mcg,
}

impl ScoreRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Draw a raw u64 (full range).
    fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.next_u64() % n
    }

    /// Synthesized base risk score: uniform integer in [1, 9].
    pub fn uniform_base_score(&mut self) -> f64 {
        (1 + self.next_u64_below(9)) as f64
    }
}
