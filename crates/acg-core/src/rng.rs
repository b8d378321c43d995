//! Deterministic RNG wrapper, sampling helpers and seed-derivation rules.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, Exp, Geometric, Poisson};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Deterministic RNG handle passed explicitly to every sampling primitive and
/// operator.
///
/// The handle is a thin wrapper around `StdRng`. A master `seed: u64` must be
/// provided by the caller. Substreams are derived by hashing
/// `(master_seed, substream_id)` with SipHash-1-3 configured with fixed zero
/// keys, so that operator slots and simulation replicates stay reproducible
/// across platforms.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
}

impl RngHandle {
    /// Creates a new RNG handle from a master seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates the handle for a derived substream of `master_seed`.
    pub fn substream(master_seed: u64, substream: u64) -> Self {
        Self::from_seed(derive_substream_seed(master_seed, substream))
    }

    /// Uniform draw on `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Log of a uniform draw on `(0, 1]`, never `-inf`.
    ///
    /// Metropolis acceptance compares this against the log acceptance ratio
    /// with `<`, so a ratio of `-inf` is always rejected.
    pub fn log_uniform(&mut self) -> f64 {
        (1.0 - self.uniform()).ln()
    }

    /// Uniform integer draw on `0..n`. Panics if `n == 0`.
    pub fn uniform_index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Fair coin flip.
    pub fn coin(&mut self) -> bool {
        self.rng.gen::<bool>()
    }

    /// Exponential draw with the given rate. Non-positive or non-finite rates
    /// yield `+inf`.
    pub fn exponential(&mut self, rate: f64) -> f64 {
        match Exp::new(rate) {
            Ok(dist) if rate > 0.0 => dist.sample(&mut self.rng),
            _ => f64::INFINITY,
        }
    }

    /// Number of failures before the first success of a Bernoulli(`p`) trial
    /// sequence, i.e. `P(k) = (1-p)^k p` for `k = 0, 1, ...`.
    pub fn geometric(&mut self, p: f64) -> u64 {
        match Geometric::new(p) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => 0,
        }
    }

    /// Poisson draw with the given mean. A zero mean always yields zero.
    pub fn poisson(&mut self, mean: f64) -> u64 {
        if mean.is_nan() || mean <= 0.0 {
            return 0;
        }
        match Poisson::new(mean) {
            Ok(dist) => {
                let value: f64 = dist.sample(&mut self.rng);
                value as u64
            }
            Err(_) => 0,
        }
    }

    /// Chooses an index with probability proportional to `weights`.
    ///
    /// Returns `None` when the weights are empty or sum to zero.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().sum();
        if weights.is_empty() || total.is_nan() || total <= 0.0 {
            return None;
        }
        let mut u = self.uniform() * total;
        for (idx, weight) in weights.iter().enumerate() {
            if u < *weight {
                return Some(idx);
            }
            u -= weight;
        }
        weights.iter().rposition(|w| *w > 0.0)
    }
}

impl RngCore for RngHandle {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Derives the deterministic seed for a specific substream.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}
