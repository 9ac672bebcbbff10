//! Deterministic simulation-level RNG.
//!
//! The fluid model itself is deterministic.  Randomness only enters through
//! externally plugged stochastic processes (e.g. Poisson source arrivals),
//! which draw from a single `SimRng` seeded from
//! [`SimConfig::seed`](crate::SimConfig::seed).  Because the kernel is single-threaded and events run
//! in a fixed order, the same seed always reproduces the same run.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

pub struct SimRng(SmallRng);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(seed))
    }

    #[inline]
    pub fn random<T>(&mut self) -> T
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        self.0.r#gen()
    }

    /// Sample a Poisson-distributed count with the given mean.
    ///
    /// Non-positive or non-finite means return 0.
    pub fn poisson(&mut self, mean: f64) -> u64 {
        if !(mean.is_finite() && mean > 0.0) {
            return 0;
        }
        match Poisson::new(mean) {
            Ok(dist) => dist.sample(&mut self.0) as u64,
            Err(_) => 0,
        }
    }
}
