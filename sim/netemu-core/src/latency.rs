//! The per-packet delay model.
//!
//! Every write samples its own delay from a normal distribution, so two
//! packets written back to back may overtake one another in flight.

use crate::config::{ConfigError, NetworkConfig};
use rand::{rngs::SmallRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::{sync::Mutex, time::Duration};

/// Samples propagation delays for packets.
///
/// A normal distribution can produce negative samples. Those are clamped to
/// zero, which delivers the packet on the next scheduler turn.
pub struct Latency {
    distribution: Normal<f64>,
    rng: Mutex<SmallRng>,
}

impl Latency {
    /// Creates a delay model seeded from the operating system.
    pub fn new(config: NetworkConfig) -> Result<Self, ConfigError> {
        Self::with_rng(config, SmallRng::from_entropy())
    }

    /// Creates a delay model with a fixed seed, for reproducible runs.
    pub fn seeded(config: NetworkConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(config, SmallRng::seed_from_u64(seed))
    }

    pub fn with_rng(config: NetworkConfig, rng: SmallRng) -> Result<Self, ConfigError> {
        let distribution = Normal::new(config.delay.as_secs_f64(), config.std_dev())
            .map_err(|_| ConfigError::Variability(config.variability))?;
        Ok(Self {
            distribution,
            rng: Mutex::new(rng),
        })
    }

    /// Draws the raw, unclamped delay in seconds.
    pub fn sample_secs(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap();
        self.distribution.sample(&mut *rng)
    }

    /// Draws the delay for one packet. Samples too long to represent saturate
    /// at [`Duration::MAX`].
    pub fn sample(&self) -> Duration {
        Duration::try_from_secs_f64(self.sample_secs().max(0.0)).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_center_on_the_mean() {
        let latency = Latency::seeded(NetworkConfig::default(), 0xBAD5EED).unwrap();
        let draws = 10_000;
        let raw: Vec<f64> = (0..draws).map(|_| latency.sample_secs()).collect();
        let negative = raw.iter().filter(|s| **s < 0.0).count();
        // Ten standard deviations below the mean; effectively never.
        assert_eq!(negative, 0);
        let mean = raw.iter().sum::<f64>() / draws as f64;
        assert!((mean - 0.2).abs() < 0.005, "mean was {mean}");
    }

    #[test]
    fn negative_samples_clamp_to_zero() {
        // Huge variability makes roughly half of the raw samples negative.
        let config = NetworkConfig::new(0.01, 50.0).unwrap();
        let latency = Latency::seeded(config, 7).unwrap();
        let mut saw_zero = false;
        for _ in 0..1_000 {
            let delay = latency.sample();
            saw_zero |= delay == Duration::ZERO;
        }
        assert!(saw_zero);
    }

    #[test]
    fn oversized_samples_saturate() {
        // Built directly, skipping the checks in `NetworkConfig::new`.
        let config = NetworkConfig {
            delay: Duration::from_secs(1),
            variability: 1e30,
        };
        let latency = Latency::seeded(config, 11).unwrap();
        let saturated = (0..100)
            .map(|_| latency.sample())
            .filter(|delay| *delay == Duration::MAX)
            .count();
        assert!(saturated > 0);
    }

    #[test]
    fn same_seed_same_delays() {
        let a = Latency::seeded(NetworkConfig::default(), 42).unwrap();
        let b = Latency::seeded(NetworkConfig::default(), 42).unwrap();
        for _ in 0..32 {
            assert_eq!(a.sample(), b.sample());
        }
    }
}
