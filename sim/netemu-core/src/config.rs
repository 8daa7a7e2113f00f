//! Process-wide tunables for the simulated transport.

use std::time::Duration;
use thiserror::Error as ThisError;

/// The mean time a packet spends in flight before it is delivered.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(200);

/// The ratio of the standard deviation of the delay to its mean. A value of
/// 0.1 gives a standard deviation one tenth of the mean delay.
pub const DEFAULT_VARIABILITY: f64 = 0.1;

/// How many standard deviations above the mean a delay may lie before the
/// configuration is rejected.
const MAX_DEVIATIONS: f64 = 10.0;

/// Configuration read once when a [`Network`](crate::Network) is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkConfig {
    /// Mean propagation delay of a single packet.
    pub delay: Duration,
    /// Standard deviation of the delay divided by its mean.
    pub variability: f64,
}

impl NetworkConfig {
    /// Creates a configuration from a mean delay in seconds and a variability
    /// ratio, rejecting values a normal distribution cannot be built from.
    pub fn new(delay_secs: f64, variability: f64) -> Result<Self, ConfigError> {
        if !delay_secs.is_finite() || delay_secs < 0.0 {
            return Err(ConfigError::Delay(delay_secs));
        }
        let delay =
            Duration::try_from_secs_f64(delay_secs).map_err(|_| ConfigError::Delay(delay_secs))?;
        if !variability.is_finite() || variability < 0.0 {
            return Err(ConfigError::Variability(variability));
        }
        // Samples this far above the mean must still be a valid delay.
        let widest = delay_secs + MAX_DEVIATIONS * delay_secs * variability;
        if Duration::try_from_secs_f64(widest).is_err() {
            return Err(ConfigError::Variability(variability));
        }
        Ok(Self { delay, variability })
    }

    /// A configuration with no delay at all. Packets are still delivered
    /// asynchronously.
    pub fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
            variability: 0.0,
        }
    }

    /// The standard deviation of the delay in seconds.
    pub fn std_dev(&self) -> f64 {
        self.delay.as_secs_f64() * self.variability
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            variability: DEFAULT_VARIABILITY,
        }
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("The mean network delay must be a non-negative number of seconds, got {0}")]
    Delay(f64),
    #[error("The delay variability must be a non-negative ratio, got {0}")]
    Variability(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.delay, Duration::from_millis(200));
        assert!((config.std_dev() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(NetworkConfig::new(-1.0, 0.1), Err(ConfigError::Delay(-1.0)));
        assert!(matches!(
            NetworkConfig::new(0.2, f64::NAN),
            Err(ConfigError::Variability(_))
        ));
        assert!(NetworkConfig::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn rejects_delays_too_long_to_represent() {
        assert_eq!(NetworkConfig::new(1e20, 0.1), Err(ConfigError::Delay(1e20)));
        assert_eq!(
            NetworkConfig::new(0.2, 1e21),
            Err(ConfigError::Variability(1e21))
        );
        // Any spread is fine when there is no delay to spread.
        assert!(NetworkConfig::new(0.0, 1e21).is_ok());
    }
}
