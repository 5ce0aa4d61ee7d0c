//! Simulation - DST Test Harness
//!
//! `TigerStyle`: One seed controls all randomness; the environment hands the
//! test a shared clock and a forked RNG. Fault behavior lives on the sim
//! stores themselves (`SimDurableStore::fail_next_appends`), keeping the
//! harness small.

use std::future::Future;

use super::clock::SimClock;
use super::config::SimConfig;
use super::rng::DeterministicRng;

/// Environment provided to simulation tests.
pub struct SimEnvironment {
    /// Simulation configuration
    pub config: SimConfig,
    /// Simulated clock
    pub clock: SimClock,
    /// Deterministic RNG
    pub rng: DeterministicRng,
}

impl SimEnvironment {
    /// Advance simulated time in milliseconds.
    pub fn advance_time_ms(&self, ms: u64) -> u64 {
        self.clock.advance_ms(ms)
    }

    /// Get current simulated time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Sleep for the given milliseconds (async, waits for time to advance).
    pub async fn sleep_ms(&self, ms: u64) {
        self.clock.sleep_ms(ms).await;
    }
}

/// DST simulation harness.
///
/// # Example
///
/// ```rust
/// use mimir::dst::{Simulation, SimConfig};
///
/// # async fn example() {
/// let sim = Simulation::new(SimConfig::with_seed(42));
/// sim.run(|env| async move {
///     env.advance_time_ms(1000);
///     assert_eq!(env.now_ms(), 1000);
///     Ok::<(), std::convert::Infallible>(())
/// })
/// .await
/// .unwrap();
/// # }
/// ```
pub struct Simulation {
    config: SimConfig,
}

impl Simulation {
    /// Create a new simulation with the given configuration.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    /// Build the simulation environment without running a test.
    #[must_use]
    pub fn build(self) -> SimEnvironment {
        let mut rng = DeterministicRng::new(self.config.seed());
        let clock = SimClock::new();
        let env_rng = rng.fork();

        SimEnvironment {
            config: self.config,
            clock,
            rng: env_rng,
        }
    }

    /// Run the simulation with the given test function.
    ///
    /// # Errors
    /// Returns any error from the test function.
    pub async fn run<F, Fut, E>(self, test_fn: F) -> Result<(), E>
    where
        F: FnOnce(SimEnvironment) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let env = self.build();
        test_fn(env).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_simulation() {
        let sim = Simulation::new(SimConfig::with_seed(42));

        sim.run(|env| async move {
            env.advance_time_ms(1000);
            assert_eq!(env.now_ms(), 1000);
            Ok::<(), std::convert::Infallible>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_simulation_determinism() {
        let mut env1 = Simulation::new(SimConfig::with_seed(12345)).build();
        let mut env2 = Simulation::new(SimConfig::with_seed(12345)).build();

        let seq1: Vec<u64> = (0..10).map(|_| env1.rng.next_u64()).collect();
        let seq2: Vec<u64> = (0..10).map(|_| env2.rng.next_u64()).collect();

        assert_eq!(seq1, seq2);
    }
}
