//! Deterministic Simulation Testing (DST)
//!
//! `TigerStyle`: simulation-first. Every time-dependent component takes a
//! [`SimClock`], every random choice in a test flows through a
//! [`DeterministicRng`], and `DST_SEED` replays a failing run exactly.

mod clock;
mod config;
mod rng;
mod simulation;

pub use clock::SimClock;
pub use config::SimConfig;
pub use rng::DeterministicRng;
pub use simulation::{SimEnvironment, Simulation};
