//! Shared utilities
//!
//! Random number generation used for weight initialization and minibatch
//! shuffling.

pub mod rng;

pub use rng::SimpleRng;
