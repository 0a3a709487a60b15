//! Optimizer abstractions
//!
//! The backward engine only produces gradients; applying them is the
//! optimizer's job, one flat parameter/gradient pair at a time.

pub mod sgd;

pub use sgd::Sgd;

/// Core trait for parameter update rules.
pub trait Optimizer {
    /// Update parameters in place from their gradients.
    ///
    /// # Panics
    ///
    /// Panics if `parameters` and `gradients` have different lengths; the
    /// caller wires matching pairs.
    fn update(&mut self, parameters: &mut [f64], gradients: &[f64]);

    /// Reset internal optimizer state, if any.
    fn reset(&mut self);

    /// Current learning rate.
    fn learning_rate(&self) -> f64;

    /// Replace the learning rate, e.g. for decay schedules.
    fn set_learning_rate(&mut self, learning_rate: f64);
}
