//! LightCNN-9 face-embedding network with hand-derived backpropagation
//!
//! A convolutional face-embedding network built from first principles: the
//! forward inference pass and a fully analytic backward pass over a fixed
//! nine-stage topology, with no automatic differentiation. Gradients are
//! derived and coded per operator; max reductions record boolean location
//! masks that route gradient back to the elements that attained the max.
//!
//! # Modules
//!
//! - `tensor`: dense tensor and parameter containers
//! - `ops`: stateless primitive operators and their adjoints
//! - `network`: the fixed topology, its parameters, and both engines
//! - `optimizers`: parameter update rules (SGD)
//! - `training`: minibatch training driver
//! - `config`: training configuration loading
//! - `utils`: seedable RNG
//! - `error`: error taxonomy

pub mod config;
pub mod error;
pub mod network;
pub mod ops;
pub mod optimizers;
pub mod tensor;
pub mod training;
pub mod utils;

pub use error::{ModelError, Result};
pub use network::{ForwardCache, Gradients, LightCnn9, NetworkParameters};
pub use tensor::{DenseParams, FilterBank, Mask3D, Tensor3D};
