//! Stateless primitive operators over tensors
//!
//! Pure functions only: every call owns its intermediates and returns fresh
//! buffers, so concurrent per-sample execution needs no shared scratch
//! state. Each operator's hand-derived adjoint lives next to it.

pub mod conv;
pub mod dense;
pub mod loss;
pub mod mfm;
pub mod pool;

pub use conv::{convolve, convolve_input_gradient, convolve_param_gradients, crop, pad};
pub use dense::{dense_backward, dense_project};
pub use loss::{cross_entropy, softmax, softmax_cross_entropy_gradient};
pub use mfm::{
    max_feature_map, max_feature_map_backward, max_feature_map_vec, max_feature_map_vec_backward,
};
pub use pool::{max_pool_2x2, max_pool_2x2_backward};
