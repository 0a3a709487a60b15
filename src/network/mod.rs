//! The fixed LightCNN-9 topology: parameters, forward pass, backward pass
//!
//! Both engines walk the same ordered stage table, one forwards and one in
//! reverse, so the mirror property between them cannot drift. Per-stage
//! channel counts are carried by the parameter tensors themselves.

mod backward;
mod forward;
pub mod params;

pub use forward::ForwardCache;
pub use params::{Gradients, NetworkParameters};

use crate::error::Result;
use crate::optimizers::Optimizer;
use crate::tensor::Tensor3D;
use crate::utils::SimpleRng;

/// Input images are single-channel 128×128.
pub const INPUT_ROWS: usize = 128;
pub const INPUT_COLS: usize = 128;

/// Number of distinct identities in the training set.
pub const NUM_CLASSES: usize = 3095;

/// Flattened width of the pooled stage-5 feature map (8·8·128).
pub const FLAT_WIDTH: usize = 8 * 8 * 128;

/// Width of the first dense stage, halved by the vector max-feature-map
/// into the embedding.
pub const FC1_WIDTH: usize = 512;

/// Width of the face embedding fed to the classifier stage.
pub const EMBED_WIDTH: usize = FC1_WIDTH / 2;

/// One convolution stage of the topology.
pub(crate) struct StageSpec {
    /// Main filter extent (square).
    pub kernel: usize,
    /// Zero-padding applied before the main convolution.
    pub pad: usize,
    /// Whether a 1×1 reduction convolution + MFM precedes the main filter.
    pub reduced: bool,
    /// Whether a 2×2 max-pool follows the stage.
    pub pooled: bool,
}

/// The five convolution stages, in forward order. The backward engine walks
/// this same table in reverse.
pub(crate) const STAGES: [StageSpec; 5] = [
    StageSpec { kernel: 5, pad: 2, reduced: false, pooled: true },
    StageSpec { kernel: 3, pad: 1, reduced: true, pooled: true },
    StageSpec { kernel: 3, pad: 1, reduced: true, pooled: true },
    StageSpec { kernel: 3, pad: 1, reduced: true, pooled: false },
    StageSpec { kernel: 3, pad: 1, reduced: true, pooled: true },
];

/// The face-embedding network: owns its parameters and exposes the
/// forward/backward engines over them.
///
/// The engines are stateless between samples; every forward pass returns a
/// fresh [`ForwardCache`] that the paired backward pass consumes. Parameters
/// are only written by [`LightCnn9::apply_gradients`], between complete
/// forward/backward cycles.
pub struct LightCnn9 {
    params: NetworkParameters,
}

impl LightCnn9 {
    /// Create a network with randomly initialized parameters.
    pub fn new(num_classes: usize, rng: &mut SimpleRng) -> Self {
        Self {
            params: NetworkParameters::random(num_classes, rng),
        }
    }

    /// Wrap an existing parameter set.
    pub fn from_params(params: NetworkParameters) -> Self {
        Self { params }
    }

    /// Reconstruct a network from a serialized parameter blob.
    pub fn from_blob(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            params: NetworkParameters::from_blob(bytes)?,
        })
    }

    /// Serialize the full parameter set to an opaque blob.
    pub fn to_blob(&self) -> Vec<u8> {
        self.params.to_blob()
    }

    /// Write the parameter blob to a file.
    pub fn save(&self, path: &str) -> Result<()> {
        self.params.save(path)
    }

    /// Load a network from a parameter file.
    pub fn load(path: &str) -> Result<Self> {
        Ok(Self {
            params: NetworkParameters::load(path)?,
        })
    }

    pub fn params(&self) -> &NetworkParameters {
        &self.params
    }

    pub fn num_classes(&self) -> usize {
        self.params.num_classes()
    }

    /// Run the forward pass on one sample, producing the class scores and
    /// every intermediate activation and location mask the backward pass
    /// needs. Does not mutate the parameters.
    pub fn forward(&self, image: &Tensor3D) -> Result<ForwardCache> {
        forward::run(&self.params, image)
    }

    /// Index of the highest-scoring class for one image.
    pub fn classify(&self, image: &Tensor3D) -> Result<usize> {
        let cache = self.forward(image)?;
        let scores = cache.scores();
        let mut best = 0;
        for (j, &score) in scores.iter().enumerate().skip(1) {
            if score > scores[best] {
                best = j;
            }
        }
        Ok(best)
    }

    /// Cross-entropy loss of a forward pass against a label vector.
    pub fn loss(&self, cache: &ForwardCache, label: &[f64]) -> Result<f64> {
        let probabilities = crate::ops::softmax(cache.scores())?;
        crate::ops::cross_entropy(&probabilities, label)
    }

    /// Walk the topology in reverse, computing the gradient of the
    /// cross-entropy loss with respect to every parameter tensor. Performs
    /// no parameter update.
    pub fn backward(&self, cache: &ForwardCache, label: &[f64]) -> Result<Gradients> {
        backward::run(&self.params, cache, label)
    }

    /// Apply one optimizer step to every parameter from the given
    /// gradients.
    pub fn apply_gradients(&mut self, grads: &Gradients, optimizer: &mut dyn Optimizer) {
        self.params.apply(grads, optimizer);
    }
}
