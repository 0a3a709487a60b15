//! Forward inference pass
//!
//! Composes the primitive operators along the stage table: five convolution
//! stages (reduction convolution + MFM where the table says so, then pad,
//! main convolution, MFM, and pooling), followed by the dense head
//! (flatten, dense, vector MFM to the embedding, dense to class scores).

use std::time::Instant;

use log::debug;

use crate::error::{ModelError, Result};
use crate::network::params::NetworkParameters;
use crate::network::{INPUT_COLS, INPUT_ROWS, STAGES};
use crate::ops;
use crate::tensor::{Mask3D, Tensor3D};

/// Intermediates of one convolution stage kept for the backward pass.
pub(crate) struct StageTrace {
    /// Input to the 1×1 reduction convolution (absent for stage 1).
    pub reduction_input: Option<Tensor3D>,
    /// MFM mask after the reduction convolution.
    pub reduction_mask: Option<Mask3D>,
    /// Padded input actually fed to the main convolution.
    pub conv_input: Tensor3D,
    /// MFM mask after the main convolution.
    pub mfm_mask: Mask3D,
    /// Pooling mask, for pooled stages.
    pub pool_mask: Option<Mask3D>,
}

/// Everything one forward pass produced for one sample: the class scores
/// plus all intermediate activations and location masks. Owned by the
/// single forward/backward invocation and discarded afterwards.
pub struct ForwardCache {
    pub(crate) stages: Vec<StageTrace>,
    /// Shape of the pooled stage-5 output, for reshaping the head gradient.
    pub(crate) flat_shape: (usize, usize, usize),
    /// Flattened pooled stage-5 output, the first dense stage's input.
    pub(crate) flat: Vec<f64>,
    /// Vector MFM mask over the first dense stage's output.
    pub(crate) fc1_mask: Vec<bool>,
    /// The 256-wide face embedding, the classifier stage's input.
    pub(crate) embedding: Vec<f64>,
    scores: Vec<f64>,
}

impl ForwardCache {
    /// Raw class scores (pre-softmax logits).
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// The face embedding produced by the dense head.
    pub fn embedding(&self) -> &[f64] {
        &self.embedding
    }
}

pub(crate) fn run(params: &NetworkParameters, image: &Tensor3D) -> Result<ForwardCache> {
    if image.shape() != (INPUT_ROWS, INPUT_COLS, 1) {
        return Err(ModelError::ShapeMismatch {
            op: "forward",
            details: format!(
                "expected a {}x{}x1 input, got {:?}",
                INPUT_ROWS,
                INPUT_COLS,
                image.shape()
            ),
        });
    }

    let start = Instant::now();
    let mut stages = Vec::with_capacity(STAGES.len());
    let mut current = image.clone();

    for (index, spec) in STAGES.iter().enumerate() {
        let stage_no = index + 1;
        let (main_bank, reduction_bank) = params.stage_banks(stage_no);

        let mut reduction_input = None;
        let mut reduction_mask = None;
        if let Some(bank) = reduction_bank {
            let reduced = ops::convolve(&current, bank)?;
            let (mfm, mask) = ops::max_feature_map(&reduced)?;
            reduction_input = Some(std::mem::replace(&mut current, mfm));
            reduction_mask = Some(mask);
        }

        let conv_input = ops::pad(&current, spec.pad)?;
        let conv = ops::convolve(&conv_input, main_bank)?;
        let (mfm, mfm_mask) = ops::max_feature_map(&conv)?;

        let mut pool_mask = None;
        current = if spec.pooled {
            let (pooled, mask) = ops::max_pool_2x2(&mfm)?;
            pool_mask = Some(mask);
            pooled
        } else {
            mfm
        };

        stages.push(StageTrace {
            reduction_input,
            reduction_mask,
            conv_input,
            mfm_mask,
            pool_mask,
        });
    }

    let flat_shape = current.shape();
    let flat = current.into_flat();
    let fc1_out = ops::dense_project(&flat, &params.fc1)?;
    let (embedding, fc1_mask) = ops::max_feature_map_vec(&fc1_out)?;
    let scores = ops::dense_project(&embedding, &params.fc2)?;

    debug!("forward pass took {:?}", start.elapsed());
    Ok(ForwardCache {
        stages,
        flat_shape,
        flat,
        fc1_mask,
        embedding,
        scores,
    })
}
