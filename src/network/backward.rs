//! Analytic gradient engine
//!
//! Mirrors the forward graph in reverse over the same stage table. The
//! composite softmax/cross-entropy gradient seeds the walk at the class
//! scores; each stage then routes gradient backwards through its pooling
//! mask, MFM mask, main convolution, and reduction convolution, down to the
//! first convolution's weight and bias gradients. The gradient at the raw
//! image is never materialized; nothing consumes it.

use std::time::Instant;

use log::debug;

use crate::error::{ModelError, Result};
use crate::network::params::{Gradients, NetworkParameters};
use crate::network::{ForwardCache, STAGES};
use crate::ops;
use crate::tensor::Tensor3D;

pub(crate) fn run(
    params: &NetworkParameters,
    cache: &ForwardCache,
    label: &[f64],
) -> Result<Gradients> {
    if label.len() != params.num_classes() {
        return Err(ModelError::ShapeMismatch {
            op: "backward",
            details: format!(
                "label length {} does not match {} classes",
                label.len(),
                params.num_classes()
            ),
        });
    }

    let start = Instant::now();
    let mut grads = Gradients::zeros_like(params);

    // Dense head: composite softmax/cross-entropy gradient, classifier
    // stage, vector MFM, first dense stage.
    let probabilities = ops::softmax(cache.scores())?;
    let score_grad = ops::softmax_cross_entropy_gradient(&probabilities, label)?;
    let (fc2_grads, embedding_grad) = ops::dense_backward(&cache.embedding, &params.fc2, &score_grad)?;
    grads.fc2 = fc2_grads;
    let fc1_out_grad = ops::max_feature_map_vec_backward(&embedding_grad, &cache.fc1_mask)?;
    let (fc1_grads, flat_grad) = ops::dense_backward(&cache.flat, &params.fc1, &fc1_out_grad)?;
    grads.fc1 = fc1_grads;

    let (rows, cols, channels) = cache.flat_shape;
    let mut upstream = Tensor3D::from_vec(rows, cols, channels, flat_grad);

    for (index, spec) in STAGES.iter().enumerate().rev() {
        let stage_no = index + 1;
        let (main_bank, reduction_bank) = params.stage_banks(stage_no);
        let trace = &cache.stages[index];

        if let Some(mask) = &trace.pool_mask {
            upstream = ops::max_pool_2x2_backward(&upstream, mask)?;
        }
        upstream = ops::max_feature_map_backward(&upstream, &trace.mfm_mask)?;

        let main_grads = ops::convolve_param_gradients(
            &trace.conv_input,
            &upstream,
            main_bank.rows(),
            main_bank.cols(),
        )?;
        *grads.stage_banks_mut(stage_no).0 = main_grads;

        let (Some(bank), Some(mask), Some(input)) = (
            reduction_bank,
            &trace.reduction_mask,
            &trace.reduction_input,
        ) else {
            // Stage 1: weight and bias gradients are the end of the walk.
            break;
        };

        let cropped = ops::convolve_input_gradient(&upstream, main_bank, spec.pad)?;
        let reduced_grad = ops::max_feature_map_backward(&cropped, mask)?;
        let reduction_grads =
            ops::convolve_param_gradients(input, &reduced_grad, bank.rows(), bank.cols())?;
        *grads
            .stage_banks_mut(stage_no)
            .1
            .expect("reduced stage has a reduction slot") = reduction_grads;
        upstream = ops::convolve_input_gradient(&reduced_grad, bank, 0)?;
    }

    debug!("backward pass took {:?}", start.elapsed());
    Ok(grads)
}
