//! Fully-connected projection and its gradients

use crate::error::{ModelError, Result};
use crate::tensor::DenseParams;

/// Linear projection `input · weights + biases` over a flattened input.
///
/// Callers flatten feature maps beforehand; memory order makes that the
/// identity on the buffer.
///
/// # Errors
///
/// `ShapeMismatch` if the input length differs from the weight matrix's
/// input dimension, or the bias length from its output dimension.
pub fn dense_project(input: &[f64], params: &DenseParams) -> Result<Vec<f64>> {
    if input.len() != params.input_size() {
        return Err(ModelError::ShapeMismatch {
            op: "dense_project",
            details: format!(
                "input length {} does not match weight input dimension {}",
                input.len(),
                params.input_size()
            ),
        });
    }
    if params.biases.len() != params.output_size() {
        return Err(ModelError::ShapeMismatch {
            op: "dense_project",
            details: format!(
                "bias length {} does not match output dimension {}",
                params.biases.len(),
                params.output_size()
            ),
        });
    }

    let out_len = params.output_size();
    let mut output = params.biases.clone();
    for (i, &x) in input.iter().enumerate() {
        let row = &params.weights[i * out_len..(i + 1) * out_len];
        for (o, w) in output.iter_mut().zip(row.iter()) {
            *o += x * w;
        }
    }
    Ok(output)
}

/// Adjoint of [`dense_project`].
///
/// Given the upstream gradient `g`: the weight gradient is the outer
/// product of the input with `g`, the bias gradient is `g` itself, and the
/// input gradient is `weights · g`. The parameter gradients are returned in
/// a `DenseParams` container of the same shape.
pub fn dense_backward(
    input: &[f64],
    params: &DenseParams,
    upstream: &[f64],
) -> Result<(DenseParams, Vec<f64>)> {
    if input.len() != params.input_size() {
        return Err(ModelError::ShapeMismatch {
            op: "dense_backward",
            details: format!(
                "input length {} does not match weight input dimension {}",
                input.len(),
                params.input_size()
            ),
        });
    }
    if upstream.len() != params.output_size() {
        return Err(ModelError::ShapeMismatch {
            op: "dense_backward",
            details: format!(
                "upstream length {} does not match output dimension {}",
                upstream.len(),
                params.output_size()
            ),
        });
    }

    let out_len = params.output_size();
    let mut grads = DenseParams::zeros(params.input_size(), out_len);
    let mut input_grad = vec![0.0f64; input.len()];

    for (i, &x) in input.iter().enumerate() {
        let weight_row = &params.weights[i * out_len..(i + 1) * out_len];
        let grad_row = &mut grads.weights[i * out_len..(i + 1) * out_len];
        let mut acc = 0.0;
        for j in 0..out_len {
            let g = upstream[j];
            grad_row[j] = x * g;
            acc += weight_row[j] * g;
        }
        input_grad[i] = acc;
    }
    grads.biases.copy_from_slice(upstream);

    Ok((grads, input_grad))
}
