//! Max-feature-map reduction, tensor and flattened-vector forms
//!
//! The channel dimension (or vector) is split in half and reduced by
//! element-wise maximum, acting as a learned competitive activation. The
//! returned location mask covers the original extent and marks, by equality
//! with the broadcast maximum, every element that attained the max; ties are
//! all marked and receive replicated gradient.

use crate::error::{ModelError, Result};
use crate::tensor::{Mask3D, Tensor3D};

/// Channel-halving max reduction over a feature map.
///
/// # Errors
///
/// `InvalidArgument` if the channel count is odd.
pub fn max_feature_map(input: &Tensor3D) -> Result<(Tensor3D, Mask3D)> {
    let (rows, cols, channels) = input.shape();
    if channels % 2 != 0 {
        return Err(ModelError::InvalidArgument {
            op: "max_feature_map",
            details: format!("channel count {} is not even", channels),
        });
    }

    let half = channels / 2;
    let mut output = Tensor3D::zeros(rows, cols, half);
    let mut mask = Mask3D::falses(rows, cols, channels);
    for r in 0..rows {
        for c in 0..cols {
            for k in 0..half {
                let low = input.get(r, c, k);
                let high = input.get(r, c, k + half);
                let max = low.max(high);
                output.set(r, c, k, max);
                mask.set(r, c, k, low == max);
                mask.set(r, c, k + half, high == max);
            }
        }
    }
    Ok((output, mask))
}

/// Adjoint of [`max_feature_map`]: the upstream gradient (half the
/// channels) is duplicated to both halves, then gated by the mask.
pub fn max_feature_map_backward(upstream: &Tensor3D, mask: &Mask3D) -> Result<Tensor3D> {
    let (rows, cols, channels) = mask.shape();
    if upstream.rows() != rows || upstream.cols() != cols || upstream.channels() * 2 != channels {
        return Err(ModelError::ShapeMismatch {
            op: "max_feature_map_backward",
            details: format!(
                "upstream {:?} does not halve mask {:?}",
                upstream.shape(),
                mask.shape()
            ),
        });
    }

    let half = channels / 2;
    let mut output = Tensor3D::zeros(rows, cols, channels);
    for r in 0..rows {
        for c in 0..cols {
            for k in 0..half {
                let g = upstream.get(r, c, k);
                if mask.get(r, c, k) {
                    output.set(r, c, k, g);
                }
                if mask.get(r, c, k + half) {
                    output.set(r, c, k + half, g);
                }
            }
        }
    }
    Ok(output)
}

/// 1-D analogue of [`max_feature_map`] for flattened dense activations.
pub fn max_feature_map_vec(input: &[f64]) -> Result<(Vec<f64>, Vec<bool>)> {
    if input.is_empty() || input.len() % 2 != 0 {
        return Err(ModelError::InvalidArgument {
            op: "max_feature_map_vec",
            details: format!("length {} is not a positive even number", input.len()),
        });
    }

    let half = input.len() / 2;
    let mut output = vec![0.0f64; half];
    let mut mask = vec![false; input.len()];
    for i in 0..half {
        let max = input[i].max(input[i + half]);
        output[i] = max;
        mask[i] = input[i] == max;
        mask[i + half] = input[i + half] == max;
    }
    Ok((output, mask))
}

/// Adjoint of [`max_feature_map_vec`].
pub fn max_feature_map_vec_backward(upstream: &[f64], mask: &[bool]) -> Result<Vec<f64>> {
    if upstream.len() * 2 != mask.len() {
        return Err(ModelError::ShapeMismatch {
            op: "max_feature_map_vec_backward",
            details: format!(
                "upstream length {} does not halve mask length {}",
                upstream.len(),
                mask.len()
            ),
        });
    }

    let half = upstream.len();
    let mut output = vec![0.0f64; mask.len()];
    for i in 0..half {
        if mask[i] {
            output[i] = upstream[i];
        }
        if mask[i + half] {
            output[i + half] = upstream[i];
        }
    }
    Ok(output)
}
