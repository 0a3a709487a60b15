//! Non-overlapping 2×2 max-pooling with location masks

use crate::error::{ModelError, Result};
use crate::tensor::{Mask3D, Tensor3D};

/// 2×2 max-pooling with stride 2 over the spatial dimensions.
///
/// Returns the pooled tensor (half the spatial extent, same channels) and a
/// mask over the original shape marking every element equal to its window's
/// maximum.
///
/// # Errors
///
/// `InvalidArgument` if either spatial dimension is odd.
pub fn max_pool_2x2(input: &Tensor3D) -> Result<(Tensor3D, Mask3D)> {
    let (rows, cols, channels) = input.shape();
    if rows % 2 != 0 || cols % 2 != 0 {
        return Err(ModelError::InvalidArgument {
            op: "max_pool_2x2",
            details: format!("spatial extent {}x{} is not even", rows, cols),
        });
    }

    let mut output = Tensor3D::zeros(rows / 2, cols / 2, channels);
    let mut mask = Mask3D::falses(rows, cols, channels);
    for py in 0..rows / 2 {
        for px in 0..cols / 2 {
            for k in 0..channels {
                let mut max = f64::NEG_INFINITY;
                for dy in 0..2 {
                    for dx in 0..2 {
                        let v = input.get(py * 2 + dy, px * 2 + dx, k);
                        if v > max {
                            max = v;
                        }
                    }
                }
                output.set(py, px, k, max);
                for dy in 0..2 {
                    for dx in 0..2 {
                        let y = py * 2 + dy;
                        let x = px * 2 + dx;
                        mask.set(y, x, k, input.get(y, x, k) == max);
                    }
                }
            }
        }
    }
    Ok((output, mask))
}

/// Adjoint of [`max_pool_2x2`]: the upstream gradient is upsampled 2× by
/// nearest-neighbor repetition, then gated by the mask, routing gradient to
/// every position that attained its window's maximum.
pub fn max_pool_2x2_backward(upstream: &Tensor3D, mask: &Mask3D) -> Result<Tensor3D> {
    let (rows, cols, channels) = mask.shape();
    if upstream.rows() * 2 != rows
        || upstream.cols() * 2 != cols
        || upstream.channels() != channels
    {
        return Err(ModelError::ShapeMismatch {
            op: "max_pool_2x2_backward",
            details: format!(
                "upstream {:?} does not halve mask {:?}",
                upstream.shape(),
                mask.shape()
            ),
        });
    }

    let mut output = Tensor3D::zeros(rows, cols, channels);
    for y in 0..rows {
        for x in 0..cols {
            for k in 0..channels {
                if mask.get(y, x, k) {
                    output.set(y, x, k, upstream.get(y / 2, x / 2, k));
                }
            }
        }
    }
    Ok(output)
}
