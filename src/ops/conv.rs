//! Zero-padding and valid convolution, with hand-derived gradients
//!
//! The forward convolution follows the patch-matrix formulation: every
//! spatial patch of the input is flattened into one row of a 2-D matrix,
//! and each output channel is a matrix-vector product of that patch matrix
//! with the channel's flattened filter, plus the channel bias.
//!
//! The backward direction is split into three operators mirroring the
//! analytic derivation:
//! - weight gradient: one single-channel valid convolution per
//!   `(out_channel, in_channel)` pair, with the upstream gradient channel
//!   acting as the kernel over the forward input channel;
//! - bias gradient: spatial sum of the upstream gradient per channel;
//! - input gradient: full convolution of the upstream gradient with the
//!   180°-rotated, channel-transposed filter bank, cropped back to the
//!   unpadded input extent.

use crate::error::{ModelError, Result};
use crate::tensor::{FilterBank, Tensor3D};

/// Enlarge the first two dimensions of `input` by `2 * margin`, zero-filling
/// the border and centering the original data.
///
/// # Errors
///
/// `InvalidArgument` if `margin` is zero.
pub fn pad(input: &Tensor3D, margin: usize) -> Result<Tensor3D> {
    if margin == 0 {
        return Err(ModelError::InvalidArgument {
            op: "pad",
            details: "pad width must be positive".to_string(),
        });
    }

    let (rows, cols, channels) = input.shape();
    let mut output = Tensor3D::zeros(rows + 2 * margin, cols + 2 * margin, channels);
    for r in 0..rows {
        for c in 0..cols {
            for k in 0..channels {
                output.set(r + margin, c + margin, k, input.get(r, c, k));
            }
        }
    }
    Ok(output)
}

/// Remove a border of width `margin` from the first two dimensions.
///
/// This is the inverse of [`pad`] and the adjoint of padding: gradient at a
/// padded tensor is routed back to the unpadded region by dropping the
/// border.
pub fn crop(input: &Tensor3D, margin: usize) -> Result<Tensor3D> {
    let (rows, cols, channels) = input.shape();
    if margin == 0 || 2 * margin >= rows || 2 * margin >= cols {
        return Err(ModelError::InvalidArgument {
            op: "crop",
            details: format!("cannot crop {} from a {}x{} extent", margin, rows, cols),
        });
    }

    let mut output = Tensor3D::zeros(rows - 2 * margin, cols - 2 * margin, channels);
    for r in 0..output.rows() {
        for c in 0..output.cols() {
            for k in 0..channels {
                output.set(r, c, k, input.get(r + margin, c + margin, k));
            }
        }
    }
    Ok(output)
}

/// Valid convolution with stride 1 and no implicit padding.
///
/// Output spatial extent is `input - filter + 1` per dimension; the output
/// channel count is the bank's `out_channels`.
///
/// The implementation extracts every spatial patch of the input into a row
/// of a patch matrix, then computes one patch-matrix × filter-vector
/// product per output channel with the bias broadcast over the map.
///
/// # Errors
///
/// `ShapeMismatch` if the input channel count differs from the bank's
/// `in_channels`, the bias length differs from `out_channels`, or the
/// filter exceeds the input extent.
pub fn convolve(input: &Tensor3D, bank: &FilterBank) -> Result<Tensor3D> {
    if input.channels() != bank.in_channels() {
        return Err(ModelError::ShapeMismatch {
            op: "convolve",
            details: format!(
                "input has {} channels, filter bank expects {}",
                input.channels(),
                bank.in_channels()
            ),
        });
    }
    if bank.biases.len() != bank.out_channels() {
        return Err(ModelError::ShapeMismatch {
            op: "convolve",
            details: format!(
                "bias length {} does not match {} output channels",
                bank.biases.len(),
                bank.out_channels()
            ),
        });
    }
    if bank.rows() > input.rows() || bank.cols() > input.cols() {
        return Err(ModelError::ShapeMismatch {
            op: "convolve",
            details: format!(
                "filter {}x{} exceeds input extent {}x{}",
                bank.rows(),
                bank.cols(),
                input.rows(),
                input.cols()
            ),
        });
    }

    let out_rows = input.rows() - bank.rows() + 1;
    let out_cols = input.cols() - bank.cols() + 1;
    let in_channels = bank.in_channels();
    let out_channels = bank.out_channels();
    let patch_len = bank.rows() * bank.cols() * in_channels;

    // Patch matrix: one flattened input patch per output position.
    let mut patches = vec![0.0f64; out_rows * out_cols * patch_len];
    for oy in 0..out_rows {
        for ox in 0..out_cols {
            let row = &mut patches[(oy * out_cols + ox) * patch_len..][..patch_len];
            let mut p = 0;
            for ky in 0..bank.rows() {
                for kx in 0..bank.cols() {
                    for ic in 0..in_channels {
                        row[p] = input.get(oy + ky, ox + kx, ic);
                        p += 1;
                    }
                }
            }
        }
    }

    let mut output = Tensor3D::zeros(out_rows, out_cols, out_channels);
    let mut filter = vec![0.0f64; patch_len];
    for oc in 0..out_channels {
        // Flatten this output channel's filter in patch order.
        let mut p = 0;
        for ky in 0..bank.rows() {
            for kx in 0..bank.cols() {
                for ic in 0..in_channels {
                    filter[p] = bank.weight(ky, kx, ic, oc);
                    p += 1;
                }
            }
        }

        let bias = bank.biases[oc];
        let out = output.data_mut();
        for (pos, patch) in patches.chunks_exact(patch_len).enumerate() {
            let mut sum = bias;
            for (a, b) in patch.iter().zip(filter.iter()) {
                sum += a * b;
            }
            out[pos * out_channels + oc] = sum;
        }
    }
    Ok(output)
}

// Single-channel valid convolution: `kernel` channel `kc` slides over
// `input` channel `ic`. Returns the flat (in - kernel + 1)^2 plane.
fn plane_valid_conv(input: &Tensor3D, ic: usize, kernel: &Tensor3D, kc: usize) -> Vec<f64> {
    let out_rows = input.rows() - kernel.rows() + 1;
    let out_cols = input.cols() - kernel.cols() + 1;
    let mut plane = vec![0.0f64; out_rows * out_cols];
    for oy in 0..out_rows {
        for ox in 0..out_cols {
            let mut sum = 0.0;
            for ky in 0..kernel.rows() {
                for kx in 0..kernel.cols() {
                    sum += input.get(oy + ky, ox + kx, ic) * kernel.get(ky, kx, kc);
                }
            }
            plane[oy * out_cols + ox] = sum;
        }
    }
    plane
}

/// Weight and bias gradients of a valid convolution.
///
/// `input` is the tensor the forward convolution actually consumed (already
/// padded when the stage pads), `upstream` the gradient at the convolution
/// output. The returned bank holds the weight gradients in its `weights`
/// and the bias gradients in its `biases`.
///
/// The weight gradient for `(out_channel, in_channel)` is a single-channel
/// valid convolution of the input channel with the upstream channel as
/// kernel, computed pair by pair. The bias gradient per channel is the
/// spatial sum of the upstream gradient.
pub fn convolve_param_gradients(
    input: &Tensor3D,
    upstream: &Tensor3D,
    kernel_rows: usize,
    kernel_cols: usize,
) -> Result<FilterBank> {
    if upstream.rows() > input.rows() || upstream.cols() > input.cols() {
        return Err(ModelError::ShapeMismatch {
            op: "convolve_param_gradients",
            details: format!(
                "upstream extent {}x{} exceeds input extent {}x{}",
                upstream.rows(),
                upstream.cols(),
                input.rows(),
                input.cols()
            ),
        });
    }
    if input.rows() - upstream.rows() + 1 != kernel_rows
        || input.cols() - upstream.cols() + 1 != kernel_cols
    {
        return Err(ModelError::ShapeMismatch {
            op: "convolve_param_gradients",
            details: format!(
                "input {}x{} and upstream {}x{} do not correspond to a {}x{} kernel",
                input.rows(),
                input.cols(),
                upstream.rows(),
                upstream.cols(),
                kernel_rows,
                kernel_cols
            ),
        });
    }

    let in_channels = input.channels();
    let out_channels = upstream.channels();
    let mut grads = FilterBank::zeros(kernel_rows, kernel_cols, in_channels, out_channels);

    for oc in 0..out_channels {
        for ic in 0..in_channels {
            let plane = plane_valid_conv(input, ic, upstream, oc);
            for ky in 0..kernel_rows {
                for kx in 0..kernel_cols {
                    grads.set_weight(ky, kx, ic, oc, plane[ky * kernel_cols + kx]);
                }
            }
        }

        let mut sum = 0.0;
        for oy in 0..upstream.rows() {
            for ox in 0..upstream.cols() {
                sum += upstream.get(oy, ox, oc);
            }
        }
        grads.biases[oc] = sum;
    }
    Ok(grads)
}

// 180° spatial rotation with the channel axes swapped, so the result maps
// out_channels back to in_channels.
fn rotate_and_transpose(bank: &FilterBank) -> FilterBank {
    let mut flipped = FilterBank::zeros(
        bank.rows(),
        bank.cols(),
        bank.out_channels(),
        bank.in_channels(),
    );
    for r in 0..bank.rows() {
        for c in 0..bank.cols() {
            for ic in 0..bank.in_channels() {
                for oc in 0..bank.out_channels() {
                    flipped.set_weight(
                        bank.rows() - 1 - r,
                        bank.cols() - 1 - c,
                        oc,
                        ic,
                        bank.weight(r, c, ic, oc),
                    );
                }
            }
        }
    }
    flipped
}

/// Gradient of a valid convolution with respect to its unpadded input.
///
/// Computes the full convolution of `upstream` with the rotated,
/// channel-transposed bank: the upstream gradient is re-padded by
/// `kernel - 1` (skipped for 1×1 filters), valid-convolved, then cropped by
/// `forward_pad` to the unpadded input's spatial extent. The crop subsumes
/// the padding operator's adjoint.
pub fn convolve_input_gradient(
    upstream: &Tensor3D,
    bank: &FilterBank,
    forward_pad: usize,
) -> Result<Tensor3D> {
    if upstream.channels() != bank.out_channels() {
        return Err(ModelError::ShapeMismatch {
            op: "convolve_input_gradient",
            details: format!(
                "upstream has {} channels, filter bank produces {}",
                upstream.channels(),
                bank.out_channels()
            ),
        });
    }
    if bank.rows() != bank.cols() {
        return Err(ModelError::InvalidArgument {
            op: "convolve_input_gradient",
            details: format!("kernel must be square, got {}x{}", bank.rows(), bank.cols()),
        });
    }

    let flipped = rotate_and_transpose(bank);
    let full = if bank.rows() > 1 {
        let spread = pad(upstream, bank.rows() - 1)?;
        convolve(&spread, &flipped)?
    } else {
        convolve(upstream, &flipped)?
    };

    if forward_pad > 0 {
        crop(&full, forward_pad)
    } else {
        Ok(full)
    }
}
