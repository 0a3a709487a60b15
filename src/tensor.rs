//! Dense tensor buffers shared by every operator
//!
//! All data lives in flat `Vec<f64>` buffers with manual index arithmetic.
//! `Tensor3D` is indexed `(row, col, channel)` with the channel innermost,
//! so flattening a feature map for the dense head is the identity on the
//! underlying buffer.

/// A dense 3-D array of `f64` indexed by `(row, col, channel)`.
///
/// Represents an image or a feature map. All three dimensions are positive;
/// operators document the required relations between input and output shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3D {
    rows: usize,
    cols: usize,
    channels: usize,
    data: Vec<f64>,
}

impl Tensor3D {
    /// Create a zero-filled tensor.
    ///
    /// # Panics
    ///
    /// Panics if any dimension is zero.
    pub fn zeros(rows: usize, cols: usize, channels: usize) -> Self {
        assert!(
            rows > 0 && cols > 0 && channels > 0,
            "tensor dimensions must be positive, got {}x{}x{}",
            rows,
            cols,
            channels
        );
        Self {
            rows,
            cols,
            channels,
            data: vec![0.0; rows * cols * channels],
        }
    }

    /// Wrap an existing buffer. The buffer length must equal
    /// `rows * cols * channels`.
    pub fn from_vec(rows: usize, cols: usize, channels: usize, data: Vec<f64>) -> Self {
        assert!(rows > 0 && cols > 0 && channels > 0);
        assert_eq!(
            data.len(),
            rows * cols * channels,
            "buffer length does not match {}x{}x{}",
            rows,
            cols,
            channels
        );
        Self {
            rows,
            cols,
            channels,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Shape as `(rows, cols, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.rows, self.cols, self.channels)
    }

    #[inline]
    fn offset(&self, row: usize, col: usize, channel: usize) -> usize {
        (row * self.cols + col) * self.channels + channel
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize, channel: usize) -> f64 {
        self.data[self.offset(row, col, channel)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, channel: usize, value: f64) {
        let i = self.offset(row, col, channel);
        self.data[i] = value;
    }

    /// Flat view in `(row, col, channel)` order, channel innermost.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Consume the tensor, yielding its flat buffer. This is the flatten
    /// operation for the dense head: memory order already matches.
    pub fn into_flat(self) -> Vec<f64> {
        self.data
    }
}

/// A boolean tensor marking which input elements attained the maximum during
/// a max-feature-map or max-pooling reduction.
///
/// Same shape as the reduction's input. Ties are all marked true: the
/// backward pass replicates gradient to every tied position rather than
/// splitting it.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask3D {
    rows: usize,
    cols: usize,
    channels: usize,
    data: Vec<bool>,
}

impl Mask3D {
    pub fn falses(rows: usize, cols: usize, channels: usize) -> Self {
        assert!(rows > 0 && cols > 0 && channels > 0);
        Self {
            rows,
            cols,
            channels,
            data: vec![false; rows * cols * channels],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.rows, self.cols, self.channels)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize, channel: usize) -> bool {
        self.data[(row * self.cols + col) * self.channels + channel]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, channel: usize, value: bool) {
        let i = (row * self.cols + col) * self.channels + channel;
        self.data[i] = value;
    }

    pub fn data(&self) -> &[bool] {
        &self.data
    }
}

/// Learnable kernel of one convolution stage: 4-D weights
/// `(rows, cols, in_channels, out_channels)` paired with one bias per
/// output channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    rows: usize,
    cols: usize,
    in_channels: usize,
    out_channels: usize,
    /// Flat weights, `out_channels` innermost:
    /// `((row * cols + col) * in_channels + ic) * out_channels + oc`.
    pub weights: Vec<f64>,
    /// One bias per output channel.
    pub biases: Vec<f64>,
}

impl FilterBank {
    pub fn zeros(rows: usize, cols: usize, in_channels: usize, out_channels: usize) -> Self {
        assert!(rows > 0 && cols > 0 && in_channels > 0 && out_channels > 0);
        Self {
            rows,
            cols,
            in_channels,
            out_channels,
            weights: vec![0.0; rows * cols * in_channels * out_channels],
            biases: vec![0.0; out_channels],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    #[inline]
    pub fn weight(&self, row: usize, col: usize, ic: usize, oc: usize) -> f64 {
        self.weights[((row * self.cols + col) * self.in_channels + ic) * self.out_channels + oc]
    }

    #[inline]
    pub fn set_weight(&mut self, row: usize, col: usize, ic: usize, oc: usize, value: f64) {
        let i = ((row * self.cols + col) * self.in_channels + ic) * self.out_channels + oc;
        self.weights[i] = value;
    }

    /// Total number of trainable parameters (weights plus biases).
    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

/// Weights of one fully-connected stage: a `(input_size, output_size)`
/// row-major matrix and a bias of length `output_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseParams {
    input_size: usize,
    output_size: usize,
    /// Flat row-major weights: `i * output_size + j`.
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

impl DenseParams {
    pub fn zeros(input_size: usize, output_size: usize) -> Self {
        assert!(input_size > 0 && output_size > 0);
        Self {
            input_size,
            output_size,
            weights: vec![0.0; input_size * output_size],
            biases: vec![0.0; output_size],
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_index_order_channel_innermost() {
        let mut t = Tensor3D::zeros(2, 3, 4);
        t.set(1, 2, 3, 7.0);
        // (1 * 3 + 2) * 4 + 3 = 23, the last element
        assert_eq!(t.data()[23], 7.0);
    }

    #[test]
    fn test_tensor_flatten_is_identity() {
        let data: Vec<f64> = (0..24).map(|v| v as f64).collect();
        let t = Tensor3D::from_vec(2, 3, 4, data.clone());
        assert_eq!(t.into_flat(), data);
    }

    #[test]
    #[should_panic]
    fn test_tensor_zero_dimension_rejected() {
        let _ = Tensor3D::zeros(0, 3, 4);
    }

    #[test]
    fn test_filter_bank_weight_layout() {
        let mut bank = FilterBank::zeros(3, 3, 2, 5);
        bank.set_weight(2, 2, 1, 4, 1.5);
        // last weight slot
        assert_eq!(bank.weights[3 * 3 * 2 * 5 - 1], 1.5);
        assert_eq!(bank.weight(2, 2, 1, 4), 1.5);
    }

    #[test]
    fn test_parameter_counts() {
        let bank = FilterBank::zeros(5, 5, 1, 96);
        assert_eq!(bank.parameter_count(), 5 * 5 * 96 + 96);
        let dense = DenseParams::zeros(8192, 512);
        assert_eq!(dense.parameter_count(), 8192 * 512 + 512);
    }
}
