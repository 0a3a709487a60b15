// Tests for the primitive tensor operators: padding, convolution,
// max-feature-map, max-pooling, dense projection, softmax, and
// cross-entropy, including their shape and argument contracts.

use approx::assert_relative_eq;

use light_cnn::error::ModelError;
use light_cnn::ops;
use light_cnn::tensor::{DenseParams, FilterBank, Tensor3D};

// ============================================================================
// pad / crop
// ============================================================================

#[test]
fn test_pad_grows_both_spatial_dimensions() {
    let t = Tensor3D::from_vec(2, 3, 1, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let padded = ops::pad(&t, 2).unwrap();

    assert_eq!(padded.shape(), (6, 7, 1));
    // border is zero, center is the original
    assert_eq!(padded.get(0, 0, 0), 0.0);
    assert_eq!(padded.get(5, 6, 0), 0.0);
    assert_eq!(padded.get(2, 2, 0), 1.0);
    assert_eq!(padded.get(3, 4, 0), 6.0);
}

#[test]
fn test_crop_recovers_padded_tensor() {
    let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
    let t = Tensor3D::from_vec(2, 2, 3, data);
    let padded = ops::pad(&t, 3).unwrap();
    let recovered = ops::crop(&padded, 3).unwrap();

    assert_eq!(recovered, t);
}

#[test]
fn test_pad_rejects_zero_width() {
    let t = Tensor3D::zeros(2, 2, 1);
    assert!(matches!(
        ops::pad(&t, 0),
        Err(ModelError::InvalidArgument { .. })
    ));
}

// ============================================================================
// convolve
// ============================================================================

#[test]
fn test_convolve_output_extent() {
    let input = Tensor3D::zeros(10, 8, 3);
    let bank = FilterBank::zeros(3, 3, 3, 5);
    let output = ops::convolve(&input, &bank).unwrap();

    // output extent = input extent - filter extent + 1
    assert_eq!(output.shape(), (8, 6, 5));
}

#[test]
fn test_convolve_known_values() {
    let input = Tensor3D::from_vec(
        3,
        3,
        1,
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
    );
    // identity on the top-left plus the bottom-right of each 2x2 window
    let mut bank = FilterBank::zeros(2, 2, 1, 1);
    bank.set_weight(0, 0, 0, 0, 1.0);
    bank.set_weight(1, 1, 0, 0, 1.0);
    bank.biases[0] = 0.5;

    let output = ops::convolve(&input, &bank).unwrap();
    assert_eq!(output.shape(), (2, 2, 1));
    assert_relative_eq!(output.get(0, 0, 0), 6.5);
    assert_relative_eq!(output.get(0, 1, 0), 8.5);
    assert_relative_eq!(output.get(1, 0, 0), 12.5);
    assert_relative_eq!(output.get(1, 1, 0), 14.5);
}

#[test]
fn test_convolve_sums_over_input_channels() {
    let input = Tensor3D::from_vec(1, 1, 2, vec![3.0, 4.0]);
    let mut bank = FilterBank::zeros(1, 1, 2, 1);
    bank.set_weight(0, 0, 0, 0, 1.0);
    bank.set_weight(0, 0, 1, 0, 10.0);

    let output = ops::convolve(&input, &bank).unwrap();
    assert_relative_eq!(output.get(0, 0, 0), 43.0);
}

#[test]
fn test_convolve_zero_input_zero_filter_collapses_to_single_position() {
    // 5x5 single-channel zeros through a zero-initialized 5x5x1->96 bank:
    // the output collapses to 1x1 (5 - 5 + 1) and stays all zero.
    let input = Tensor3D::zeros(5, 5, 1);
    let bank = FilterBank::zeros(5, 5, 1, 96);

    let output = ops::convolve(&input, &bank).unwrap();
    assert_eq!(output.shape(), (1, 1, 96));
    assert!(output.data().iter().all(|&v| v == 0.0));
}

#[test]
fn test_convolve_rejects_channel_mismatch() {
    let input = Tensor3D::zeros(4, 4, 3);
    let bank = FilterBank::zeros(3, 3, 2, 4);
    assert!(matches!(
        ops::convolve(&input, &bank),
        Err(ModelError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_convolve_rejects_tampered_bias_length() {
    let input = Tensor3D::zeros(4, 4, 1);
    let mut bank = FilterBank::zeros(3, 3, 1, 4);
    bank.biases.pop();
    assert!(matches!(
        ops::convolve(&input, &bank),
        Err(ModelError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_convolve_rejects_oversized_filter() {
    let input = Tensor3D::zeros(2, 2, 1);
    let bank = FilterBank::zeros(3, 3, 1, 1);
    assert!(matches!(
        ops::convolve(&input, &bank),
        Err(ModelError::ShapeMismatch { .. })
    ));
}

// ============================================================================
// max-feature-map
// ============================================================================

#[test]
fn test_max_feature_map_vec_halves_and_masks() {
    let input = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
    let (output, mask) = ops::max_feature_map_vec(&input).unwrap();

    assert_eq!(output, vec![5.0, 6.0, 7.0, 8.0]);
    assert_eq!(
        mask,
        vec![false, false, false, false, true, true, true, true]
    );
}

#[test]
fn test_max_feature_map_vec_marks_every_tie() {
    let (output, mask) = ops::max_feature_map_vec(&[2.0, 2.0]).unwrap();
    assert_eq!(output, vec![2.0]);
    assert_eq!(mask, vec![true, true]);
}

#[test]
fn test_max_feature_map_tensor() {
    let input = Tensor3D::from_vec(1, 1, 4, vec![1.0, 7.0, 7.0, 3.0]);
    let (output, mask) = ops::max_feature_map(&input).unwrap();

    assert_eq!(output.shape(), (1, 1, 2));
    assert_eq!(output.get(0, 0, 0), 7.0);
    assert_eq!(output.get(0, 0, 1), 7.0);
    assert!(!mask.get(0, 0, 0));
    assert!(mask.get(0, 0, 1));
    assert!(mask.get(0, 0, 2));
    assert!(!mask.get(0, 0, 3));
}

#[test]
fn test_max_feature_map_rejects_odd_channels() {
    let t = Tensor3D::zeros(2, 2, 3);
    assert!(matches!(
        ops::max_feature_map(&t),
        Err(ModelError::InvalidArgument { .. })
    ));
    assert!(matches!(
        ops::max_feature_map_vec(&[1.0, 2.0, 3.0]),
        Err(ModelError::InvalidArgument { .. })
    ));
}

// ============================================================================
// max-pooling
// ============================================================================

#[test]
fn test_max_pool_2x2_known_values() {
    let input = Tensor3D::from_vec(
        4,
        4,
        1,
        vec![
            1.0, 2.0, 5.0, 6.0, //
            3.0, 4.0, 8.0, 7.0, //
            9.0, 1.0, 0.0, 2.0, //
            2.0, 6.0, 3.0, 1.0,
        ],
    );
    let (output, mask) = ops::max_pool_2x2(&input).unwrap();

    assert_eq!(output.shape(), (2, 2, 1));
    assert_eq!(output.get(0, 0, 0), 4.0);
    assert_eq!(output.get(0, 1, 0), 8.0);
    assert_eq!(output.get(1, 0, 0), 9.0);
    assert_eq!(output.get(1, 1, 0), 3.0);

    // exactly one max per window here
    let marked: usize = mask.data().iter().filter(|&&m| m).count();
    assert_eq!(marked, 4);
    assert!(mask.get(1, 1, 0));
    assert!(mask.get(1, 2, 0));
    assert!(mask.get(2, 0, 0));
    assert!(mask.get(3, 2, 0));
}

#[test]
fn test_max_pool_rejects_odd_spatial_extent() {
    let t = Tensor3D::zeros(3, 4, 1);
    assert!(matches!(
        ops::max_pool_2x2(&t),
        Err(ModelError::InvalidArgument { .. })
    ));
}

// ============================================================================
// dense projection
// ============================================================================

#[test]
fn test_dense_project_known_values() {
    let mut params = DenseParams::zeros(2, 3);
    params.weights = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    params.biases = vec![0.1, 0.2, 0.3];

    let output = ops::dense_project(&[1.0, 2.0], &params).unwrap();
    assert_relative_eq!(output[0], 9.1);
    assert_relative_eq!(output[1], 12.2);
    assert_relative_eq!(output[2], 15.3);
}

#[test]
fn test_dense_project_rejects_length_mismatch() {
    let params = DenseParams::zeros(4, 2);
    assert!(matches!(
        ops::dense_project(&[1.0, 2.0], &params),
        Err(ModelError::ShapeMismatch { .. })
    ));
}

// ============================================================================
// softmax / cross-entropy
// ============================================================================

#[test]
fn test_softmax_sums_to_one() {
    let output = ops::softmax(&[0.5, -1.0, 3.0, 2.0]).unwrap();
    let sum: f64 = output.iter().sum();
    assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
}

#[test]
fn test_softmax_is_shift_invariant() {
    let base = ops::softmax(&[0.1, 0.9, -0.4]).unwrap();
    let shifted = ops::softmax(&[100.1, 100.9, 99.6]).unwrap();
    for (a, b) in base.iter().zip(shifted.iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }
}

#[test]
fn test_softmax_survives_large_scores() {
    let output = ops::softmax(&[1000.0, 1001.0, 1002.0]).unwrap();
    assert!(output.iter().all(|v| v.is_finite()));
    let sum: f64 = output.iter().sum();
    assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
}

#[test]
fn test_softmax_rejects_empty_input() {
    assert!(matches!(
        ops::softmax(&[]),
        Err(ModelError::InvalidArgument { .. })
    ));
}

#[test]
fn test_cross_entropy_known_value() {
    let loss = ops::cross_entropy(&[0.5, 0.5], &[1.0, 0.0]).unwrap();
    assert_relative_eq!(loss, std::f64::consts::LN_2, epsilon = 1e-12);
}

#[test]
fn test_cross_entropy_zero_probability_under_label_weight() {
    assert!(matches!(
        ops::cross_entropy(&[0.0, 1.0], &[1.0, 0.0]),
        Err(ModelError::DomainError { .. })
    ));
    // zero probability where the label puts no weight is fine
    let loss = ops::cross_entropy(&[0.0, 1.0], &[0.0, 1.0]).unwrap();
    assert_relative_eq!(loss, 0.0);
}

#[test]
fn test_cross_entropy_rejects_length_mismatch() {
    assert!(matches!(
        ops::cross_entropy(&[0.5, 0.5], &[1.0]),
        Err(ModelError::ShapeMismatch { .. })
    ));
}
