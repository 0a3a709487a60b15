// Tests for the hand-derived adjoints: gradient routing through location
// masks, the dense projection adjoint, both convolution gradient paths, and
// the fused softmax/cross-entropy gradient.

use approx::assert_relative_eq;

use light_cnn::ops;
use light_cnn::tensor::{DenseParams, FilterBank, Tensor3D};

// ============================================================================
// Location-mask routing
// ============================================================================

#[test]
fn test_mfm_vec_backward_routes_to_max_positions() {
    let input = vec![1.0, 9.0, 8.0, 2.0];
    let (_, mask) = ops::max_feature_map_vec(&input).unwrap();

    let routed = ops::max_feature_map_vec_backward(&[3.0, 5.0], &mask).unwrap();
    // halves pair (0,2) and (1,3): maxes came from positions 1 and 2
    assert_eq!(routed, vec![0.0, 5.0, 3.0, 0.0]);
}

#[test]
fn test_mfm_vec_backward_replicates_gradient_across_ties() {
    let (_, mask) = ops::max_feature_map_vec(&[2.0, 2.0]).unwrap();
    let routed = ops::max_feature_map_vec_backward(&[3.0], &mask).unwrap();

    // both tied positions receive the full gradient
    assert_eq!(routed, vec![3.0, 3.0]);
    let total: f64 = routed.iter().sum();
    assert_relative_eq!(total, 2.0 * 3.0);
}

#[test]
fn test_mfm_tensor_backward_routes_per_element() {
    let input = Tensor3D::from_vec(1, 2, 2, vec![1.0, 5.0, 4.0, 2.0]);
    let (_, mask) = ops::max_feature_map(&input).unwrap();

    let upstream = Tensor3D::from_vec(1, 2, 1, vec![10.0, 20.0]);
    let routed = ops::max_feature_map_backward(&upstream, &mask).unwrap();

    // position (0,0): channels (1, 5), max in the second half
    assert_eq!(routed.get(0, 0, 0), 0.0);
    assert_eq!(routed.get(0, 0, 1), 10.0);
    // position (0,1): channels (4, 2), max in the first half
    assert_eq!(routed.get(0, 1, 0), 20.0);
    assert_eq!(routed.get(0, 1, 1), 0.0);
}

#[test]
fn test_pool_backward_scatters_to_window_max() {
    let input = Tensor3D::from_vec(
        2,
        4,
        1,
        vec![
            1.0, 2.0, 5.0, 6.0, //
            3.0, 4.0, 8.0, 7.0,
        ],
    );
    let (_, mask) = ops::max_pool_2x2(&input).unwrap();

    let upstream = Tensor3D::from_vec(1, 2, 1, vec![0.5, 0.25]);
    let routed = ops::max_pool_2x2_backward(&upstream, &mask).unwrap();

    assert_eq!(routed.get(1, 1, 0), 0.5);
    assert_eq!(routed.get(1, 2, 0), 0.25);
    let total: f64 = routed.data().iter().sum();
    assert_relative_eq!(total, 0.75);
}

#[test]
fn test_pool_backward_replicates_gradient_across_tied_window() {
    let input = Tensor3D::from_vec(2, 2, 1, vec![7.0, 7.0, 7.0, 7.0]);
    let (_, mask) = ops::max_pool_2x2(&input).unwrap();

    let upstream = Tensor3D::from_vec(1, 1, 1, vec![2.0]);
    let routed = ops::max_pool_2x2_backward(&upstream, &mask).unwrap();

    // all four tied positions receive the gradient; the routed total is
    // the tie count times the upstream value
    assert!(routed.data().iter().all(|&g| g == 2.0));
    let total: f64 = routed.data().iter().sum();
    assert_relative_eq!(total, 4.0 * 2.0);
}

// ============================================================================
// Dense adjoint
// ============================================================================

#[test]
fn test_dense_backward_outer_product_and_input_gradient() {
    let mut params = DenseParams::zeros(2, 3);
    params.weights = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

    let input = [1.0, 2.0];
    let upstream = [1.0, 0.0, -1.0];
    let (grads, input_grad) = ops::dense_backward(&input, &params, &upstream).unwrap();

    // weight gradient is the outer product input x upstream
    assert_eq!(grads.weights, vec![1.0, 0.0, -1.0, 2.0, 0.0, -2.0]);
    // bias gradient is the upstream gradient itself
    assert_eq!(grads.biases, upstream.to_vec());
    // input gradient is weights . upstream
    assert_eq!(input_grad, vec![1.0 - 3.0, 4.0 - 6.0]);
}

// ============================================================================
// Convolution adjoints
// ============================================================================

#[test]
fn test_convolve_param_gradients_known_values() {
    let input = Tensor3D::from_vec(
        3,
        3,
        1,
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
    );
    let upstream = Tensor3D::from_vec(2, 2, 1, vec![1.0, 0.0, 0.0, 1.0]);

    let grads = ops::convolve_param_gradients(&input, &upstream, 2, 2).unwrap();

    // dW[ky][kx] = sum over output positions of input[ky+oy][kx+ox] * g
    assert_relative_eq!(grads.weight(0, 0, 0, 0), 6.0);
    assert_relative_eq!(grads.weight(0, 1, 0, 0), 8.0);
    assert_relative_eq!(grads.weight(1, 0, 0, 0), 12.0);
    assert_relative_eq!(grads.weight(1, 1, 0, 0), 14.0);
    // bias gradient is the spatial sum of the upstream gradient
    assert_relative_eq!(grads.biases[0], 2.0);
}

#[test]
fn test_convolve_param_gradients_rejects_inconsistent_extents() {
    let input = Tensor3D::zeros(3, 3, 1);
    let upstream = Tensor3D::zeros(2, 2, 1);
    assert!(ops::convolve_param_gradients(&input, &upstream, 3, 3).is_err());
}

#[test]
fn test_convolve_input_gradient_spreads_through_rotated_filter() {
    // one output position: the input gradient is g times the filter
    let mut bank = FilterBank::zeros(2, 2, 1, 1);
    bank.set_weight(0, 0, 0, 0, 1.0);
    bank.set_weight(0, 1, 0, 0, 2.0);
    bank.set_weight(1, 0, 0, 0, 3.0);
    bank.set_weight(1, 1, 0, 0, 4.0);

    let upstream = Tensor3D::from_vec(1, 1, 1, vec![2.0]);
    let grad = ops::convolve_input_gradient(&upstream, &bank, 0).unwrap();

    assert_eq!(grad.shape(), (2, 2, 1));
    assert_relative_eq!(grad.get(0, 0, 0), 2.0);
    assert_relative_eq!(grad.get(0, 1, 0), 4.0);
    assert_relative_eq!(grad.get(1, 0, 0), 6.0);
    assert_relative_eq!(grad.get(1, 1, 0), 8.0);
}

#[test]
fn test_convolve_input_gradient_transposes_channels() {
    // a 1x1 bank maps the upstream's out_channels back to in_channels
    let mut bank = FilterBank::zeros(1, 1, 2, 3);
    for (oc, w) in [1.0, 0.0, 1.0].iter().enumerate() {
        bank.set_weight(0, 0, 0, oc, *w);
    }
    for (oc, w) in [0.0, 1.0, 1.0].iter().enumerate() {
        bank.set_weight(0, 0, 1, oc, *w);
    }

    let upstream = Tensor3D::from_vec(1, 1, 3, vec![1.0, 2.0, 3.0]);
    let grad = ops::convolve_input_gradient(&upstream, &bank, 0).unwrap();

    assert_eq!(grad.shape(), (1, 1, 2));
    assert_relative_eq!(grad.get(0, 0, 0), 4.0);
    assert_relative_eq!(grad.get(0, 0, 1), 5.0);
}

#[test]
fn test_convolve_input_gradient_crops_forward_padding() {
    // forward: 2x2 input padded by 1, 3x3 filter, output 2x2
    let mut bank = FilterBank::zeros(3, 3, 1, 1);
    bank.set_weight(1, 1, 0, 0, 1.0);

    let upstream = Tensor3D::from_vec(2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]);
    let grad = ops::convolve_input_gradient(&upstream, &bank, 1).unwrap();

    // a center-only filter makes the convolution the identity, so the
    // cropped input gradient equals the upstream gradient
    assert_eq!(grad.shape(), (2, 2, 1));
    assert_eq!(grad.data(), upstream.data());
}

// ============================================================================
// Fused loss gradient
// ============================================================================

#[test]
fn test_softmax_cross_entropy_gradient_is_probs_minus_label() {
    let scores = [0.2, -0.1, 0.7];
    let probabilities = ops::softmax(&scores).unwrap();
    let label = [0.0, 1.0, 0.0];

    let grad = ops::softmax_cross_entropy_gradient(&probabilities, &label).unwrap();
    for j in 0..3 {
        assert_relative_eq!(grad[j], probabilities[j] - label[j]);
    }
    // gradient over a probability simplex sums to zero against a one-hot
    let total: f64 = grad.iter().sum();
    assert_relative_eq!(total, 0.0, epsilon = 1e-12);
}
