//! Softmax, cross-entropy, and their fused gradient

use crate::error::{ModelError, Result};

/// Softmax over a score vector. The maximum is subtracted before
/// exponentiation to avoid overflow with large scores.
///
/// # Errors
///
/// `InvalidArgument` on an empty input.
pub fn softmax(input: &[f64]) -> Result<Vec<f64>> {
    if input.is_empty() {
        return Err(ModelError::InvalidArgument {
            op: "softmax",
            details: "input vector is empty".to_string(),
        });
    }

    let mut max = input[0];
    for &v in input.iter().skip(1) {
        if v > max {
            max = v;
        }
    }

    let mut output: Vec<f64> = input.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = output.iter().sum();
    let inv = 1.0 / sum;
    for v in output.iter_mut() {
        *v *= inv;
    }
    Ok(output)
}

/// Cross-entropy loss `-Σ label_i · ln(p_i)` against a one-hot or soft
/// label vector. Terms with zero label weight are skipped, so zero
/// probabilities are only an error where the label actually puts weight.
///
/// # Errors
///
/// `ShapeMismatch` on length disagreement, `DomainError` when a probability
/// is exactly zero under a nonzero label weight.
pub fn cross_entropy(probabilities: &[f64], label: &[f64]) -> Result<f64> {
    if probabilities.len() != label.len() {
        return Err(ModelError::ShapeMismatch {
            op: "cross_entropy",
            details: format!(
                "probability length {} does not match label length {}",
                probabilities.len(),
                label.len()
            ),
        });
    }

    let mut loss = 0.0;
    for (&p, &y) in probabilities.iter().zip(label.iter()) {
        if y != 0.0 {
            if p == 0.0 {
                return Err(ModelError::DomainError {
                    op: "cross_entropy",
                    details: "zero probability under a nonzero label weight".to_string(),
                });
            }
            loss -= y * p.ln();
        }
    }
    Ok(loss)
}

/// Fused gradient of softmax followed by cross-entropy with respect to the
/// pre-softmax scores: `probabilities - label`. Implemented directly, never
/// through the separate adjoints.
pub fn softmax_cross_entropy_gradient(probabilities: &[f64], label: &[f64]) -> Result<Vec<f64>> {
    if probabilities.len() != label.len() {
        return Err(ModelError::ShapeMismatch {
            op: "softmax_cross_entropy_gradient",
            details: format!(
                "probability length {} does not match label length {}",
                probabilities.len(),
                label.len()
            ),
        });
    }
    Ok(probabilities
        .iter()
        .zip(label.iter())
        .map(|(&p, &y)| p - y)
        .collect())
}
