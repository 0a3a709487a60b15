//! Minibatch training driver
//!
//! One sample is processed fully (forward, loss, backward) before the next
//! begins; the batch size only controls how many per-sample gradients are
//! averaged into one optimizer step, never concurrency. The parameter set is
//! written exclusively by the update step, between complete
//! forward/backward cycles.

use std::time::Instant;

use log::info;

use crate::config::TrainingConfig;
use crate::error::{ModelError, Result};
use crate::network::{Gradients, LightCnn9};
use crate::optimizers::{Optimizer, Sgd};
use crate::tensor::Tensor3D;
use crate::utils::SimpleRng;

/// One training sample: a single-channel image and its label vector
/// (one-hot or soft), as wide as the network's class-score vector.
pub struct Sample {
    pub image: Tensor3D,
    pub label: Vec<f64>,
}

/// Per-epoch training statistics.
#[derive(Debug, Clone)]
pub struct EpochStats {
    pub epoch: usize,
    pub average_loss: f64,
    pub seconds: f64,
}

/// Train the network in place over the given samples.
///
/// Each epoch shuffles the sample order, walks minibatches, accumulates the
/// per-sample gradients scaled by `1 / batch`, and applies one SGD step per
/// batch. Returns per-epoch statistics.
///
/// # Errors
///
/// `InvalidArgument` when the sample set is empty; otherwise the first
/// engine failure aborts the run (shape violations are wiring bugs, not
/// transient conditions).
pub fn train(
    network: &mut LightCnn9,
    samples: &[Sample],
    config: &TrainingConfig,
    rng: &mut SimpleRng,
) -> Result<Vec<EpochStats>> {
    if samples.is_empty() {
        return Err(ModelError::InvalidArgument {
            op: "train",
            details: "sample set is empty".to_string(),
        });
    }

    let mut optimizer = Sgd::new(config.learning_rate);
    let mut indices: Vec<usize> = (0..samples.len()).collect();
    let mut stats = Vec::with_capacity(config.epochs);

    info!(
        "training: epochs={} batch={} lr={}",
        config.epochs,
        config.batch_size,
        optimizer.learning_rate()
    );

    for epoch in 0..config.epochs {
        let start = Instant::now();
        rng.shuffle_usize(&mut indices);

        let mut total_loss = 0.0;
        for batch_start in (0..samples.len()).step_by(config.batch_size) {
            let batch = (samples.len() - batch_start).min(config.batch_size);

            let mut accumulated = Gradients::zeros_like(network.params());
            for offset in 0..batch {
                let sample = &samples[indices[batch_start + offset]];
                let cache = network.forward(&sample.image)?;
                total_loss += network.loss(&cache, &sample.label)?;
                let grads = network.backward(&cache, &sample.label)?;
                accumulated.accumulate(&grads);
            }
            accumulated.scale(1.0 / batch as f64);
            network.apply_gradients(&accumulated, &mut optimizer);
        }

        let seconds = start.elapsed().as_secs_f64();
        let average_loss = total_loss / samples.len() as f64;
        info!(
            "epoch {} | loss={:.6} | time={:.3}s",
            epoch + 1,
            average_loss,
            seconds
        );
        stats.push(EpochStats {
            epoch: epoch + 1,
            average_loss,
            seconds,
        });
    }

    Ok(stats)
}
