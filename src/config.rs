//! Configuration structures for training
//!
//! Training hyperparameters are parsed from JSON files and validated before
//! use, so a bad file fails at load time rather than mid-run.

use serde::Deserialize;
use std::fs;

use crate::error::{ModelError, Result};

/// Training hyperparameters.
///
/// # Example
///
/// ```json
/// {
///   "learning_rate": 0.0001,
///   "epochs": 3,
///   "batch_size": 8,
///   "seed": 42
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Step size for the SGD update.
    pub learning_rate: f64,

    /// Number of passes over the training set.
    pub epochs: usize,

    /// Samples accumulated per parameter update. Controls gradient
    /// averaging only; samples are always processed one at a time.
    pub batch_size: usize,

    /// RNG seed for initialization and shuffling. When absent, the RNG is
    /// reseeded from the clock.
    pub seed: Option<u64>,

    /// Width of the class-score vector. Defaults to 3095 identities.
    pub num_classes: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            epochs: 1,
            batch_size: 1,
            seed: None,
            num_classes: None,
        }
    }
}

/// Loads a training configuration from a JSON file.
///
/// Reads the file at `path`, deserializes its JSON contents, and validates
/// the values.
///
/// # Errors
///
/// I/O errors, JSON parse errors, or `Config` when a value is out of range.
pub fn load_config(path: &str) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &TrainingConfig) -> Result<()> {
    if !(config.learning_rate > 0.0 && config.learning_rate.is_finite()) {
        return Err(ModelError::Config(format!(
            "learning_rate must be positive and finite, got {}",
            config.learning_rate
        )));
    }
    if config.epochs == 0 {
        return Err(ModelError::Config("epochs must be at least 1".to_string()));
    }
    if config.batch_size == 0 {
        return Err(ModelError::Config(
            "batch_size must be at least 1".to_string(),
        ));
    }
    if config.num_classes == Some(0) {
        return Err(ModelError::Config(
            "num_classes must be positive".to_string(),
        ));
    }
    Ok(())
}
