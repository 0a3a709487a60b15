// train_demo.rs
// Trains the network on synthetic noise samples to demonstrate the full
// wiring: configuration, forward/backward, SGD updates, and persistence.
// Image ingestion is a separate concern; inputs here are random pixels.
//
// Usage:
//   train_demo [config.json]
//
// Output:
//   - lightcnn9_model.bin (serialized parameters)

use std::env;
use std::process;

use log::info;

use light_cnn::config::{load_config, TrainingConfig};
use light_cnn::network::{LightCnn9, INPUT_COLS, INPUT_ROWS, NUM_CLASSES};
use light_cnn::training::{train, Sample};
use light_cnn::utils::SimpleRng;
use light_cnn::Tensor3D;

const DEMO_SAMPLES: usize = 4;
const MODEL_PATH: &str = "lightcnn9_model.bin";

fn synthetic_samples(count: usize, num_classes: usize, rng: &mut SimpleRng) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let mut image = Tensor3D::zeros(INPUT_ROWS, INPUT_COLS, 1);
        for v in image.data_mut() {
            *v = rng.next_f64();
        }
        let mut label = vec![0.0; num_classes];
        label[rng.gen_usize(num_classes)] = 1.0;
        samples.push(Sample { image, label });
    }
    samples
}

fn main() {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => load_config(&path).unwrap_or_else(|err| {
            eprintln!("Could not load {}: {}", path, err);
            process::exit(1);
        }),
        None => TrainingConfig::default(),
    };

    let mut rng = SimpleRng::new(config.seed.unwrap_or(0));
    if config.seed.is_none() {
        rng.reseed_from_time();
    }

    let num_classes = config.num_classes.unwrap_or(NUM_CLASSES);
    let mut network = LightCnn9::new(num_classes, &mut rng);
    info!(
        "initialized network: {} classes, {} parameters",
        num_classes,
        network.params().parameter_count()
    );

    let samples = synthetic_samples(DEMO_SAMPLES, num_classes, &mut rng);
    let stats = train(&mut network, &samples, &config, &mut rng).unwrap_or_else(|err| {
        eprintln!("Training failed: {}", err);
        process::exit(1);
    });
    for epoch in &stats {
        println!(
            "Epoch {} | loss={:.6} | time={:.3}s",
            epoch.epoch, epoch.average_loss, epoch.seconds
        );
    }

    if let Err(err) = network.save(MODEL_PATH) {
        eprintln!("Could not save {}: {}", MODEL_PATH, err);
        process::exit(1);
    }
    println!("Saved model to {}", MODEL_PATH);
}
