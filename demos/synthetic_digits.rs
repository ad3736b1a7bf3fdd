//! Train on generated "digit" vectors and report test accuracy.
//!
//! Each of the ten classes is a fixed random 8x8 pattern; samples are noisy copies of their
//! class pattern. Pass a JSON configuration path as the first argument to override the
//! defaults.

use std::env;
use std::str::FromStr;

use ndarray::Array1;
use ndarray_rand::rand_distr::{Bernoulli, Uniform};
use ndarray_rand::RandomExt;
use sigmanet::{assemble_batches, load_config, metrics, Mt19937, NetworkConfig, Vector};
use tracing::Level;

const CLASSES: usize = 10;
const PIXELS: usize = 64;

fn noisy_copies(
    patterns: &[Array1<f32>],
    per_class: usize,
    rng: &mut Mt19937,
) -> (Vec<Vector>, Vec<usize>) {
    let noise = Uniform::new(-0.35f32, 0.35);
    let mut samples = Vec::with_capacity(per_class * CLASSES);
    let mut labels = Vec::with_capacity(per_class * CLASSES);
    for i in 0..per_class * CLASSES {
        let class = i % CLASSES;
        let jitter = Array1::random_using(PIXELS, noise, rng);
        let pixels = (&patterns[class] + &jitter).mapv(|p| p.clamp(0.0, 1.0));
        samples.push(Vector::from_array(pixels));
        labels.push(class);
    }
    (samples, labels)
}

fn main() -> sigmanet::Result<()> {
    let config = match env::args().nth(1) {
        Some(path) => load_config(path)?,
        None => NetworkConfig::new(vec![PIXELS, 32, CLASSES])
            .learning_rate(2.0)
            .batch_size(20)
            .epochs(40),
    };

    let level = Level::from_str(&config.log_level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut rng = Mt19937::new(config.seed);
    let on = Bernoulli::new(0.4).map_err(|e| sigmanet::Error::Config(e.to_string()))?;
    let patterns = (0..CLASSES)
        .map(|_| Array1::random_using(PIXELS, on, &mut rng).mapv(|b| if b { 1.0 } else { 0.0 }))
        .collect::<Vec<Array1<f32>>>();

    let (train_x, train_y) = noisy_copies(&patterns, 100, &mut rng);
    let (test_x, test_y) = noisy_copies(&patterns, 30, &mut rng);
    let (inputs, targets) =
        assemble_batches(&train_x, &train_y, CLASSES, config.batch_size, true)?;

    let mut network = config.build()?;
    network.train(&inputs, &targets, config.epochs, inputs.len())?;

    let predictions = test_x
        .iter()
        .map(|sample| network.classify(sample))
        .collect::<sigmanet::Result<Vec<_>>>()?;
    let accuracy = metrics::accuracy(&test_y, &predictions)?;
    let correct = (accuracy * test_y.len() as f32).round() as usize;
    println!(
        "Accuracy: {}, Correct: {}, Total: {}",
        accuracy,
        correct,
        test_y.len()
    );
    for row in metrics::confusion_matrix(&test_y, &predictions, CLASSES)? {
        println!("{:?}", row);
    }
    Ok(())
}
