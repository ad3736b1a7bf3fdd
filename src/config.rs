//! Network and training configuration.
//!
//! A configuration can be built in code or parsed from JSON:
//!
//! ```json
//! {
//!   "layer_sizes": [784, 100, 100, 10],
//!   "learning_rate": 0.63,
//!   "batch_size": 100,
//!   "epochs": 10,
//!   "log_level": "debug"
//! }
//! ```
//!
//! Every field except `layer_sizes` is optional.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::network::Network;
use crate::rng::DEFAULT_SEED;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn default_learning_rate() -> f32 {
    0.63
}

fn default_batch_size() -> usize {
    100
}

fn default_epochs() -> usize {
    10
}

fn default_seed() -> u32 {
    DEFAULT_SEED
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Neuron count of every layer, input layer first.
    pub layer_sizes: Vec<usize>,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Samples per training batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Seed of the parameter initialisation.
    #[serde(default = "default_seed")]
    pub seed: u32,

    /// Maximum level for log output: "trace", "debug", "info", "warn" or "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl NetworkConfig {
    pub fn new(layer_sizes: Vec<usize>) -> Self {
        Self {
            layer_sizes,
            learning_rate: default_learning_rate(),
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            seed: default_seed(),
            log_level: default_log_level(),
        }
    }

    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.layer_sizes.len() < 2 {
            return Err(Error::Config(
                "layer_sizes needs an input and an output layer".to_string(),
            ));
        }
        if self.layer_sizes.contains(&0) {
            return Err(Error::Config("layer sizes must be positive".to_string()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".to_string()));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "invalid log level '{}'. Must be one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Build and seed the network this configuration describes.
    pub fn build(&self) -> Result<Network> {
        self.validate()?;
        Network::build_with_seed(
            self.layer_sizes.len(),
            self.learning_rate,
            &self.layer_sizes,
            self.seed,
        )
    }
}

/// Parse and validate a configuration from a JSON string.
pub fn parse_config(json: &str) -> Result<NetworkConfig> {
    let config: NetworkConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Load a configuration from the JSON file at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<NetworkConfig> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}
