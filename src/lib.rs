//! A sigmoid multilayer perceptron trained with mini-batch gradient descent, for classifying
//! fixed-size feature vectors such as handwritten digits.
//!
//! The library only logs through `tracing`; installing a subscriber is up to the caller.

pub mod activation;
pub mod backprop;
pub mod config;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod rng;
pub mod tensor;

pub use config::{load_config, parse_config, NetworkConfig};
pub use data::{assemble_batches, Batches, OneHotEncoder};
pub use error::{Error, Result};
pub use layer::Layer;
pub use network::Network;
pub use rng::{Mt19937, DEFAULT_SEED};
pub use tensor::{Matrix, Transpose, Vector};

#[macro_export]
macro_rules! assert_rel_eq_arr1 {
    ($actual:expr, $expected:expr) => {
        assert_eq!($actual.shape(), $expected.shape());
        ndarray::Zip::from(&$actual)
            .and(&$expected)
            .for_each(|v, w| {
                assert_relative_eq!(v, w);
            });
    };
}

#[macro_export]
macro_rules! assert_rel_eq_arr2 {
    ($actual:expr, $expected:expr) => {
        assert_eq!($actual.shape(), $expected.shape());
        ndarray::Zip::from(&$actual)
            .and(&$expected)
            .for_each(|v, w| {
                assert_relative_eq!(v, w);
            });
    };
}
