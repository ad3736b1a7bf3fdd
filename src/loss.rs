//! Squared-error loss on sigmoid outputs.

use crate::activation::sigmoid_prime_from_output;
use crate::error::{Error, Result};
use crate::tensor::Matrix;

/// Sum of `(a - y)^2` over every element of a batch.
pub fn total_squared_error(output: &Matrix, target: &Matrix) -> Result<f32> {
    if output.shape() != target.shape() {
        return Err(Error::shape_mismatch(
            "squared error",
            output.shape(),
            target.shape(),
        ));
    }
    Ok(output
        .iter()
        .zip(target.iter())
        .fold(0.0, |loss, (&a, &y)| loss + (a - y).powi(2)))
}

/// Error signal of the output layer: `(a - y) ⊙ a ⊙ (1 - a)`.
///
/// This is the squared-error gradient chained through the sigmoid, using the activation itself
/// for the derivative.
pub fn output_error(output: &Matrix, target: &Matrix) -> Result<Matrix> {
    output.zip_map(target, "output error", |a, y| {
        (a - y) * sigmoid_prime_from_output(a)
    })
}
