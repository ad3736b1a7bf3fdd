//! Per-layer error propagation and gradients.

use crate::activation::sigmoid_prime_from_output;
use crate::error::Result;
use crate::tensor::{Matrix, Transpose, Vector};

/// Error of the layer feeding into `weights`: `(wᵀ · δ) ⊙ a ⊙ (1 - a)`.
///
/// `activation` is that earlier layer's cached output and `error` the error of the layer that
/// owns `weights`.
pub fn previous_error(activation: &Matrix, weights: &Matrix, error: &Matrix) -> Result<Matrix> {
    let propagated = weights.matmul(Transpose::Yes, error, Transpose::No)?;
    propagated.zip_map(activation, "previous error", |e, a| {
        e * sigmoid_prime_from_output(a)
    })
}

/// Bias gradient: each neuron's error summed over the batch.
pub fn bias_gradient(error: &Matrix) -> Result<Vector> {
    error.row_sums()
}

/// Weight gradient `δ · aᵀ`, where `activation` is the previous layer's output.
pub fn weight_gradient(activation: &Matrix, error: &Matrix) -> Result<Matrix> {
    error.matmul(Transpose::No, activation, Transpose::Yes)
}

#[cfg(test)]
mod tests {
    use crate::{assert_rel_eq_arr1, assert_rel_eq_arr2};

    use super::*;

    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn propagate_error_through_weights() {
        // Two neurons feeding into one, batch of two.
        let weights = Matrix::from_array(arr2(&[[2.0, -1.0]]));
        let error = Matrix::from_array(arr2(&[[0.5, -0.25]]));
        let activation = Matrix::from_array(arr2(&[[0.5, 0.2], [0.9, 0.4]]));

        let delta = previous_error(&activation, &weights, &error).unwrap();
        assert_rel_eq_arr2!(
            delta.view(),
            arr2(&[[0.25, -0.08], [-0.045, 0.06]])
        );
    }

    #[test]
    fn previous_error_checks_shapes() {
        let weights = Matrix::zeros(1, 2).unwrap();
        let error = Matrix::zeros(1, 2).unwrap();
        let activation = Matrix::zeros(3, 2).unwrap();
        assert!(previous_error(&activation, &weights, &error).is_err());
    }

    #[test]
    fn gradients_over_a_batch() {
        let error = Matrix::from_array(arr2(&[[0.5, -0.25, 1.0], [0.0, 2.0, -1.0]]));
        let activation = Matrix::from_array(arr2(&[[1.0, 2.0, 0.0], [0.5, 0.5, 4.0]]));

        let db = bias_gradient(&error).unwrap();
        assert_rel_eq_arr1!(db.view(), arr1(&[1.25, 1.0]));

        let dw = weight_gradient(&activation, &error).unwrap();
        assert_eq!(dw.shape(), &[2, 2]);
        assert_rel_eq_arr2!(dw.view(), arr2(&[[0.0, 4.125], [4.0, -3.0]]));
    }
}
