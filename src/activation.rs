use crate::tensor::Matrix;

/// Logistic sigmoid `1 / (1 + e^-x)`.
///
/// Evaluated in double precision and narrowed, so `sigmoid(0.0)` is exactly 0.5.
pub fn sigmoid(x: f32) -> f32 {
    (1.0 / (1.0 + (-(x as f64)).exp())) as f32
}

/// Derivative of the sigmoid expressed through its output `a = sigmoid(x)`.
pub fn sigmoid_prime_from_output(a: f32) -> f32 {
    a * (1.0 - a)
}

/// Turn pre-activations into activations in place.
pub fn apply_sigmoid(z: &mut Matrix) {
    z.map_in_place(sigmoid);
}
