use ndarray_rand::rand::RngCore;
use tracing::trace;

use crate::activation::apply_sigmoid;
use crate::backprop::{bias_gradient, weight_gradient};
use crate::error::{Error, Result};
use crate::rng::uniform_from;
use crate::tensor::{Matrix, Transpose, Vector};

/// A fully connected sigmoid layer.
///
/// `weights` has one row per neuron and one column per neuron of the previous layer. The
/// activation of the most recent forward pass is cached until the network releases it.
#[derive(Clone, Debug)]
pub struct Layer {
    weights: Matrix,
    biases: Vector,
    activation: Option<Matrix>,
}

impl Layer {
    /// Allocate a layer of `neurons` neurons fed by `inputs` neurons, with zeroed parameters.
    pub fn new(inputs: usize, neurons: usize) -> Result<Self> {
        let weights = Matrix::zeros(neurons, inputs)?;
        let biases = Vector::zeros(neurons)?;
        Layer::with_parameters(weights, biases)
    }

    pub fn with_parameters(weights: Matrix, biases: Vector) -> Result<Self> {
        if weights.rows() != biases.len() {
            return Err(Error::shape_mismatch(
                "layer parameters",
                weights.shape(),
                &[biases.len()],
            ));
        }
        if weights.rows() == 0 || weights.cols() == 0 {
            return Err(Error::InvalidArchitecture(format!(
                "layer shape {:?} has an empty dimension",
                weights.shape()
            )));
        }
        Ok(Self {
            weights,
            biases,
            activation: None,
        })
    }

    pub fn neuron_count(&self) -> usize {
        self.weights.rows()
    }

    /// Number of neurons in the layer feeding this one.
    pub fn input_len(&self) -> usize {
        self.weights.cols()
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn biases(&self) -> &Vector {
        &self.biases
    }

    /// Output of the last forward pass, if it has not been released yet.
    pub fn activation(&self) -> Option<&Matrix> {
        self.activation.as_ref()
    }

    /// Fill the parameters from `rng`.
    ///
    /// Each neuron draws its row of weights left to right and then its bias. Weights land in
    /// [-0.25, 0.25) and biases in [-0.4167, 0.4167).
    pub(crate) fn seed_with<R>(&mut self, rng: &mut R) -> Result<()>
    where
        R: RngCore + ?Sized,
    {
        for neuron in 0..self.neuron_count() {
            for input in 0..self.input_len() {
                let draw = uniform_from(rng.next_u32());
                self.weights.set(neuron, input, ((draw - 0.5) / 2.0) as f32)?;
            }
            let draw = uniform_from(rng.next_u32());
            self.biases.set(neuron, ((draw - 0.5) / 1.2) as f32)?;
        }
        Ok(())
    }

    /// Compute `sigmoid(W · input + b)` and cache it as this layer's activation.
    pub(crate) fn forward(&mut self, input: &Matrix) -> Result<()> {
        let mut z = self
            .weights
            .matmul(Transpose::No, input, Transpose::No)?;
        z.add_to_columns(&self.biases)?;
        apply_sigmoid(&mut z);
        self.activation = Some(z);
        Ok(())
    }

    /// Take one gradient step for this layer.
    ///
    /// `error` is this layer's error signal and `previous` the previous layer's activation.
    /// Both gradients are multiplied by `step` before being subtracted.
    pub(crate) fn update(&mut self, previous: &Matrix, error: &Matrix, step: f32) -> Result<()> {
        let mut bias_step = bias_gradient(error)?;
        let mut weight_step = weight_gradient(previous, error)?;
        bias_step.scale(step);
        weight_step.scale(step);

        self.biases.sub_in_place(&bias_step)?;
        self.weights.sub_in_place(&weight_step)?;
        trace!(neurons = self.neuron_count(), step, "updated layer parameters");
        Ok(())
    }

    pub(crate) fn release(&mut self) {
        self.activation = None;
    }
}
