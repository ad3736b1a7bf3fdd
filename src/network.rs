//! A multilayer perceptron trained with mini-batch gradient descent.
//!
//! Batches are matrices with one column per sample: inputs are `[features x batch]` and targets
//! are one-hot `[classes x batch]`. Layer 0 is the input itself and owns no parameters.
//!
//! # Example
//!
//! ```
//! use sigmanet::{Matrix, Network, Vector};
//!
//! let mut network = Network::build(3, 0.5, &[2, 3, 2]).unwrap();
//! let input = Matrix::from_shape_vec(2, 2, vec![0.0, 1.0, 1.0, 0.0]).unwrap();
//! let target = Matrix::from_shape_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
//! network.train(&[input], &[target], 10, 1).unwrap();
//!
//! let class = network.classify(&Vector::from_vec(vec![0.0, 1.0])).unwrap();
//! assert!(class < 2);
//! ```

use std::ops::{Deref, DerefMut};

use ndarray_rand::rand::RngCore;
use tracing::{debug, info};

use crate::backprop::previous_error;
use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::loss::{output_error, total_squared_error};
use crate::metrics::accuracy;
use crate::rng::{Mt19937, DEFAULT_SEED};
use crate::tensor::{Matrix, Vector};

#[derive(Clone, Debug)]
pub struct Network {
    input_len: usize,
    input_activation: Option<Matrix>,
    layers: Vec<Layer>,
    learning_rate: f32,
}

fn check_learning_rate(learning_rate: f32) -> Result<()> {
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "learning rate must be positive and finite, got {}",
            learning_rate
        )));
    }
    Ok(())
}

impl Network {
    /// Allocate a network of `layer_count` layers and seed it with `DEFAULT_SEED`.
    ///
    /// `neuron_counts[i]` is the size of layer `i`; layer 0 is the input.
    pub fn build(layer_count: usize, learning_rate: f32, neuron_counts: &[usize]) -> Result<Self> {
        Network::build_with_seed(layer_count, learning_rate, neuron_counts, DEFAULT_SEED)
    }

    pub fn build_with_seed(
        layer_count: usize,
        learning_rate: f32,
        neuron_counts: &[usize],
        seed: u32,
    ) -> Result<Self> {
        debug!(layer_count, ?neuron_counts, "building network");
        if layer_count < 2 {
            return Err(Error::InvalidArchitecture(format!(
                "need at least 2 layers, got {}",
                layer_count
            )));
        }
        if neuron_counts.len() != layer_count {
            return Err(Error::InvalidArchitecture(format!(
                "{} neuron counts given for {} layers",
                neuron_counts.len(),
                layer_count
            )));
        }
        if let Some(index) = neuron_counts.iter().position(|&n| n == 0) {
            return Err(Error::InvalidArchitecture(format!("layer {} is empty", index)));
        }
        check_learning_rate(learning_rate)?;

        let layers = neuron_counts
            .windows(2)
            .map(|pair| Layer::new(pair[0], pair[1]))
            .collect::<Result<Vec<_>>>()?;
        let mut network = Self {
            input_len: neuron_counts[0],
            input_activation: None,
            layers,
            learning_rate,
        };
        network.seed(seed)?;
        debug!("network initialized");
        Ok(network)
    }

    /// Assemble a network from explicit layers. Each layer must accept the previous layer's
    /// output, and the first must accept `input_len` features.
    pub fn from_layers(input_len: usize, learning_rate: f32, layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidArchitecture(
                "need at least one layer besides the input".to_string(),
            ));
        }
        let mut expected = input_len;
        for (i, layer) in layers.iter().enumerate() {
            if layer.input_len() != expected {
                return Err(Error::InvalidArchitecture(format!(
                    "layer {} takes {} inputs but the previous layer has {} neurons",
                    i + 1,
                    layer.input_len(),
                    expected
                )));
            }
            expected = layer.neuron_count();
        }
        check_learning_rate(learning_rate)?;

        Ok(Self {
            input_len,
            input_activation: None,
            layers,
            learning_rate,
        })
    }

    /// Re-initialize every weight and bias from a Mersenne Twister seeded with `seed`.
    pub fn seed(&mut self, seed: u32) -> Result<()> {
        self.seed_with(&mut Mt19937::new(seed))
    }

    /// Re-initialize every weight and bias from `rng`, layer by layer from the input side.
    pub fn seed_with<R>(&mut self, rng: &mut R) -> Result<()>
    where
        R: RngCore + ?Sized,
    {
        for layer in &mut self.layers {
            layer.seed_with(rng)?;
        }
        Ok(())
    }

    /// Number of layers, counting the input layer.
    pub fn layer_count(&self) -> usize {
        self.layers.len() + 1
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    pub fn output_len(&self) -> usize {
        self.layers
            .last()
            .map_or(self.input_len, Layer::neuron_count)
    }

    /// Neuron count of every layer, input layer first.
    pub fn neuron_counts(&self) -> Vec<usize> {
        std::iter::once(self.input_len)
            .chain(self.layers.iter().map(Layer::neuron_count))
            .collect()
    }

    /// The parameterized layers, i.e. layers `1..layer_count()`.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Copy of the input held by layer 0 during a pass.
    pub fn input_activation(&self) -> Option<&Matrix> {
        self.input_activation.as_ref()
    }

    /// True when any layer still holds a cached activation.
    pub fn has_cached_activations(&self) -> bool {
        self.input_activation.is_some() || self.layers.iter().any(|l| l.activation().is_some())
    }

    /// Propagate `input` through the network, caching each layer's activation.
    ///
    /// The caches stay in place until `release_activations` is called. `backpropagate`,
    /// `classify` and `total_squared_error` release them on their own.
    pub fn forward(&mut self, input: &Matrix) -> Result<()> {
        if input.rows() != self.input_len {
            return Err(Error::shape_mismatch(
                "forward",
                input.shape(),
                &[self.input_len, input.cols()],
            ));
        }
        self.input_activation = Some(input.try_clone()?);

        for i in 0..self.layers.len() {
            let (before, rest) = self.layers.split_at_mut(i);
            let previous = match before.last() {
                Some(layer) => layer.activation(),
                None => self.input_activation.as_ref(),
            }
            .ok_or(Error::MissingActivation(i))?;
            rest[0].forward(previous)?;
        }
        Ok(())
    }

    /// Drop every cached activation, including the input copy.
    pub fn release_activations(&mut self) {
        self.input_activation = None;
        for layer in &mut self.layers {
            layer.release();
        }
    }

    /// Output of the last forward pass.
    pub fn output_activation(&self) -> Result<&Matrix> {
        self.layers
            .last()
            .and_then(Layer::activation)
            .ok_or(Error::MissingActivation(self.layers.len()))
    }

    /// Train on one batch: a forward pass, then one gradient step per layer from the output
    /// back to the first hidden layer.
    ///
    /// Returns the total squared error of the batch measured before the update. Activation
    /// caches are released on return, whether or not the step succeeded. A batch without
    /// samples is rejected before any parameter changes.
    #[tracing::instrument(skip_all, fields(batch_size = input.cols()))]
    pub fn backpropagate(&mut self, input: &Matrix, target: &Matrix) -> Result<f32> {
        if input.cols() == 0 {
            return Err(Error::InvalidParameter("batch has no samples".to_string()));
        }
        let mut pass = ActivationScope::new(self);
        pass.forward(input)?;
        let loss = pass.backward(target)?;
        Ok(loss)
    }

    fn backward(&mut self, target: &Matrix) -> Result<f32> {
        let output = self.output_activation()?;
        let loss = total_squared_error(output, target)?;
        let mut error = output_error(output, target)?;
        debug!(
            loss,
            error_sum = error.iter().sum::<f32>(),
            "computed output error"
        );

        let batch_size = target.cols();
        let step = self.learning_rate / batch_size as f32;
        for i in (0..self.layers.len()).rev() {
            let (before, rest) = self.layers.split_at_mut(i);
            let previous = match before.last() {
                Some(layer) => layer.activation(),
                None => self.input_activation.as_ref(),
            }
            .ok_or(Error::MissingActivation(i))?;
            let layer = &mut rest[0];

            layer.update(previous, &error, step)?;
            // The error handed to the shallower layer goes through the weights just updated.
            if i > 0 {
                error = previous_error(previous, layer.weights(), &error)?;
            }
        }
        Ok(loss)
    }

    /// Run `epochs` passes over the first `batches` batches, in order.
    ///
    /// `inputs[i]` and `targets[i]` together form batch `i`.
    #[tracing::instrument(skip(self, inputs, targets))]
    pub fn train(
        &mut self,
        inputs: &[Matrix],
        targets: &[Matrix],
        epochs: usize,
        batches: usize,
    ) -> Result<()> {
        if inputs.len() != targets.len() {
            return Err(Error::InvalidParameter(format!(
                "{} input batches but {} target batches",
                inputs.len(),
                targets.len()
            )));
        }
        if batches > inputs.len() {
            return Err(Error::InvalidParameter(format!(
                "asked for {} batches per epoch but only {} were supplied",
                batches,
                inputs.len()
            )));
        }

        for epoch in 0..epochs {
            let mut epoch_loss = 0.0;
            for (input, target) in inputs.iter().zip(targets).take(batches) {
                epoch_loss += self.backpropagate(input, target)?;
            }
            info!(epoch, loss = epoch_loss, "finished epoch");
        }
        Ok(())
    }

    /// Predict the class of a single sample: the index of the most active output neuron,
    /// the earliest one on ties.
    pub fn classify(&mut self, sample: &Vector) -> Result<usize> {
        let input = Matrix::from_column(sample)?;
        let mut pass = ActivationScope::new(self);
        pass.forward(&input)?;
        let scores = pass.output_activation()?.column(0)?;
        Ok(scores.argmax())
    }

    /// Fraction of `samples` classified as their `labels`.
    pub fn evaluate(&mut self, samples: &[Vector], labels: &[usize]) -> Result<f32> {
        let predictions = samples
            .iter()
            .map(|sample| self.classify(sample))
            .collect::<Result<Vec<_>>>()?;
        let accuracy = accuracy(labels, &predictions)?;
        info!(accuracy, total = labels.len(), "evaluated network");
        Ok(accuracy)
    }

    /// Total squared error of the current parameters on a batch. Leaves no activations cached.
    pub fn total_squared_error(&mut self, input: &Matrix, target: &Matrix) -> Result<f32> {
        let mut pass = ActivationScope::new(self);
        pass.forward(input)?;
        let loss = total_squared_error(pass.output_activation()?, target)?;
        Ok(loss)
    }
}

/// Borrow of a network whose activation caches are released when the borrow ends.
struct ActivationScope<'a> {
    network: &'a mut Network,
}

impl<'a> ActivationScope<'a> {
    fn new(network: &'a mut Network) -> Self {
        Self { network }
    }
}

impl Deref for ActivationScope<'_> {
    type Target = Network;

    fn deref(&self) -> &Network {
        self.network
    }
}

impl DerefMut for ActivationScope<'_> {
    fn deref_mut(&mut self) -> &mut Network {
        self.network
    }
}

impl Drop for ActivationScope<'_> {
    fn drop(&mut self) {
        self.network.release_activations();
    }
}

#[cfg(test)]
mod tests {
    use crate::assert_rel_eq_arr2;

    use super::*;

    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2, Array, Array2};
    use ndarray_rand::{rand_distr::Uniform, RandomExt};

    fn logit(p: f32) -> f32 {
        (p / (1.0 - p)).ln()
    }

    #[test]
    fn layer_shapes_follow_neuron_counts() {
        let network = Network::build(3, 0.1, &[4, 5, 3]).unwrap();
        assert_eq!(network.layer_count(), 3);
        assert_eq!(network.layers()[0].weights().shape(), &[5, 4]);
        assert_eq!(network.layers()[0].biases().len(), 5);
        assert_eq!(network.layers()[1].weights().shape(), &[3, 5]);
        assert_eq!(network.layers()[1].biases().len(), 3);
        assert_eq!(network.neuron_counts(), vec![4, 5, 3]);
        assert!(!network.has_cached_activations());
    }

    #[test]
    fn invalid_architectures_are_rejected() {
        assert!(matches!(
            Network::build(3, 0.1, &[4, 5]),
            Err(Error::InvalidArchitecture(_))
        ));
        assert!(matches!(
            Network::build(2, 0.1, &[4, 5, 3]),
            Err(Error::InvalidArchitecture(_))
        ));
        assert!(Network::build(1, 0.1, &[4]).is_err());
        assert!(Network::build(3, 0.1, &[4, 0, 3]).is_err());
        assert!(matches!(
            Network::build(2, 0.0, &[4, 3]),
            Err(Error::InvalidParameter(_))
        ));
        assert!(Network::build(2, f32::NAN, &[4, 3]).is_err());
    }

    #[test]
    fn seeding_is_deterministic() {
        let a = Network::build(3, 0.1, &[2, 3, 1]).unwrap();
        let b = Network::build(3, 0.1, &[2, 3, 1]).unwrap();
        for (la, lb) in a.layers().iter().zip(b.layers()) {
            assert_eq!(la.weights(), lb.weights());
            assert_eq!(la.biases(), lb.biases());
        }

        let c = Network::build_with_seed(3, 0.1, &[2, 3, 1], 7).unwrap();
        assert_ne!(a.layers()[0].weights(), c.layers()[0].weights());
    }

    #[test]
    fn default_seed_draw_order() {
        // Each neuron draws its weights, then its bias, layer by layer.
        let network = Network::build(3, 0.1, &[2, 3, 1]).unwrap();
        let hidden = &network.layers()[0];
        assert_rel_eq_arr2!(
            hidden.weights().view(),
            arr2(&[
                [-0.10614252090454102f32, 0.177925243973732],
                [-0.22992666065692902, -0.055049195885658264],
                [0.22217358648777008, 0.24513418972492218],
            ])
        );
        assert_relative_eq!(hidden.biases().get(0).unwrap(), -0.09677231311798096);
        assert_relative_eq!(hidden.biases().get(1).unwrap(), -0.39219510555267334);
        assert_relative_eq!(hidden.biases().get(2).unwrap(), 0.3074571192264557);

        let output = &network.layers()[1];
        assert_rel_eq_arr2!(
            output.weights().view(),
            arr2(&[[0.006719961296766996f32, 0.24689212441444397, -0.05799706280231476]])
        );
        assert_relative_eq!(output.biases().get(0).unwrap(), 0.2510416805744171);
    }

    #[test]
    fn seeded_parameters_stay_in_range() {
        let network = Network::build(4, 0.1, &[20, 30, 30, 10]).unwrap();
        for layer in network.layers() {
            assert!(layer.weights().iter().all(|w| (-0.25..=0.25).contains(w)));
            assert!(layer
                .biases()
                .iter()
                .all(|b| (-0.416_667..=0.416_667).contains(b)));
        }
    }

    #[test]
    fn zero_parameters_give_half_activations() {
        let layers = vec![Layer::new(3, 4).unwrap(), Layer::new(4, 2).unwrap()];
        let mut network = Network::from_layers(3, 0.1, layers).unwrap();
        let input = Matrix::from_array(arr2(&[[0.3], [-1.0], [0.9]]));
        network.forward(&input).unwrap();

        for layer in network.layers() {
            let activation = layer.activation().unwrap();
            assert_eq!(activation.cols(), 1);
            assert!(activation.iter().all(|&a| a == 0.5));
        }
        assert_eq!(network.input_activation(), Some(&input));

        network.release_activations();
        assert!(!network.has_cached_activations());
    }

    #[test]
    fn forward_copies_the_input() {
        let mut network = Network::build(2, 0.1, &[2, 2]).unwrap();
        let input = Matrix::from_array(arr2(&[[0.5, 1.0], [0.25, 0.0]]));
        let before = input.clone();
        network.forward(&input).unwrap();
        assert_eq!(input, before);
        assert_eq!(network.input_activation(), Some(&before));
    }

    #[test]
    fn forward_rejects_wrong_feature_count() {
        let mut network = Network::build(2, 0.1, &[3, 2]).unwrap();
        let input = Matrix::zeros(2, 1).unwrap();
        assert!(matches!(
            network.forward(&input),
            Err(Error::ShapeMismatch { op: "forward", .. })
        ));
    }

    #[test]
    fn classify_picks_the_most_active_neuron() {
        let output = Layer::with_parameters(
            Matrix::zeros(3, 2).unwrap(),
            Vector::from_array(arr1(&[logit(0.1), logit(0.9), logit(0.3)])),
        )
        .unwrap();
        let mut network = Network::from_layers(2, 0.1, vec![output]).unwrap();
        let class = network.classify(&Vector::from_vec(vec![0.7, 0.2])).unwrap();
        assert_eq!(class, 1);
        assert!(!network.has_cached_activations());
    }

    #[test]
    fn classify_rejects_wrong_sample_length() {
        let mut network = Network::build(3, 0.1, &[4, 5, 3]).unwrap();
        assert!(network.classify(&Vector::from_vec(vec![0.1; 3])).is_err());
        assert!(!network.has_cached_activations());
    }

    #[test]
    fn backpropagation_releases_activations() {
        let mut network = Network::build(3, 0.5, &[2, 3, 2]).unwrap();
        let input = Matrix::from_array(arr2(&[[0.0, 1.0, 1.0], [1.0, 0.0, 1.0]]));
        let target = Matrix::from_array(arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 1.0]]));
        network.backpropagate(&input, &target).unwrap();
        assert!(!network.has_cached_activations());

        // A failing step must not leave stale caches behind either.
        let bad_target = Matrix::zeros(3, 3).unwrap();
        assert!(network.backpropagate(&input, &bad_target).is_err());
        assert!(!network.has_cached_activations());
    }

    #[test]
    fn empty_batch_is_rejected() {
        let mut network = Network::build(3, 0.5, &[2, 3, 2]).unwrap();
        let before = network.clone();
        let empty = Matrix::zeros(2, 0).unwrap();
        assert!(matches!(
            network.backpropagate(&empty, &empty),
            Err(Error::InvalidParameter(_))
        ));
        for (after, before) in network.layers().iter().zip(before.layers()) {
            assert_eq!(after.weights(), before.weights());
            assert_eq!(after.biases(), before.biases());
        }
        assert!(!network.has_cached_activations());
    }

    #[test]
    fn mismatched_batch_leaves_parameters_untouched() {
        let mut network = Network::build(3, 0.5, &[2, 3, 2]).unwrap();
        let before = network.clone();
        let input = Matrix::from_array(arr2(&[[0.0, 1.0, 1.0], [1.0, 0.0, 1.0]]));
        let target = Matrix::from_array(arr2(&[[1.0, 0.0], [0.0, 1.0]]));
        assert!(matches!(
            network.backpropagate(&input, &target),
            Err(Error::ShapeMismatch { .. })
        ));
        for (after, before) in network.layers().iter().zip(before.layers()) {
            assert_eq!(after.weights(), before.weights());
            assert_eq!(after.biases(), before.biases());
        }
        assert!(!network.has_cached_activations());
    }

    #[test]
    fn backpropagation_reduces_error() {
        let mut rng = Mt19937::new(2024);
        let input: Array2<f32> = Array::random_using((4, 8), Uniform::new(0.0, 1.0), &mut rng);
        let input = Matrix::from_array(input);
        let mut target = Matrix::zeros(3, 8).unwrap();
        for sample in 0..8 {
            target.set(sample % 3, sample, 1.0).unwrap();
        }

        let mut network = Network::build(3, 0.05, &[4, 6, 3]).unwrap();
        let before = network.total_squared_error(&input, &target).unwrap();
        let reported = network.backpropagate(&input, &target).unwrap();
        let after = network.total_squared_error(&input, &target).unwrap();

        assert_relative_eq!(reported, before, max_relative = 1e-6);
        assert!(after < before, "error went from {} to {}", before, after);
    }

    #[test]
    fn update_matches_hand_computation() {
        // One sigmoid neuron with two inputs and a batch of two.
        let layer = Layer::with_parameters(
            Matrix::from_array(arr2(&[[0.5, -0.5]])),
            Vector::from_vec(vec![0.0]),
        )
        .unwrap();
        let mut network = Network::from_layers(2, 1.0, vec![layer]).unwrap();
        let input = Matrix::from_array(arr2(&[[1.0, 0.0], [1.0, 0.0]]));
        let target = Matrix::from_array(arr2(&[[1.0, 0.0]]));
        network.backpropagate(&input, &target).unwrap();

        // Both samples have z = 0, so a = 0.5 and the errors are -0.125 and 0.125.
        // Gradients: weights [-0.125, -0.125], bias 0. Step = 1 / 2.
        let updated = &network.layers()[0];
        assert_rel_eq_arr2!(updated.weights().view(), arr2(&[[0.5625f32, -0.4375]]));
        assert_relative_eq!(updated.biases().get(0).unwrap(), 0.0);
    }

    #[test]
    fn training_validates_batches() {
        let mut network = Network::build(2, 0.1, &[2, 2]).unwrap();
        let input = Matrix::zeros(2, 1).unwrap();
        let target = Matrix::zeros(2, 1).unwrap();
        assert!(network.train(&[input.clone()], &[], 1, 1).is_err());
        assert!(network.train(&[input.clone()], &[target.clone()], 1, 2).is_err());
        assert!(network.train(&[input], &[target], 2, 1).is_ok());
    }

    #[test]
    fn training_is_reproducible() {
        let input = Matrix::from_array(arr2(&[[0.0, 1.0, 1.0, 0.0], [0.0, 0.0, 1.0, 1.0]]));
        let target = Matrix::from_array(arr2(&[[1.0, 0.0, 1.0, 0.0], [0.0, 1.0, 0.0, 1.0]]));

        let mut a = Network::build(3, 0.8, &[2, 4, 2]).unwrap();
        let mut b = Network::build(3, 0.8, &[2, 4, 2]).unwrap();
        a.train(&[input.clone()], &[target.clone()], 5, 1).unwrap();
        b.train(&[input], &[target], 5, 1).unwrap();
        for (la, lb) in a.layers().iter().zip(b.layers()) {
            assert_eq!(la.weights(), lb.weights());
            assert_eq!(la.biases(), lb.biases());
        }
    }
}
