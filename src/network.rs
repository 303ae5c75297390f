use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::sample::{Batch, Sample, argmax};
use ndarray::{Array2, Axis};
use ndarray_rand::rand::Rng;
use std::fmt;

/// An ordered chain of layers, input side first.
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
}

/// How many evaluation samples the network classified correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
}

impl Evaluation {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.correct, self.total)
    }
}

impl Network {
    /// Chains the given layers, checking that each layer accepts what the
    /// previous one produces and that softmax only appears at the end.
    pub fn new(layers: Vec<Layer>) -> Result<Network> {
        if layers.is_empty() {
            return Err(Error::InvalidChain("a network needs at least one layer".into()));
        }
        for (index, pair) in layers.windows(2).enumerate() {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(Error::InvalidChain(format!(
                    "layer {index} produces {} values but layer {} expects {}",
                    pair[0].output_size(),
                    index + 1,
                    pair[1].input_size()
                )));
            }
        }
        let last = layers.len() - 1;
        if let Some(index) = layers[..last]
            .iter()
            .position(|layer| layer.activation().is_terminal_only())
        {
            return Err(Error::InvalidChain(format!(
                "layer {index} uses {} but is not the output layer",
                layers[index].activation()
            )));
        }
        Ok(Network { layers })
    }

    /// Builds a network from a list of neuron counts, input layer first. Every
    /// layer uses the logistic activation except the output layer, which uses
    /// `output_activation`. All layers share one learning rate.
    pub fn from_sizes<R: Rng + ?Sized>(
        sizes: &[usize],
        learning_rate: f64,
        output_activation: Activation,
        rng: &mut R,
    ) -> Result<Network> {
        if sizes.len() < 2 {
            return Err(Error::InvalidChain(
                "need an input size and at least one layer size".into(),
            ));
        }
        let last = sizes.len() - 2;
        let layers = sizes
            // For each size in sizes, paired with the following size...
            .windows(2)
            .enumerate()
            // Make a [next_size x current_size] layer, with the output activation on the last one.
            .map(|(index, pair)| {
                let activation = if index == last {
                    output_activation
                } else {
                    Activation::Logistic
                };
                Layer::new(pair[0], pair[1], learning_rate, activation, rng)
            })
            .collect();
        Network::new(layers)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].input_size()
    }

    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].output_size()
    }

    /// Runs a `[input_size x batch]` matrix through every layer and returns the
    /// `[output_size x batch]` output of the last one. Each layer keeps what
    /// it saw for the following [`Network::backpropagate`]; weights are not
    /// touched.
    pub fn forward(&mut self, inputs: Array2<f64>) -> Result<Array2<f64>> {
        let mut activation = inputs;
        for layer in self.layers.iter_mut() {
            // The layer keeps its own output in its cache, so hand the next layer a copy.
            activation = layer.forward(activation)?.clone();
        }
        Ok(activation)
    }

    /// Computes every layer's error term from the last forward pass and
    /// `targets`, walking from the output layer back to the input layer, and
    /// updates each layer as soon as its error term is known. Returns the
    /// error term of the first layer.
    pub fn backpropagate(&mut self, targets: &Array2<f64>) -> Result<Array2<f64>> {
        let last = self.layers.len() - 1;
        let mut delta = self.layers[last].terminal_delta(targets)?;

        for index in (1..=last).rev() {
            // Take Wᵀ·δ before the update so the layer before sees the weights that produced
            // this batch's output.
            let upstream = self.layers[index].upstream_error(&delta);
            self.layers[index].update(&delta)?;
            delta = self.layers[index - 1].hidden_delta(upstream)?;
        }
        self.layers[0].update(&delta)?;

        Ok(delta)
    }

    /// Classifies every sample in one batch, records each output column on its
    /// sample, and counts how many predictions match the target class. Only the
    /// layers' per-batch caches change; weights and biases are untouched.
    pub fn evaluate(&mut self, samples: &mut [Sample]) -> Result<Evaluation> {
        if samples.is_empty() {
            return Ok(Evaluation::default());
        }
        let batch = Batch::from_samples(samples.iter())?;
        if batch.targets.nrows() != self.output_size() {
            return Err(Error::DimensionMismatch {
                context: "target rows",
                expected: self.output_size(),
                actual: batch.targets.nrows(),
            });
        }
        let outputs = self.forward(batch.inputs)?;

        let mut correct = 0;
        // Column j of the output belongs to sample j. Find the strongest output neuron and check
        // it against the neuron set in the target.
        for (sample, (output, target)) in samples
            .iter_mut()
            .zip(outputs.columns().into_iter().zip(batch.targets.columns()))
        {
            if argmax(output.iter()) == argmax(target.iter()) {
                correct += 1;
            }
            sample.set_predicted(output.insert_axis(Axis(1)).to_owned());
        }

        Ok(Evaluation {
            correct,
            total: samples.len(),
        })
    }
}
