use crate::activation::Activation;
use crate::error::{Error, Result};
use ndarray::{Array, Array2, Axis};
use ndarray_rand::{RandomExt, rand::Rng, rand_distr::StandardNormal};

// What a layer remembers about the batch it most recently saw. The derivative is a pure function
// of the output and is computed at the same moment, so the three always describe the same batch.
#[derive(Debug, Clone)]
struct ForwardCache {
    input: Array2<f64>,
    output: Array2<f64>,
    derivative: Array2<f64>,
}

/// One trainable stage of a network: `activation(W·x + b)`.
#[derive(Debug, Clone)]
pub struct Layer {
    weights: Array2<f64>,
    biases: Array2<f64>,
    learning_rate: f64,
    activation: Activation,
    cache: Option<ForwardCache>,
}

impl Layer {
    /// Creates a layer whose weights and biases are drawn from the standard
    /// normal distribution. Passing a seeded RNG makes initialisation
    /// reproducible.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        learning_rate: f64,
        activation: Activation,
        rng: &mut R,
    ) -> Layer {
        Layer {
            // Make a [output_size x input_size] array of weights and a [output_size x 1] array of
            // biases, each entry independently sampled.
            weights: Array::random_using((output_size, input_size), StandardNormal, rng),
            biases: Array::random_using((output_size, 1), StandardNormal, rng),
            learning_rate,
            activation,
            cache: None,
        }
    }

    /// Creates a layer from explicit parameters. `biases` must be an
    /// `[output x 1]` column matching the row count of `weights`.
    pub fn with_parameters(
        weights: Array2<f64>,
        biases: Array2<f64>,
        learning_rate: f64,
        activation: Activation,
    ) -> Result<Layer> {
        if biases.dim() != (weights.nrows(), 1) {
            return Err(Error::DimensionMismatch {
                context: "bias column length",
                expected: weights.nrows(),
                actual: biases.len(),
            });
        }
        Ok(Layer {
            weights,
            biases,
            learning_rate,
            activation,
            cache: None,
        })
    }

    pub fn input_size(&self) -> usize {
        self.weights.ncols()
    }

    pub fn output_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn biases(&self) -> &Array2<f64> {
        &self.biases
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Output produced by the last forward pass.
    pub fn output(&self) -> Option<&Array2<f64>> {
        self.cache.as_ref().map(|cache| &cache.output)
    }

    /// Activation derivative at the last forward pass.
    pub fn derivative(&self) -> Option<&Array2<f64>> {
        self.cache.as_ref().map(|cache| &cache.derivative)
    }

    /// Runs a `[input_size x batch]` matrix through this layer and returns the
    /// `[output_size x batch]` activations. The input, output and derivative
    /// are kept for the following backward pass.
    pub fn forward(&mut self, input: Array2<f64>) -> Result<&Array2<f64>> {
        if input.nrows() != self.input_size() {
            return Err(Error::DimensionMismatch {
                context: "layer input rows",
                expected: self.input_size(),
                actual: input.nrows(),
            });
        }

        // Compute w.a + b, where the [output_size x 1] bias column is broadcast across every column
        // of the batch, then apply the activation function.
        let mut output = self.weights.dot(&input) + &self.biases;
        self.activation.apply(&mut output);
        let derivative = self.activation.derivative(&output);

        let cache = self.cache.insert(ForwardCache {
            input,
            output,
            derivative,
        });
        Ok(&cache.output)
    }

    /// Error term of this layer when it is the last one in the network.
    pub fn terminal_delta(&self, targets: &Array2<f64>) -> Result<Array2<f64>> {
        let cache = self.cache.as_ref().ok_or(Error::NoForwardPass)?;
        if targets.dim() != cache.output.dim() {
            return Err(Error::DimensionMismatch {
                context: "target rows",
                expected: cache.output.nrows(),
                actual: targets.nrows(),
            });
        }
        Ok(self
            .activation
            .terminal_delta(&cache.output, targets, &cache.derivative))
    }

    /// Error term of a hidden layer, given `Wᵀ·δ` from the layer after it.
    pub fn hidden_delta(&self, downstream_error: Array2<f64>) -> Result<Array2<f64>> {
        let cache = self.cache.as_ref().ok_or(Error::NoForwardPass)?;
        check_batch_shape("downstream error", &downstream_error, &cache.derivative)?;
        Ok(downstream_error * &cache.derivative)
    }

    /// The error signal this layer hands back to the layer before it: `Wᵀ·δ`.
    /// Must be taken before [`Layer::update`] so it reflects the weights the
    /// forward pass actually used.
    pub fn upstream_error(&self, delta: &Array2<f64>) -> Array2<f64> {
        self.weights.t().dot(delta)
    }

    /// Applies one gradient descent step using the mean gradient over the
    /// batch:
    /// `W ← W − η·(δ·xᵀ)/n` and `b ← b − η·mean(δ)`.
    pub fn update(&mut self, delta: &Array2<f64>) -> Result<()> {
        let cache = self.cache.as_ref().ok_or(Error::NoForwardPass)?;
        check_batch_shape("delta", delta, &cache.output)?;
        let batch_size = delta.ncols() as f64;

        // Each column of delta belongs to one sample, so multiplying by the transposed input matrix
        // sums the per-sample weight gradients for us. Summing along the rows does the same for
        // the biases.
        let mut nabla_weights = delta.dot(&cache.input.t());
        nabla_weights.mapv_inplace(|nw| nw * self.learning_rate / batch_size);
        let mut nabla_biases = delta.sum_axis(Axis(1)).insert_axis(Axis(1));
        nabla_biases.mapv_inplace(|nb| nb * self.learning_rate / batch_size);

        self.weights -= &nabla_weights;
        self.biases -= &nabla_biases;
        Ok(())
    }
}

// An error signal must have one row per neuron and one column per sample of the cached batch.
fn check_batch_shape(
    context: &'static str,
    actual: &Array2<f64>,
    expected: &Array2<f64>,
) -> Result<()> {
    if actual.nrows() != expected.nrows() {
        return Err(Error::DimensionMismatch {
            context,
            expected: expected.nrows(),
            actual: actual.nrows(),
        });
    }
    if actual.ncols() != expected.ncols() {
        return Err(Error::DimensionMismatch {
            context,
            expected: expected.ncols(),
            actual: actual.ncols(),
        });
    }
    Ok(())
}
