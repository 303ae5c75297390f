//! Handwritten digit classification with a layered feed-forward network
//! trained by minibatch stochastic gradient descent and backpropagation.
//!
//! - `activation`: logistic and softmax activations and their output-layer error terms
//! - `sample`: labelled samples with one-hot targets, and column-major minibatches
//! - `layer`: one affine transform plus activation, with its own learning rate
//! - `network`: an ordered chain of layers; forward pass, backpropagation, evaluation
//! - `training`: minibatch sampling and the epoch loop
//! - `mnist`: gzipped IDX decoding for the MNIST digits
//! - `error`: the crate's error type

pub mod activation;
pub mod error;
pub mod layer;
pub mod mnist;
pub mod network;
pub mod sample;
pub mod training;

pub use activation::Activation;
pub use error::{Error, Result};
pub use layer::Layer;
pub use network::{Evaluation, Network};
pub use sample::{Batch, Sample};
pub use training::{
    EpochReport, SamplingPolicy, TrainingConfig, TrainingData, stochastic_gradient_descent,
};
