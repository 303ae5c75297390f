use anyhow::{Context, Result};
use clap::Parser;
use digit_backprop::mnist::{self, MnistData};
use digit_backprop::{
    Activation, Network, SamplingPolicy, TrainingConfig, TrainingData, stochastic_gradient_descent,
};
use ndarray_rand::rand::{SeedableRng, rngs::StdRng};
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Train a feed-forward network on the MNIST handwritten digits.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the four gzipped MNIST IDX files
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Hidden layer sizes, comma separated
    #[arg(long, value_delimiter = ',', default_value = "30")]
    hidden: Vec<usize>,

    /// Learning rate used by every layer
    #[arg(short, long, default_value = "3.0")]
    learning_rate: f64,

    /// Activation of the output layer (logistic or softmax)
    #[arg(long, default_value = "logistic")]
    output: Activation,

    /// Samples per minibatch
    #[arg(short, long, default_value = "10")]
    batch_size: usize,

    /// Number of epochs to train for
    #[arg(short, long, default_value = "30")]
    epochs: u32,

    /// Minibatch policy: "epoch" or "random:<steps per epoch>"
    #[arg(long, default_value = "epoch")]
    sampling: SamplingPolicy,

    /// Evaluate on the test set every N epochs (0 disables evaluation)
    #[arg(long, default_value = "1")]
    evaluate_every: u32,

    /// Seed for weight initialisation and shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install the tracing subscriber")?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut mnist_data = MnistData::load(&args.data_dir)
        .with_context(|| format!("failed to load MNIST from {}", args.data_dir.display()))?;
    info!(
        training = mnist_data.training_data.len(),
        validation = mnist_data.validation_data.len(),
        test = mnist_data.test_data.len(),
        "loaded MNIST"
    );

    let mut sizes = Vec::with_capacity(args.hidden.len() + 2);
    sizes.push(mnist_data.features());
    sizes.extend(&args.hidden);
    sizes.push(mnist::CLASSES);
    let mut network = Network::from_sizes(&sizes, args.learning_rate, args.output, &mut rng)
        .context("invalid network layout")?;
    info!(?sizes, output = %args.output, "built network");

    let config = TrainingConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        sampling: args.sampling,
        evaluate_every: args.evaluate_every,
    };
    stochastic_gradient_descent(
        &mut network,
        TrainingData {
            training: &mut mnist_data.training_data,
            evaluation: &mut mnist_data.test_data,
        },
        &config,
        &mut rng,
        |_| ControlFlow::Continue(()),
    )?;

    match mnist_data
        .test_data
        .iter()
        .find(|sample| sample.predicted_label().is_some() && !sample.is_correct())
    {
        Some(sample) => println!("{}", mnist::render_ascii(sample, mnist_data.columns)),
        None => warn!("no misclassified test digit to show"),
    }

    Ok(())
}
