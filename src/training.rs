use crate::error::{Error, Result};
use crate::network::{Evaluation, Network};
use crate::sample::{Batch, Sample};
use ndarray_rand::rand::{Rng, seq::SliceRandom};
use std::ops::ControlFlow;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How minibatches are drawn from the training pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingPolicy {
    /// Shuffle once per epoch and walk the pool in consecutive slices, so
    /// every sample is used exactly once per epoch.
    #[default]
    EpochPartition,
    /// Take `steps` independent random minibatches per epoch, each drawn
    /// without replacement.
    RandomSubset { steps: usize },
}

impl FromStr for SamplingPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "epoch" | "partition" => Ok(SamplingPolicy::EpochPartition),
            other => match other.strip_prefix("random:") {
                Some(steps) => steps
                    .parse()
                    .map(|steps| SamplingPolicy::RandomSubset { steps })
                    .map_err(|_| format!("invalid step count in '{other}'")),
                None => Err(format!(
                    "unknown sampling policy '{other}' (expected 'epoch' or 'random:<steps>')"
                )),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub epochs: u32,
    pub batch_size: usize,
    pub sampling: SamplingPolicy,
    /// Evaluate after every `evaluate_every` epochs. Zero disables evaluation.
    pub evaluate_every: u32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 30,
            batch_size: 10,
            sampling: SamplingPolicy::EpochPartition,
            evaluate_every: 1,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be at least 1".into()));
        }
        if let SamplingPolicy::RandomSubset { steps: 0 } = self.sampling {
            return Err(Error::InvalidConfig(
                "random sampling needs at least one step per epoch".into(),
            ));
        }
        Ok(())
    }
}

/// The data a training run works on.
pub struct TrainingData<'a> {
    pub training: &'a mut [Sample],
    pub evaluation: &'a mut [Sample],
}

/// What happened during one epoch, handed to the caller after the epoch ends.
#[derive(Debug, Clone, Copy)]
pub struct EpochReport {
    pub epoch: u32,
    pub steps: usize,
    pub elapsed: Duration,
    pub evaluation: Option<Evaluation>,
}

/// One gradient update: build a batch from `samples`, run it forward, then
/// backpropagate. The batch is never split, so a step either happens in full
/// or not at all.
pub fn train_step<'a, I>(network: &mut Network, samples: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Sample>,
{
    let batch = Batch::from_samples(samples)?;
    network.forward(batch.inputs)?;
    network.backpropagate(&batch.targets)?;
    Ok(())
}

/// Shuffles the pool in place and returns it cut into consecutive minibatches.
/// When `batch_size` does not divide the pool, the last minibatch is shorter.
pub fn shuffle_into_batches<'a, R: Rng + ?Sized>(
    pool: &'a mut [Sample],
    batch_size: usize,
    rng: &mut R,
) -> Result<std::slice::Chunks<'a, Sample>> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch size must be at least 1".into()));
    }
    pool.shuffle(rng);
    Ok(pool.chunks(batch_size))
}

/// Picks `batch_size` distinct samples at random. If the pool is smaller than
/// `batch_size`, every sample is returned in random order.
pub fn random_minibatch<'a, R: Rng + ?Sized>(
    pool: &'a [Sample],
    batch_size: usize,
    rng: &mut R,
) -> Vec<&'a Sample> {
    pool.choose_multiple(rng, batch_size).collect()
}

/// Runs one full epoch of training and returns the number of steps taken.
pub fn run_epoch<R: Rng + ?Sized>(
    network: &mut Network,
    pool: &mut [Sample],
    batch_size: usize,
    rng: &mut R,
) -> Result<usize> {
    let mut steps = 0;
    for mini_batch in shuffle_into_batches(pool, batch_size, rng)? {
        train_step(network, mini_batch)?;
        steps += 1;
    }
    Ok(steps)
}

/// Runs `steps` updates, each on its own random minibatch. Like
/// [`run_epoch`], an empty pool takes no steps.
pub fn run_random_steps<R: Rng + ?Sized>(
    network: &mut Network,
    pool: &[Sample],
    batch_size: usize,
    steps: usize,
    rng: &mut R,
) -> Result<usize> {
    if pool.is_empty() {
        return Ok(0);
    }
    for _ in 0..steps {
        train_step(network, random_minibatch(pool, batch_size, rng))?;
    }
    Ok(steps)
}

/// Trains the network with stochastic gradient descent.
///
/// Each epoch draws minibatches according to `config.sampling` and updates the
/// network once per minibatch. Every `config.evaluate_every` epochs the
/// network classifies the evaluation set and the result is logged. After
/// each epoch `on_epoch` receives a report and may return
/// `ControlFlow::Break(())` to stop; training never stops part-way through an
/// epoch.
///
/// Returns the reports of every epoch that ran.
pub fn stochastic_gradient_descent<R, F>(
    network: &mut Network,
    data: TrainingData<'_>,
    config: &TrainingConfig,
    rng: &mut R,
    mut on_epoch: F,
) -> Result<Vec<EpochReport>>
where
    R: Rng + ?Sized,
    F: FnMut(&EpochReport) -> ControlFlow<()>,
{
    config.validate()?;
    let mut reports = Vec::with_capacity(config.epochs as usize);

    for epoch in 0..config.epochs {
        let started = Instant::now();

        // Train on the training data.
        let steps = match config.sampling {
            SamplingPolicy::EpochPartition => {
                run_epoch(network, data.training, config.batch_size, rng)?
            }
            SamplingPolicy::RandomSubset { steps } => {
                run_random_steps(network, data.training, config.batch_size, steps, rng)?
            }
        };
        let elapsed = started.elapsed();
        debug!(epoch, steps, ?elapsed, "minibatches done");

        // Use the evaluation data to determine accuracy.
        let due = config.evaluate_every != 0 && (epoch + 1) % config.evaluate_every == 0;
        let evaluation = if due && !data.evaluation.is_empty() {
            let evaluation = network.evaluate(data.evaluation)?;
            info!(
                "Epoch {epoch}: {evaluation} ({:.2}%)",
                evaluation.accuracy() * 100.0
            );
            Some(evaluation)
        } else {
            info!("Epoch {epoch} complete");
            None
        };

        let report = EpochReport {
            epoch,
            steps,
            elapsed,
            evaluation,
        };
        reports.push(report);
        if on_epoch(&report).is_break() {
            debug!(epoch, "training stopped by caller");
            break;
        }
    }

    Ok(reports)
}
