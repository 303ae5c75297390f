use crate::error::{Error, Result};
use itertools::Itertools;
use ndarray::{Array, Array2, ArrayView2, Axis, concatenate};

// A single input paired with its correct class. The input is a [features x 1] column and the
// target is a [classes x 1] column with the neuron for the correct class set to 1.0 and every
// other neuron set to 0.0, which is the perfect output activation of the network. The prediction
// stays empty until the sample has been through an evaluation.
#[derive(Debug, Clone)]
pub struct Sample {
    input: Array2<f64>,
    target: Array2<f64>,
    label: usize,
    predicted: Option<Array2<f64>>,
}

impl Sample {
    pub fn new(features: Vec<f64>, label: usize, classes: usize) -> Result<Sample> {
        if label >= classes {
            return Err(Error::LabelOutOfRange { label, classes });
        }
        let input = Array2::from_shape_vec((features.len(), 1), features)?;
        let target =
            Array::from_shape_fn((classes, 1), |(i, _j)| if i == label { 1.0 } else { 0.0 });
        Ok(Sample {
            input,
            target,
            label,
            predicted: None,
        })
    }

    pub fn input(&self) -> &Array2<f64> {
        &self.input
    }

    pub fn target(&self) -> &Array2<f64> {
        &self.target
    }

    pub fn label(&self) -> usize {
        self.label
    }

    pub fn features(&self) -> usize {
        self.input.nrows()
    }

    pub fn classes(&self) -> usize {
        self.target.nrows()
    }

    /// The network output recorded by the most recent evaluation, if any.
    pub fn predicted(&self) -> Option<&Array2<f64>> {
        self.predicted.as_ref()
    }

    /// Index of the strongest predicted class.
    pub fn predicted_label(&self) -> Option<usize> {
        self.predicted.as_ref().and_then(|output| argmax(output))
    }

    pub fn is_correct(&self) -> bool {
        self.predicted_label() == Some(self.label)
    }

    pub(crate) fn set_predicted(&mut self, output: Array2<f64>) {
        self.predicted = Some(output);
    }
}

/// Index of the largest value, or `None` if there are none.
pub fn argmax<'a, I>(values: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a f64>,
{
    values.into_iter().position_max_by(|a, b| a.total_cmp(b))
}

/// A minibatch laid out column-major: column `j` of `inputs` and `targets`
/// belongs to the `j`th sample the batch was built from.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Array2<f64>,
    pub targets: Array2<f64>,
}

impl Batch {
    pub fn from_samples<'a, I>(samples: I) -> Result<Batch>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let (inputs, targets): (Vec<ArrayView2<f64>>, Vec<ArrayView2<f64>>) = samples
            .into_iter()
            .map(|sample| (sample.input.view(), sample.target.view()))
            .unzip();
        if inputs.is_empty() {
            return Err(Error::EmptyBatch);
        }

        // Combine each input and target into a single matrix where each column corresponds to a
        // separate sample. Concatenation fails if the samples disagree on their dimensions.
        Ok(Batch {
            inputs: concatenate(Axis(1), &inputs)?,
            targets: concatenate(Axis(1), &targets)?,
        })
    }

    pub fn len(&self) -> usize {
        self.inputs.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hot_target_marks_only_the_label() {
        for classes in 1..6 {
            for label in 0..classes {
                let sample = Sample::new(vec![0.0; 3], label, classes).unwrap();
                let target = sample.target();
                assert_eq!(target.dim(), (classes, 1));
                for (i, &value) in target.iter().enumerate() {
                    assert_eq!(value, if i == label { 1.0 } else { 0.0 });
                }
            }
        }
    }

    #[test]
    fn label_outside_class_range_is_rejected() {
        let err = Sample::new(vec![0.5], 10, 10).unwrap_err();
        assert!(matches!(err, Error::LabelOutOfRange { label: 10, classes: 10 }));
    }

    #[test]
    fn batch_stacks_samples_as_columns() {
        let a = Sample::new(vec![1.0, 2.0], 0, 3).unwrap();
        let b = Sample::new(vec![3.0, 4.0], 2, 3).unwrap();
        let batch = Batch::from_samples([&a, &b]).unwrap();

        assert_eq!(batch.inputs.dim(), (2, 2));
        assert_eq!(batch.targets.dim(), (3, 2));
        assert_eq!(batch.inputs.column(1).to_vec(), vec![3.0, 4.0]);
        assert_eq!(batch.targets.column(1).to_vec(), vec![0.0, 0.0, 1.0]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn empty_and_ragged_batches_fail() {
        let none: Vec<&Sample> = Vec::new();
        assert!(matches!(Batch::from_samples(none), Err(Error::EmptyBatch)));

        let a = Sample::new(vec![1.0, 2.0], 0, 2).unwrap();
        let b = Sample::new(vec![1.0, 2.0, 3.0], 0, 2).unwrap();
        assert!(matches!(Batch::from_samples([&a, &b]), Err(Error::Shape(_))));
    }

    #[test]
    fn prediction_is_tracked_after_evaluation() {
        let mut sample = Sample::new(vec![0.0], 1, 3).unwrap();
        assert_eq!(sample.predicted_label(), None);
        assert!(!sample.is_correct());

        sample.set_predicted(ndarray::array![[0.1], [0.7], [0.2]]);
        assert_eq!(sample.predicted_label(), Some(1));
        assert!(sample.is_correct());
    }
}
