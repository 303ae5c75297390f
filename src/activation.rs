use ndarray::Array2;
use std::fmt;
use std::str::FromStr;

/// The nonlinearity a layer applies after its affine transform.
///
/// `Softmax` normalises each column of the output into a probability
/// distribution. It pairs with a cross-entropy cost, so it is only allowed on
/// the last layer of a network, where its error term skips the activation
/// derivative entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Logistic,
    Softmax,
}

impl Activation {
    // Applies the activation in place to a [neurons x batch] matrix of weighted inputs.
    pub fn apply(self, z: &mut Array2<f64>) {
        match self {
            Activation::Logistic => z.mapv_inplace(sigmoid),
            Activation::Softmax => {
                for mut column in z.columns_mut() {
                    // Shift by the column maximum so the largest exponent is e^0 and nothing
                    // overflows. This leaves the normalised result unchanged.
                    let max = column.fold(f64::NEG_INFINITY, |max, &value| max.max(value));
                    column.mapv_inplace(|value| (value - max).exp());
                    let sum = column.sum();
                    column /= sum;
                }
            }
        }
    }

    /// Elementwise derivative, expressed in terms of the activation's own output.
    ///
    /// For softmax this is the diagonal of the Jacobian, which is only ever
    /// consumed if a caller asks for it explicitly; the terminal error term
    /// below does not use it.
    pub fn derivative(self, output: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Logistic | Activation::Softmax => output.mapv(|a| a * (1.0 - a)),
        }
    }

    /// Error term of a terminal layer with this activation.
    ///
    /// Logistic outputs use the quadratic cost, so the cost gradient is scaled
    /// by the activation derivative. Softmax outputs use cross-entropy, where
    /// the derivative cancels and the error is simply `output - target`.
    pub fn terminal_delta(
        self,
        output: &Array2<f64>,
        target: &Array2<f64>,
        derivative: &Array2<f64>,
    ) -> Array2<f64> {
        match self {
            Activation::Logistic => (output - target) * derivative,
            Activation::Softmax => output - target,
        }
    }

    pub fn is_terminal_only(self) -> bool {
        matches!(self, Activation::Softmax)
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Logistic => write!(f, "logistic"),
            Activation::Softmax => write!(f, "softmax"),
        }
    }
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logistic" | "sigmoid" => Ok(Activation::Logistic),
            "softmax" => Ok(Activation::Softmax),
            other => Err(format!("unknown activation '{other}'")),
        }
    }
}

/// Logistic function. Mathematically the result lies in (0, 1), but in f64 it
/// rounds to exactly 1.0 once `z` exceeds about 36.7, and to 0.0 once `z`
/// drops below about -745. A saturated neuron has a zero derivative.
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + f64::exp(-z))
}
