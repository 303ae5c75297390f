use thiserror::Error;

/// Everything that can go wrong while building, training or feeding a network.
#[derive(Error, Debug)]
pub enum Error {
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid layer chain: {0}")]
    InvalidChain(String),

    #[error("invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("backpropagate called before any forward pass")]
    NoForwardPass,

    #[error("cannot build a batch from zero samples")]
    EmptyBatch,

    #[error("label {label} is out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    #[error("bad magic number in {file}: expected {expected}, found {found}")]
    BadMagic {
        file: String,
        expected: u32,
        found: u32,
    },

    #[error("{images} images but {labels} labels")]
    CountMismatch { images: u32, labels: u32 },

    #[error("truncated data: {0}")]
    Truncated(String),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
