use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;
use rand_distr::{BernoulliError, uniform::Error as UniformError};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    Shape(ShapeError),
    LabelOutOfRange {
        label: u32,
        classes: usize,
    },
    BackwardBeforeForward(&'static str),
    InvalidDistribution(String),
    InvalidConfig(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MlErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => {
                format!(
                    "There's a size mismatch between {a} and {b}, got {got} and expected {expected}"
                )
            }
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => format!("The {what} has shape {got:?}, expected {expected:?}"),
            MlErr::Shape(e) => format!("Invalid array shape: {e}"),
            MlErr::LabelOutOfRange { label, classes } => {
                format!("The label {label} is out of range for {classes} classes")
            }
            MlErr::BackwardBeforeForward(layer) => {
                format!("Tried to run the backward pass of a {layer} layer before its forward pass")
            }
            MlErr::InvalidDistribution(e) => format!("Invalid distribution parameters: {e}"),
            MlErr::InvalidConfig(e) => format!("Invalid model configuration: {e}"),
        };

        write!(f, "{s}")
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<UniformError> for MlErr {
    fn from(value: UniformError) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}

impl From<BernoulliError> for MlErr {
    fn from(value: BernoulliError) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}
