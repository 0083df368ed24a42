use thiserror::Error;

/// Contract violations detected at construction time.
///
/// Numerical trouble (line-search exhaustion, divergence, iteration caps) is
/// never an `Error`; it is reported through
/// [`TerminationReason`](crate::TerminationReason).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid configuration: `{field}` {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    #[error("target dimension was not set")]
    MissingDimension,

    #[error("box lower bound exceeds upper bound at ({row}, {col})")]
    InvalidBox { row: usize, col: usize },

    #[error("{what} index {index} out of range (bound {bound})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        bound: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand used by the `validate()` methods of config structs.
pub fn ensure(cond: bool, field: &'static str, reason: &'static str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::InvalidConfig { field, reason })
    }
}
