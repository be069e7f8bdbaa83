use thiserror::Error;

#[cfg(doc)]
use crate::engine::State;

/// Errors raised while constructing a propagator or posting it to the [`State`].
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConstraintOperationError {
    /// The initial propagation of the constraint emptied a domain or detected a conflict.
    #[error("Adding the constraint failed because it is infeasible at the root")]
    InfeasiblePropagator,
    /// The coefficients and domains of the constraint can produce values which do not fit in
    /// 64-bit arithmetic.
    #[error("The constraint can produce intermediate values which overflow 64-bit arithmetic")]
    ArithmeticOverflow,
    /// A parameter of the constraint is malformed, e.g. a scale of zero or arrays of different
    /// lengths.
    #[error("Invalid constraint parameter: {0}")]
    InvalidParameter(&'static str),
}
