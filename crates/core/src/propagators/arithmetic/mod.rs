//! Propagators for linear arithmetic.
mod big_sum;
mod linear_sum;
mod scale;

pub use big_sum::*;
pub use linear_sum::LinearOperator;
pub use linear_sum::LinearSumArgs;
pub use linear_sum::LinearSumPropagator;
pub use scale::*;
