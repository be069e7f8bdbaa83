//! Propagators over two integer variables.
mod distance;
mod equals;

pub use distance::*;
pub use equals::*;
