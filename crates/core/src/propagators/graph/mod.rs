//! Structural propagators on graph variables.
//!
//! They reason on the kernel, the nodes and arcs which are in every solution, and on the
//! envelope, those which may be. For undirected graphs an arc `(i, j)` and its reverse are the
//! same edge.
mod anti_symmetry;
mod count;
mod diameter;
mod no_triangle;
mod transitivity;

pub use anti_symmetry::*;
pub use count::*;
pub use diameter::*;
pub use no_triangle::*;
pub use transitivity::*;
