//! The filtering algorithms, one module per family of constraints.
//!
//! Every propagator comes with an `XxxArgs` struct implementing
//! [`PropagatorConstructor`](crate::propagation::PropagatorConstructor), which registers the
//! propagator on its variables and creates its reversible state.
pub mod arithmetic;
pub mod binary;
pub mod cardinality;
pub mod cumulative;
pub mod graph;

pub use arithmetic::*;
pub use binary::*;
pub use cardinality::*;
pub use cumulative::*;
pub use graph::*;
