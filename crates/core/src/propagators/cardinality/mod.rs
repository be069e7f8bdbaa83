//! Counting constraints.
mod global_cardinality;
mod partial_sum;

pub use global_cardinality::*;
