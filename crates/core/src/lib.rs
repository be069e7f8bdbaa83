//! Finite-domain constraint propagation over integer and graph variables.
//!
//! The crate provides the propagation core of a constraint solver:
//! - reversible domain stores for integer variables (bounds with holes) and graph variables
//!   (kernel and envelope), with checkpoints and backtracking ([`engine`]);
//! - event dispatch and delta monitors through which propagators learn what changed;
//! - the [`Propagator`](propagation::Propagator) contract;
//! - filtering algorithms for linear sums, binary relations, global cardinality, cumulative
//!   scheduling and graph structure ([`propagators`]);
//! - a reference fixpoint driver, [`State`](engine::State), and helpers to post constraints
//!   ([`constraints`]).
//!
//! Search, optimisation and modelling are left to the embedding solver.
//!
//! ```
//! use propagation_core::constraints;
//! use propagation_core::constraints::Constraint;
//! use propagation_core::engine::State;
//! use propagation_core::propagators::LinearOperator;
//!
//! let mut state = State::default();
//! let x = state.new_variable(0, 10);
//! let y = state.new_variable(0, 10);
//!
//! constraints::linear(vec![(1, x), (1, y)], LinearOperator::Equal, 4, Default::default())
//!     .post(&mut state)
//!     .expect("the constraint is feasible");
//! state.propagate_to_fixed_point().expect("no contradiction");
//!
//! assert_eq!(4, state.upper_bound(x));
//! ```

pub mod asserts;
mod basic_types;
pub mod constraints;
pub mod containers;
pub mod engine;
mod math;
pub mod propagation;
pub mod propagators;
pub mod statistics;

pub use basic_types::ConstraintOperationError;
pub use basic_types::Inconsistency;
pub use basic_types::PropagationStatusCP;
pub use basic_types::PropagatorConflict;
