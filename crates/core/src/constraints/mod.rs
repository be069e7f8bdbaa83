//! Helpers to add constraints to a [`State`].
//!
//! A constraint is a relation over variables, enforced by one or more propagators. Every
//! [`PropagatorConstructor`] is a [`Constraint`] posting exactly that propagator; the functions
//! in this module pick the propagators for a relation based on its size and options.
//!
//! # Example
//! ```
//! # use propagation_core::constraints;
//! # use propagation_core::constraints::Constraint;
//! # use propagation_core::engine::State;
//! # use propagation_core::propagators::LinearOperator;
//! let mut state = State::default();
//! let x = state.new_variable(0, 5);
//! let y = state.new_variable(0, 5);
//!
//! let terms = vec![(2, x), (-1, y)];
//! constraints::linear(terms, LinearOperator::GreaterOrEqual, 8, Default::default())
//!     .post(&mut state)
//!     .expect("the constraint is feasible");
//!
//! assert_eq!(4, state.lower_bound(x));
//! ```
mod arithmetic;
mod cumulative;

pub use arithmetic::*;
pub use cumulative::*;

use crate::engine::State;
use crate::propagation::PropagatorConstructor;
use crate::ConstraintOperationError;

/// A relation over variables which can be added to a [`State`].
pub trait Constraint {
    /// Adds the propagators of the constraint to `state`, running their initial propagation.
    ///
    /// Returns [`ConstraintOperationError::InfeasiblePropagator`] when one of them finds the
    /// constraint cannot be satisfied.
    fn post(self, state: &mut State) -> Result<(), ConstraintOperationError>;
}

impl<Constructor: PropagatorConstructor> Constraint for Constructor {
    fn post(self, state: &mut State) -> Result<(), ConstraintOperationError> {
        let _ = state.add_propagator(self)?;
        Ok(())
    }
}

impl<C: Constraint> Constraint for Vec<C> {
    fn post(self, state: &mut State) -> Result<(), ConstraintOperationError> {
        self.into_iter().try_for_each(|constraint| constraint.post(state))
    }
}
