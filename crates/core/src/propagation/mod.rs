//! The building blocks of propagators.
//!
//! A propagator takes a set of variables with their domains `D` and maps them to `D' ⊆ D`,
//! removing values which cannot be part of any solution of its constraint. It is at fixpoint
//! when applying it again removes nothing. Propagators are not required to be idempotent: the
//! driver calls a propagator again for as long as it is woken by new events.
//!
//! Each propagator implements [`Propagator`] and is created by a [`PropagatorConstructor`], which
//! registers the propagation conditions (the [`DomainEvents`](crate::engine::DomainEvents) per
//! variable that should wake the propagator), allocates reversible state, and requests delta
//! monitors through the [`PropagatorConstructorContext`].
//!
//! The workflow for a new propagator:
//! 1. implement [`Propagator::propagate_from_scratch`], which must work without any prior state;
//! 2. write tests against it with the test solver;
//! 3. implement [`Propagator::notify`] and [`Propagator::propagate`] to exploit incrementality,
//!    keeping every cache which must survive backtracking in trailed integers;
//! 4. pick a [`Priority`] and implement [`Propagator::is_entailed`].

mod constructor;
mod contexts;
mod local_id;
mod propagator;
mod propagator_id;

pub use constructor::PropagatorConstructor;
pub use constructor::PropagatorConstructorContext;
pub use contexts::Domains;
pub use contexts::HasAssignments;
pub use contexts::NotificationContext;
pub use contexts::PropagationContext;
pub use contexts::ReadDomains;
pub use local_id::LocalId;
pub use propagator::EnqueueDecision;
pub use propagator::Entailment;
pub use propagator::Priority;
pub use propagator::Propagator;
pub use propagator_id::PropagatorId;
pub use propagator_id::PropagatorVarId;
