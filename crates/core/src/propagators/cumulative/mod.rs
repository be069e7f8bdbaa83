//! Propagators for the [Cumulative](https://sofdem.github.io/gccat/gccat/Ccumulative.html)
//! constraint.
//!
//! The constraint reasons over a set of tasks on a single resource with a capacity. Every task
//! consists of:
//! - a start time `s_i`;
//! - a duration `d_i`, during which it cannot be interrupted;
//! - an end time `e_i = s_i + d_i`;
//! - a resource usage (height) `h_i`.
//!
//! All four, and the capacity, are variables. The following time points are used throughout:
//! - `EST_i`, the earliest start time `lb(s_i)`;
//! - `LST_i`, the latest start time `ub(s_i)`;
//! - `ECT_i`, the earliest completion time `lb(e_i)`;
//! - `LCT_i`, the latest completion time `ub(e_i)`.
//!
//! A task executes at time `t` if `s_i <= t < e_i`. The constraint ensures that at every time
//! point the summed heights of the executing tasks do not exceed the capacity. The interval
//! `[LST_i, ECT_i)`, when it is not empty, is the compulsory part of the task: it executes there
//! in every solution.
//!
//! Two propagators are available:
//! - [`CumulativePropagator`] filters every task on every call;
//! - [`IncrementalCumulativePropagator`] maintains a graph of the tasks which may overlap and
//!   only filters the tasks touched since the last call together with their neighbours.
//!
//! Both delegate the actual reasoning to the filter selected by
//! [`CumulativeOptions::filter`].
//!
//! # Example
//! ```rust
//! # use propagation_core::engine::State;
//! # use propagation_core::propagators::ArgTask;
//! # use propagation_core::propagators::Cumulative;
//! # use propagation_core::propagators::CumulativeOptions;
//! let mut state = State::default();
//! let task = |state: &mut State, duration: i32| ArgTask {
//!     start: state.new_variable(0, 10),
//!     duration: state.new_variable(duration, duration),
//!     end: state.new_variable(0, 10 + duration),
//!     height: state.new_variable(2, 2),
//! };
//! let first = task(&mut state, 5);
//! let second = task(&mut state, 4);
//! let second_start = second.start;
//! state.fix(first.start, 0).expect("non-empty domain");
//! let capacity = state.new_variable(3, 3);
//!
//! let _ = state
//!     .add_propagator(Cumulative::new(
//!         [first, second].into(),
//!         capacity,
//!         CumulativeOptions::default(),
//!     ))
//!     .expect("the tasks fit");
//!
//! assert_eq!(5, state.lower_bound(second_start));
//! ```
mod filters;
mod incremental_propagator;
mod options;
mod profile;
mod propagator;
mod task;

use std::marker::PhantomData;

pub use incremental_propagator::IncrementalCumulativePropagator;
pub use options::*;
pub use propagator::CumulativePropagator;
pub use task::ArgTask;
pub(crate) use task::Task;

/// The [`PropagatorConstructor`](crate::propagation::PropagatorConstructor) for the cumulative
/// propagators; `Propagator` selects which one is created.
#[derive(Debug)]
pub struct CumulativeConstructor<Var, Propagator> {
    pub(crate) tasks: Box<[ArgTask<Var>]>,
    pub(crate) capacity: Var,
    pub(crate) options: CumulativeOptions,
    propagator_type: PhantomData<Propagator>,
}

impl<Var, Propagator> CumulativeConstructor<Var, Propagator> {
    pub fn new(tasks: Box<[ArgTask<Var>]>, capacity: Var, options: CumulativeOptions) -> Self {
        CumulativeConstructor {
            tasks,
            capacity,
            options,
            propagator_type: PhantomData,
        }
    }
}

impl<Var: Clone, Propagator> Clone for CumulativeConstructor<Var, Propagator> {
    fn clone(&self) -> Self {
        CumulativeConstructor::new(self.tasks.clone(), self.capacity.clone(), self.options)
    }
}

pub type Cumulative<Var> = CumulativeConstructor<Var, CumulativePropagator<Var>>;

pub type IncrementalCumulative<Var> =
    CumulativeConstructor<Var, IncrementalCumulativePropagator<Var>>;
