use super::Constraint;
use crate::engine::variables::IntegerVariable;
use crate::engine::State;
use crate::propagators::ArgTask;
use crate::propagators::Cumulative;
use crate::propagators::CumulativeOptions;
use crate::propagators::IncrementalCumulative;
use crate::ConstraintOperationError;

/// Creates the [Cumulative](https://sofdem.github.io/gccat/gccat/Ccumulative.html) constraint:
/// at every time point, the summed heights of the executing tasks do not exceed `capacity`.
///
/// The filtering algorithm is chosen by [`CumulativeOptions::filter`]. With
/// [`CumulativeOptions::incremental`] the propagator only filters the tasks around a change, and
/// with [`CumulativeOptions::post_twice`] two copies of the propagator are posted, since none of
/// the filters reaches a fixpoint in a single call.
///
/// # Example
/// ```
/// # use propagation_core::constraints;
/// # use propagation_core::constraints::Constraint;
/// # use propagation_core::engine::State;
/// # use propagation_core::propagators::ArgTask;
/// let mut state = State::default();
/// let tasks = [(0, 4), (0, 6)]
///     .into_iter()
///     .map(|(earliest_start, latest_start)| {
///         let start = state.new_variable(earliest_start, latest_start);
///         ArgTask {
///             start,
///             duration: state.new_variable(3, 3),
///             end: state.new_variable(earliest_start + 3, latest_start + 3),
///             height: state.new_variable(2, 2),
///         }
///     })
///     .collect::<Vec<_>>();
/// let second_start = tasks[1].start;
/// let capacity = state.new_variable(3, 3);
///
/// let _ = state.fix(tasks[0].start, 1).expect("non-empty domain");
/// constraints::cumulative(tasks, capacity, Default::default())
///     .post(&mut state)
///     .expect("the tasks fit");
///
/// assert_eq!(4, state.lower_bound(second_start));
/// ```
pub fn cumulative<Var: IntegerVariable>(
    tasks: impl Into<Box<[ArgTask<Var>]>>,
    capacity: Var,
    options: CumulativeOptions,
) -> impl Constraint {
    CumulativeConstraint {
        tasks: tasks.into(),
        capacity,
        options,
    }
}

#[derive(Debug)]
struct CumulativeConstraint<Var> {
    tasks: Box<[ArgTask<Var>]>,
    capacity: Var,
    options: CumulativeOptions,
}

impl<Var: IntegerVariable> Constraint for CumulativeConstraint<Var> {
    fn post(self, state: &mut State) -> Result<(), ConstraintOperationError> {
        let copies = if self.options.post_twice { 2 } else { 1 };

        for _ in 0..copies {
            if self.options.incremental {
                IncrementalCumulative::new(self.tasks.clone(), self.capacity.clone(), self.options)
                    .post(state)?;
            } else {
                Cumulative::new(self.tasks.clone(), self.capacity.clone(), self.options)
                    .post(state)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::variables::DomainId;
    use crate::propagation::PropagatorId;
    use crate::propagators::CumulativePropagator;
    use crate::propagators::IncrementalCumulativePropagator;

    fn tasks(state: &mut State) -> Vec<ArgTask<DomainId>> {
        (0..3)
            .map(|_| ArgTask {
                start: state.new_variable(0, 10),
                duration: state.new_variable(2, 2),
                end: state.new_variable(0, 12),
                height: state.new_variable(1, 1),
            })
            .collect()
    }

    #[test]
    fn posted_twice_by_default() {
        let mut state = State::default();
        let tasks = tasks(&mut state);
        let capacity = state.new_variable(2, 2);

        cumulative(tasks, capacity, CumulativeOptions::default())
            .post(&mut state)
            .expect("the tasks fit");

        assert_eq!(2, state.num_propagators());
        assert!(state
            .get_propagator::<CumulativePropagator<DomainId>>(PropagatorId(1))
            .is_some());
    }

    #[test]
    fn incremental_propagator_posted_once() {
        let mut state = State::default();
        let tasks = tasks(&mut state);
        let capacity = state.new_variable(2, 2);
        let options = CumulativeOptions {
            incremental: true,
            post_twice: false,
            ..Default::default()
        };

        cumulative(tasks, capacity, options)
            .post(&mut state)
            .expect("the tasks fit");

        assert_eq!(1, state.num_propagators());
        assert!(state
            .get_propagator::<IncrementalCumulativePropagator<DomainId>>(PropagatorId(0))
            .is_some());
    }

    #[test]
    fn overload_is_infeasible() {
        let mut state = State::default();
        let tasks = tasks(&mut state);
        for task in tasks.iter() {
            let _ = state.fix(task.start, 3).expect("non-empty domain");
        }
        let capacity = state.new_variable(2, 2);

        let result = cumulative(tasks, capacity, CumulativeOptions::default()).post(&mut state);

        assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
    }
}
