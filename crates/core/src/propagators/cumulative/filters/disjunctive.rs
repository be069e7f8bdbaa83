use std::rc::Rc;

use log::trace;

use super::CumulativeFilter;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::IntegerVariable;
use crate::propagation::PropagationContext;
use crate::propagation::ReadDomains;
use crate::propagators::cumulative::Task;

/// Reasoning on the tasks which can never run at the same time because any two of them together
/// need more than the capacity, i.e. the tasks with `2 * height > capacity`.
///
/// Such a set behaves like a unary resource. For every pair the filter detects the precedences
/// which are forced by the time windows, and it checks that the durations of the tasks inside
/// every task interval `[est_a, lct_b]` fit in the interval. The filter is quadratic and only runs
/// on sets smaller than `max_tasks`.
#[derive(Debug)]
pub(crate) struct DisjunctiveTaskIntervalFilter {
    max_tasks: usize,
    unary: Vec<usize>,
    by_completion: Vec<usize>,
}

impl DisjunctiveTaskIntervalFilter {
    pub(crate) fn new(max_tasks: usize) -> Self {
        DisjunctiveTaskIntervalFilter {
            max_tasks,
            unary: Vec::new(),
            by_completion: Vec::new(),
        }
    }

    fn detect_precedences<Var: IntegerVariable>(
        &self,
        context: &mut PropagationContext,
        tasks: &[Rc<Task<Var>>],
    ) -> PropagationStatusCP {
        for (position, &first) in self.unary.iter().enumerate() {
            for &second in self.unary[position + 1..].iter() {
                let (a, b) = (&tasks[first], &tasks[second]);
                let a_before_b = a.ect(&*context) <= b.lst(&*context);
                let b_before_a = b.ect(&*context) <= a.lst(&*context);

                match (a_before_b, b_before_a) {
                    (false, false) => {
                        return Err(PropagatorConflict::new(format!(
                            "tasks {first} and {second} can be ordered in neither way"
                        ))
                        .into());
                    }
                    (true, false) => {
                        trace!("task {first} precedes task {second}");
                        let (earliest_completion, latest_start) = (a.ect(&*context), b.lst(&*context));
                        b.push_start(context, earliest_completion)?;
                        a.push_end(context, latest_start)?;
                    }
                    (false, true) => {
                        trace!("task {second} precedes task {first}");
                        let (earliest_completion, latest_start) = (b.ect(&*context), a.lst(&*context));
                        a.push_start(context, earliest_completion)?;
                        b.push_end(context, latest_start)?;
                    }
                    (true, true) => {}
                }
            }
        }

        Ok(())
    }

    fn check_task_intervals<Var: IntegerVariable>(
        &mut self,
        context: &impl ReadDomains,
        tasks: &[Rc<Task<Var>>],
    ) -> PropagationStatusCP {
        self.by_completion.clear();
        self.by_completion.extend_from_slice(&self.unary);
        self.by_completion
            .sort_by_key(|&index| tasks[index].lct(context));

        for &first in self.unary.iter() {
            let interval_start = tasks[first].est(context);
            let mut total_duration: i64 = 0;
            for &index in self.by_completion.iter() {
                let task = &tasks[index];
                if task.est(context) < interval_start {
                    continue;
                }
                total_duration += task.min_duration(context) as i64;
                let interval_end = task.lct(context);
                if total_duration > (interval_end - interval_start) as i64 {
                    return Err(PropagatorConflict::new(format!(
                        "the tasks in [{interval_start}, {interval_end}) need {total_duration} time units"
                    ))
                    .into());
                }
            }
        }

        Ok(())
    }
}

impl<Var: IntegerVariable> CumulativeFilter<Var> for DisjunctiveTaskIntervalFilter {
    fn filter(
        &mut self,
        context: &mut PropagationContext,
        tasks: &[Rc<Task<Var>>],
        capacity: &Var,
        subset: &[usize],
    ) -> PropagationStatusCP {
        let capacity = context.upper_bound(capacity) as i64;
        self.unary.clear();
        self.unary
            .extend(subset.iter().copied().filter(|&index| {
                tasks[index].min_duration(&*context) > 0
                    && 2 * tasks[index].min_height(&*context) as i64 > capacity
            }));
        if self.unary.len() < 2 || self.unary.len() >= self.max_tasks {
            return Ok(());
        }

        self.detect_precedences(context, tasks)?;
        self.check_task_intervals(&*context, tasks)
    }
}

#[cfg(test)]
mod tests {
    use crate::basic_types::ConstraintOperationError;
    use crate::engine::test_solver::TestSolver;
    use crate::propagators::cumulative::filters::test_utils::task;
    use crate::propagators::cumulative::Cumulative;
    use crate::propagators::cumulative::CumulativeFilterKind;
    use crate::propagators::cumulative::CumulativeOptions;

    fn disjunctive(max_tasks: usize) -> CumulativeOptions {
        CumulativeOptions {
            filter: CumulativeFilterKind::DisjunctiveTaskInterval,
            disjunctive_max_tasks: max_tasks,
            ..Default::default()
        }
    }

    #[test]
    fn forced_precedence_moves_both_tasks() {
        let mut solver = TestSolver::default();
        let first = task(&mut solver, 0, 3, 4, 2);
        let second = task(&mut solver, 2, 10, 3, 2);
        let (first_end, second_start) = (first.end, second.start);
        let capacity = solver.new_variable(3, 3);

        let _ = solver
            .new_propagator(Cumulative::new(
                [first, second].into(),
                capacity,
                disjunctive(50),
            ))
            .expect("no empty domains");

        // The second task cannot finish before the latest start of the first one.
        solver.assert_bounds(second_start, 4, 10);
        solver.assert_bounds(first_end, 4, 7);
    }

    #[test]
    fn light_tasks_are_not_unary() {
        let mut solver = TestSolver::default();
        let first = task(&mut solver, 0, 3, 4, 1);
        let second = task(&mut solver, 2, 10, 3, 1);
        let second_start = second.start;
        let capacity = solver.new_variable(3, 3);

        let _ = solver
            .new_propagator(Cumulative::new(
                [first, second].into(),
                capacity,
                disjunctive(50),
            ))
            .expect("no empty domains");

        solver.assert_bounds(second_start, 2, 10);
    }

    #[test]
    fn task_interval_overload_is_infeasible() {
        let mut solver = TestSolver::default();
        let first = task(&mut solver, 0, 4, 3, 2);
        let second = task(&mut solver, 0, 4, 3, 2);
        let third = task(&mut solver, 0, 4, 3, 2);
        let capacity = solver.new_variable(3, 3);

        // Three unary tasks of length 3 in the interval [0, 7).
        let result = solver.new_propagator(Cumulative::new(
            [first, second, third].into(),
            capacity,
            disjunctive(50),
        ));

        assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
    }

    #[test]
    fn large_sets_are_skipped() {
        let mut solver = TestSolver::default();
        let first = task(&mut solver, 0, 3, 4, 2);
        let second = task(&mut solver, 2, 10, 3, 2);
        let second_start = second.start;
        let capacity = solver.new_variable(3, 3);

        let _ = solver
            .new_propagator(Cumulative::new(
                [first, second].into(),
                capacity,
                disjunctive(2),
            ))
            .expect("no empty domains");

        solver.assert_bounds(second_start, 2, 10);
    }
}
