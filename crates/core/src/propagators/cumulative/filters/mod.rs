//! The filtering algorithms of the cumulative propagators.
//!
//! A filter only narrows the domains of the tasks in the subset it is given, and only uses those
//! tasks to build its profiles. Filtering a subset is weaker than filtering all tasks but never
//! removes a solution.
mod default;
mod disjunctive;
mod energy;
mod sweep;
mod time_table;

use std::fmt::Debug;
use std::rc::Rc;

pub(crate) use default::DefaultFilter;
pub(crate) use disjunctive::DisjunctiveTaskIntervalFilter;
pub(crate) use energy::EnergyFilter;
pub(crate) use sweep::SweepFilter;
pub(crate) use time_table::TimeTableFilter;

use super::CumulativeFilterKind;
use super::CumulativeOptions;
use super::Task;
use crate::basic_types::PropagationStatusCP;
use crate::engine::variables::IntegerVariable;
use crate::propagation::PropagationContext;

pub(crate) trait CumulativeFilter<Var>: Debug {
    /// Filters the tasks with the given indices against `capacity`.
    fn filter(
        &mut self,
        context: &mut PropagationContext,
        tasks: &[Rc<Task<Var>>],
        capacity: &Var,
        subset: &[usize],
    ) -> PropagationStatusCP;
}

pub(crate) fn create_filter<Var: IntegerVariable + 'static>(
    options: &CumulativeOptions,
) -> Box<dyn CumulativeFilter<Var>> {
    match options.filter {
        CumulativeFilterKind::TimeTable => Box::<TimeTableFilter>::default(),
        CumulativeFilterKind::Sweep => Box::new(SweepFilter::new(false)),
        CumulativeFilterKind::SweepHeightSorted => Box::new(SweepFilter::new(true)),
        CumulativeFilterKind::Energy => Box::<EnergyFilter>::default(),
        CumulativeFilterKind::DisjunctiveTaskInterval => Box::new(
            DisjunctiveTaskIntervalFilter::new(options.disjunctive_max_tasks),
        ),
        CumulativeFilterKind::Default => Box::new(DefaultFilter::new(options)),
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::engine::test_solver::TestSolver;
    use crate::engine::variables::DomainId;
    use crate::propagators::cumulative::ArgTask;

    /// A task with a fixed duration and height whose start lies in `[earliest, latest]`.
    pub(crate) fn task(
        solver: &mut TestSolver,
        earliest: i32,
        latest: i32,
        duration: i32,
        height: i32,
    ) -> ArgTask<DomainId> {
        ArgTask {
            start: solver.new_variable(earliest, latest),
            duration: solver.new_variable(duration, duration),
            end: solver.new_variable(earliest + duration, latest + duration),
            height: solver.new_variable(height, height),
        }
    }

    pub(crate) const ALL_FILTERS: [CumulativeFilterKind; 6] = [
        CumulativeFilterKind::TimeTable,
        CumulativeFilterKind::Sweep,
        CumulativeFilterKind::SweepHeightSorted,
        CumulativeFilterKind::Energy,
        CumulativeFilterKind::DisjunctiveTaskInterval,
        CumulativeFilterKind::Default,
    ];

    /// Every assignment of start times within the given windows which never exceeds `capacity`.
    pub(crate) fn enumerate_start_times(
        specs: &[(i32, i32, i32, i32)],
        capacity: i32,
    ) -> Vec<Vec<i32>> {
        let mut solutions = Vec::new();
        let mut current = Vec::new();
        enumerate(specs, capacity, &mut current, &mut solutions);
        solutions
    }

    fn enumerate(
        specs: &[(i32, i32, i32, i32)],
        capacity: i32,
        current: &mut Vec<i32>,
        solutions: &mut Vec<Vec<i32>>,
    ) {
        if current.len() == specs.len() {
            let horizon = specs
                .iter()
                .zip(current.iter())
                .map(|(&(_, _, duration, _), &start)| start + duration)
                .max()
                .unwrap_or(0);
            let fits = (0..horizon).all(|time| {
                specs
                    .iter()
                    .zip(current.iter())
                    .filter(|(&(_, _, duration, _), &start)| start <= time && time < start + duration)
                    .map(|(&(_, _, _, height), _)| height)
                    .sum::<i32>()
                    <= capacity
            });
            if fits {
                solutions.push(current.clone());
            }
            return;
        }

        let (earliest, latest, _, _) = specs[current.len()];
        for start in earliest..=latest {
            current.push(start);
            enumerate(specs, capacity, current, solutions);
            let _ = current.pop();
        }
    }

    pub(crate) const TIME_TABLE_FILTERS: [CumulativeFilterKind; 4] = [
        CumulativeFilterKind::TimeTable,
        CumulativeFilterKind::Sweep,
        CumulativeFilterKind::SweepHeightSorted,
        CumulativeFilterKind::Default,
    ];
}
