use std::rc::Rc;

use fnv::FnvHashSet;
use log::debug;

use super::filters::create_filter;
use super::filters::CumulativeFilter;
use super::profile::cumulative_entailment;
use super::propagator::detect_overload;
use super::task::create_tasks;
use super::IncrementalCumulative;
use super::Task;
use crate::basic_types::ConstraintOperationError;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::create_statistics_struct;
use crate::engine::variables::IntegerVariable;
use crate::engine::DomainEvent;
use crate::propagation::Domains;
use crate::propagation::EnqueueDecision;
use crate::propagation::Entailment;
use crate::propagation::LocalId;
use crate::propagation::NotificationContext;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::ReadDomains;
use crate::statistics::Statistic;
use crate::statistics::StatisticLogger;

create_statistics_struct!(IncrementalCumulativeStatistics {
    num_full_filterings: u64,
    num_incremental_filterings: u64,
    num_removed_overlaps: u64,
});

impl<Var: IntegerVariable + 'static> PropagatorConstructor for IncrementalCumulative<Var> {
    type PropagatorImpl = IncrementalCumulativePropagator<Var>;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        let tasks = create_tasks(&self.tasks, &self.capacity, &mut context)?;
        let num_tasks = tasks.len();

        Ok(IncrementalCumulativePropagator {
            tasks,
            capacity: self.capacity,
            filter: create_filter(&self.options),
            threshold: self.options.incremental_threshold_factor * num_tasks,
            overlaps: vec![FnvHashSet::default(); num_tasks],
            overlaps_valid: false,
            touched: Vec::new(),
            is_touched: vec![false; num_tasks],
            num_changes: 0,
            capacity_changed: false,
            subset: Vec::new(),
            statistics: IncrementalCumulativeStatistics::default(),
        })
    }
}

/// Propagator for the cumulative constraint which keeps a graph with an edge between every two
/// tasks whose envelopes `[EST, LCT)` intersect.
///
/// Only the tasks touched since the last call and their neighbours in the graph are filtered.
/// Edges are removed when the envelopes of their tasks separate; envelopes only shrink, so the
/// graph stays a superset of the overlaps until backtracking, after which it is rebuilt on the
/// next call. The propagator filters all tasks when the capacity changed or the number of
/// changes reaches the threshold.
#[derive(Debug)]
pub struct IncrementalCumulativePropagator<Var> {
    tasks: Box<[Rc<Task<Var>>]>,
    capacity: Var,
    filter: Box<dyn CumulativeFilter<Var>>,
    threshold: usize,

    overlaps: Vec<FnvHashSet<usize>>,
    overlaps_valid: bool,

    touched: Vec<usize>,
    is_touched: Vec<bool>,
    num_changes: usize,
    capacity_changed: bool,

    subset: Vec<usize>,
    statistics: IncrementalCumulativeStatistics,
}

impl<Var: IntegerVariable + 'static> IncrementalCumulativePropagator<Var> {
    fn rebuild_overlaps(&mut self, context: &impl ReadDomains) {
        for neighbours in self.overlaps.iter_mut() {
            neighbours.clear();
        }
        for (index, task) in self.tasks.iter().enumerate() {
            for (other_index, other) in self.tasks.iter().enumerate().skip(index + 1) {
                if task.may_overlap(other, context) {
                    let _ = self.overlaps[index].insert(other_index);
                    let _ = self.overlaps[other_index].insert(index);
                }
            }
        }
        self.overlaps_valid = true;
    }

    fn clear_changes(&mut self) {
        for &index in self.touched.iter() {
            self.is_touched[index] = false;
        }
        self.touched.clear();
        self.num_changes = 0;
        self.capacity_changed = false;
    }

    fn filter_all(&mut self, context: &mut PropagationContext) -> PropagationStatusCP {
        self.statistics.num_full_filterings += 1;
        self.rebuild_overlaps(&*context);
        self.subset.clear();
        self.subset.extend(0..self.tasks.len());
        self.filter
            .filter(context, &self.tasks, &self.capacity, &self.subset)
    }

    fn filter_touched(&mut self, context: &mut PropagationContext) -> PropagationStatusCP {
        self.statistics.num_incremental_filterings += 1;

        let mut in_subset = vec![false; self.tasks.len()];
        self.subset.clear();
        for &index in self.touched.iter() {
            let task = &self.tasks[index];
            let separated = self.overlaps[index]
                .iter()
                .copied()
                .filter(|&other| !task.may_overlap(&self.tasks[other], &*context))
                .collect::<Vec<_>>();
            for other in separated {
                let _ = self.overlaps[index].remove(&other);
                let _ = self.overlaps[other].remove(&index);
                self.statistics.num_removed_overlaps += 1;
            }

            for &task_index in self.overlaps[index].iter().chain(std::iter::once(&index)) {
                if !in_subset[task_index] {
                    in_subset[task_index] = true;
                    self.subset.push(task_index);
                }
            }
        }
        self.subset.sort_unstable();

        self.filter
            .filter(context, &self.tasks, &self.capacity, &self.subset)
    }
}

impl<Var: IntegerVariable + 'static> Propagator for IncrementalCumulativePropagator<Var> {
    fn name(&self) -> &str {
        "IncrementalCumulative"
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        for task in self.tasks.iter() {
            task.enforce_consistency(&mut context)?;
        }
        self.clear_changes();
        self.filter_all(&mut context)
    }

    fn propagate(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        for task in self.tasks.iter() {
            task.enforce_consistency(&mut context)?;
        }

        let result = if !self.overlaps_valid
            || self.capacity_changed
            || self.num_changes >= self.threshold
        {
            debug!(
                "filtering all tasks (graph valid: {}, capacity changed: {}, changes: {})",
                self.overlaps_valid, self.capacity_changed, self.num_changes
            );
            self.filter_all(&mut context)
        } else {
            self.filter_touched(&mut context)
        };
        self.clear_changes();
        result
    }

    fn notify(
        &mut self,
        _context: NotificationContext,
        local_id: LocalId,
        _event: DomainEvent,
    ) -> EnqueueDecision {
        let index = local_id.unpack() as usize / 4;
        if index >= self.tasks.len() {
            self.capacity_changed = true;
        } else {
            self.num_changes += 1;
            if !self.is_touched[index] {
                self.is_touched[index] = true;
                self.touched.push(index);
            }
        }
        EnqueueDecision::Enqueue
    }

    fn synchronise(&mut self, _domains: Domains) {
        self.overlaps_valid = false;
        self.clear_changes();
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        cumulative_entailment(&domains, &self.tasks, &self.capacity)
    }

    fn detect_inconsistency(&self, domains: Domains) -> Option<PropagatorConflict> {
        detect_overload(&domains, &self.tasks, &self.capacity)
    }

    fn log_statistics(&self, statistic_logger: StatisticLogger) {
        self.statistics.log(statistic_logger);
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::Rng;
    use rand::SeedableRng;

    use super::*;
    use crate::engine::test_solver::TestSolver;
    use crate::engine::variables::DomainId;
    use crate::propagators::cumulative::filters::test_utils::enumerate_start_times;
    use crate::propagators::cumulative::filters::test_utils::task;
    use crate::propagators::cumulative::filters::test_utils::ALL_FILTERS;
    use crate::propagators::cumulative::ArgTask;
    use crate::propagators::cumulative::CumulativeFilterKind;
    use crate::propagators::cumulative::CumulativeOptions;

    fn incremental(filter: CumulativeFilterKind) -> CumulativeOptions {
        CumulativeOptions {
            filter,
            incremental: true,
            ..Default::default()
        }
    }

    #[test]
    fn touched_task_pushes_its_neighbour() {
        let mut solver = TestSolver::default();
        let first = task(&mut solver, 0, 6, 4, 2);
        let second = task(&mut solver, 0, 10, 3, 2);
        let far = task(&mut solver, 30, 40, 2, 2);
        let (first_start, second_start) = (first.start, second.start);
        let capacity = solver.new_variable(3, 3);

        let propagator = solver
            .new_propagator(IncrementalCumulative::new(
                [first, second, far].into(),
                capacity,
                incremental(CumulativeFilterKind::TimeTable),
            ))
            .expect("no empty domains");
        solver.assert_bounds(second_start, 0, 10);

        let _ = solver.fix(first_start, 2).expect("non-empty domain");
        solver.propagate(propagator).expect("no conflict");

        solver.assert_bounds(second_start, 6, 10);
        let statistics = solver
            .propagator::<IncrementalCumulativePropagator<DomainId>>(propagator)
            .statistics;
        assert_eq!(1, statistics.num_incremental_filterings);
        assert_eq!(1, statistics.num_full_filterings);
    }

    #[test]
    fn separated_envelopes_lose_their_edge() {
        let mut solver = TestSolver::default();
        let first = task(&mut solver, 0, 6, 2, 1);
        let second = task(&mut solver, 4, 10, 2, 1);
        let first_end = first.end;
        let capacity = solver.new_variable(3, 3);

        let propagator = solver
            .new_propagator(IncrementalCumulative::new(
                [first, second].into(),
                capacity,
                CumulativeOptions {
                    incremental_threshold_factor: 10,
                    ..incremental(CumulativeFilterKind::Sweep)
                },
            ))
            .expect("no empty domains");

        let _ = solver.set_upper_bound(first_end, 4).expect("non-empty domain");
        solver.propagate(propagator).expect("no conflict");

        let cumulative = solver.propagator::<IncrementalCumulativePropagator<DomainId>>(propagator);
        assert!(cumulative.overlaps[0].is_empty());
        assert_eq!(1, cumulative.statistics.num_removed_overlaps);
    }

    #[test]
    fn capacity_change_filters_all_tasks() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut solver = TestSolver::default();
        let fixed = task(&mut solver, 0, 0, 4, 2);
        let free = task(&mut solver, 0, 10, 2, 2);
        let start = free.start;
        let capacity = solver.new_variable(0, 10);

        let propagator = solver
            .new_propagator(IncrementalCumulative::new(
                [fixed, free].into(),
                capacity,
                incremental(CumulativeFilterKind::Default),
            ))
            .expect("no empty domains");

        let _ = solver.set_upper_bound(capacity, 3).expect("non-empty domain");
        solver.propagate(propagator).expect("no conflict");

        solver.assert_bounds(start, 4, 10);
        let statistics = solver
            .propagator::<IncrementalCumulativePropagator<DomainId>>(propagator)
            .statistics;
        assert_eq!(2, statistics.num_full_filterings);
    }

    #[test]
    fn graph_is_rebuilt_after_backtracking() {
        let mut solver = TestSolver::default();
        let first = task(&mut solver, 0, 6, 4, 2);
        let second = task(&mut solver, 0, 10, 3, 2);
        let (first_start, second_start) = (first.start, second.start);
        let capacity = solver.new_variable(3, 3);

        let propagator = solver
            .new_propagator(IncrementalCumulative::new(
                [first, second].into(),
                capacity,
                incremental(CumulativeFilterKind::TimeTable),
            ))
            .expect("no empty domains");

        solver.new_checkpoint();
        let _ = solver.fix(first_start, 2).expect("non-empty domain");
        solver.propagate(propagator).expect("no conflict");
        solver.assert_bounds(second_start, 6, 10);

        solver.synchronise(0);
        solver.assert_bounds(second_start, 0, 10);
        assert!(!solver
            .propagator::<IncrementalCumulativePropagator<DomainId>>(propagator)
            .overlaps_valid);

        let _ = solver.fix(first_start, 0).expect("non-empty domain");
        solver.propagate(propagator).expect("no conflict");
        solver.assert_bounds(second_start, 4, 10);
    }

    /// Narrows the start windows towards a known solution, propagating incrementally after every
    /// step, and checks that no solution within the current windows was removed.
    #[test]
    fn incremental_filtering_never_removes_solutions() {
        let mut rng = SmallRng::seed_from_u64(61);

        for _ in 0..100 {
            let num_tasks = rng.gen_range(2..=4);
            let capacity_value = rng.gen_range(1..=4);
            let specs = (0..num_tasks)
                .map(|_| {
                    let earliest = rng.gen_range(0..4);
                    let latest = earliest + rng.gen_range(0..5);
                    (
                        earliest,
                        latest,
                        rng.gen_range(1..=3),
                        rng.gen_range(1..=capacity_value),
                    )
                })
                .collect::<Vec<_>>();
            let solutions = enumerate_start_times(&specs, capacity_value);
            if solutions.is_empty() {
                continue;
            }

            for filter in ALL_FILTERS {
                let mut solver = TestSolver::default();
                let tasks = specs
                    .iter()
                    .map(|&(earliest, latest, duration, height)| {
                        task(&mut solver, earliest, latest, duration, height)
                    })
                    .collect::<Vec<ArgTask<DomainId>>>();
                let starts = tasks.iter().map(|task| task.start).collect::<Vec<_>>();
                let capacity = solver.new_variable(capacity_value, capacity_value);

                let propagator = solver
                    .new_propagator(IncrementalCumulative::new(
                        tasks.into(),
                        capacity,
                        CumulativeOptions {
                            incremental_threshold_factor: rng.gen_range(1..=3),
                            ..incremental(filter)
                        },
                    ))
                    .expect("a solution exists");

                for _ in 0..2 {
                    solver.new_checkpoint();
                    let target = &solutions[rng.gen_range(0..solutions.len())];
                    let mut windows = specs
                        .iter()
                        .map(|&(earliest, latest, _, _)| (earliest, latest))
                        .collect::<Vec<_>>();

                    for _ in 0..num_tasks {
                        let index = rng.gen_range(0..num_tasks);
                        let (lower, upper) = windows[index];
                        let lower = rng.gen_range(lower..=target[index]);
                        let upper = rng.gen_range(target[index]..=upper);
                        windows[index] = (lower, upper);
                        let _ = solver
                            .set_lower_bound(starts[index], lower)
                            .expect("the target stays in the domain");
                        let _ = solver
                            .set_upper_bound(starts[index], upper)
                            .expect("the target stays in the domain");

                        solver
                            .propagate(propagator)
                            .unwrap_or_else(|_| panic!("{filter:?} failed on {specs:?}"));

                        let within_windows = solutions.iter().filter(|solution| {
                            solution
                                .iter()
                                .zip(windows.iter())
                                .all(|(&start, &(lower, upper))| lower <= start && start <= upper)
                        });
                        for solution in within_windows {
                            for (start, &value) in starts.iter().zip(solution.iter()) {
                                assert!(
                                    solver.contains(*start, value),
                                    "{filter:?} removed {value} on {specs:?}"
                                );
                            }
                        }
                    }

                    solver.synchronise(0);
                }
            }
        }
    }
}
