use std::rc::Rc;

use super::CumulativeFilter;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::IntegerVariable;
use crate::propagation::PropagationContext;
use crate::propagation::ReadDomains;
use crate::propagators::cumulative::Task;

/// Time-table reasoning with one entry per time point of the window spanned by the compulsory
/// parts; the memory is linear in the length of that window.
///
/// The filter raises the capacity to the peak of the profile, moves the start and end of every
/// task out of the time points where it would overload the resource, and caps the height of tasks
/// with a compulsory part by the room left next to the other tasks.
#[derive(Debug, Default)]
pub(crate) struct TimeTableFilter {
    profile: Vec<i64>,
}

impl<Var: IntegerVariable> CumulativeFilter<Var> for TimeTableFilter {
    fn filter(
        &mut self,
        context: &mut PropagationContext,
        tasks: &[Rc<Task<Var>>],
        capacity: &Var,
        subset: &[usize],
    ) -> PropagationStatusCP {
        let compulsory_parts = subset
            .iter()
            .filter_map(|&index| {
                tasks[index]
                    .compulsory_part(&*context)
                    .map(|(start, end)| (index, start, end))
            })
            .collect::<Vec<_>>();
        let Some(window_start) = compulsory_parts.iter().map(|&(_, start, _)| start).min() else {
            return Ok(());
        };
        let window_end = compulsory_parts
            .iter()
            .map(|&(_, _, end)| end)
            .max()
            .unwrap_or(window_start);

        self.profile.clear();
        self.profile
            .resize((window_end - window_start) as usize, 0);
        for &(index, start, end) in compulsory_parts.iter() {
            let height = tasks[index].min_height(&*context) as i64;
            for time in start..end {
                self.profile[(time - window_start) as usize] += height;
            }
        }

        let capacity_ub = context.upper_bound(capacity) as i64;
        let (peak_offset, peak) = self
            .profile
            .iter()
            .copied()
            .enumerate()
            .max_by_key(|&(offset, height)| (height, std::cmp::Reverse(offset)))
            .unwrap_or((0, 0));
        if peak > capacity_ub {
            let time = window_start + peak_offset as i32;
            let overlapping = compulsory_parts
                .iter()
                .filter(|&&(_, start, end)| start <= time && time < end)
                .map(|&(index, _, _)| index.to_string())
                .collect::<Vec<_>>();
            return Err(PropagatorConflict::new(format!(
                "tasks [{}] use {peak} > {capacity_ub} of the resource at time {time}",
                overlapping.join(", ")
            ))
            .into());
        }
        let _ = context.set_lower_bound(capacity, peak as i32)?;

        for &index in subset {
            let task = &tasks[index];
            let height = task.min_height(&*context) as i64;
            let duration = task.min_duration(&*context);
            if height == 0 || duration == 0 {
                continue;
            }

            let own_part = task.compulsory_part(&*context);
            let profile = &self.profile;
            let load_of_others = |time: i32| -> i64 {
                if time < window_start || time >= window_end {
                    return 0;
                }
                let own = if own_part.is_some_and(|(start, end)| start <= time && time < end) {
                    height
                } else {
                    0
                };
                profile[(time - window_start) as usize] - own
            };
            let overloads = |time: i32| load_of_others(time) + height > capacity_ub;

            let earliest_start = task.est(&*context);
            let mut new_earliest_start = earliest_start;
            let mut time = earliest_start.max(window_start);
            while time < new_earliest_start + duration && time < window_end {
                if overloads(time) {
                    new_earliest_start = time + 1;
                }
                time += 1;
            }
            if new_earliest_start > earliest_start {
                task.push_start(context, new_earliest_start)?;
            }

            let latest_completion = task.lct(&*context);
            let mut new_latest_completion = latest_completion;
            let mut time = latest_completion.min(window_end) - 1;
            while time >= new_latest_completion - duration && time >= window_start {
                if overloads(time) {
                    new_latest_completion = time;
                }
                time -= 1;
            }
            if new_latest_completion < latest_completion {
                task.push_end(context, new_latest_completion)?;
            }

            if let Some((start, end)) = own_part {
                let highest_other_load = (start..end).map(load_of_others).max().unwrap_or(0);
                let room = capacity_ub - highest_other_load;
                let _ = context.set_upper_bound(&task.height, room as i32)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::basic_types::ConstraintOperationError;
    use crate::engine::test_solver::TestSolver;
    use crate::propagators::cumulative::filters::test_utils::task;
    use crate::propagators::cumulative::filters::test_utils::TIME_TABLE_FILTERS;
    use crate::propagators::cumulative::Cumulative;
    use crate::propagators::cumulative::CumulativeOptions;

    fn options(filter: crate::propagators::cumulative::CumulativeFilterKind) -> CumulativeOptions {
        CumulativeOptions {
            filter,
            ..Default::default()
        }
    }

    #[test]
    fn start_is_pushed_past_the_profile() {
        for filter in TIME_TABLE_FILTERS {
            let mut solver = TestSolver::default();
            let fixed = task(&mut solver, 0, 0, 5, 2);
            let free = task(&mut solver, 0, 10, 3, 2);
            let start = free.start;
            let capacity = solver.new_variable(3, 3);

            let _ = solver
                .new_propagator(Cumulative::new([fixed, free].into(), capacity, options(filter)))
                .expect("no empty domains");

            solver.assert_bounds(start, 5, 10);
        }
    }

    #[test]
    fn end_is_pushed_before_the_profile() {
        for filter in TIME_TABLE_FILTERS {
            let mut solver = TestSolver::default();
            let fixed = task(&mut solver, 5, 5, 5, 2);
            let free = task(&mut solver, 0, 9, 3, 2);
            let (start, end) = (free.start, free.end);
            let capacity = solver.new_variable(3, 3);

            let _ = solver
                .new_propagator(Cumulative::new([fixed, free].into(), capacity, options(filter)))
                .expect("no empty domains");

            solver.assert_bounds(end, 3, 5);
            solver.assert_bounds(start, 0, 2);
        }
    }

    #[test]
    fn capacity_is_raised_to_the_peak() {
        for filter in TIME_TABLE_FILTERS {
            let mut solver = TestSolver::default();
            let first = task(&mut solver, 0, 0, 4, 2);
            let second = task(&mut solver, 2, 2, 4, 3);
            let capacity = solver.new_variable(0, 10);

            let _ = solver
                .new_propagator(Cumulative::new(
                    [first, second].into(),
                    capacity,
                    options(filter),
                ))
                .expect("no empty domains");

            solver.assert_bounds(capacity, 5, 10);
        }
    }

    #[test]
    fn heights_are_capped_by_the_room_left() {
        for filter in TIME_TABLE_FILTERS {
            let mut solver = TestSolver::default();
            let mut first = task(&mut solver, 0, 0, 5, 2);
            first.height = solver.new_variable(2, 5);
            let height = first.height;
            let second = task(&mut solver, 0, 0, 5, 2);
            let capacity = solver.new_variable(0, 5);

            let _ = solver
                .new_propagator(Cumulative::new(
                    [first, second].into(),
                    capacity,
                    options(filter),
                ))
                .expect("no empty domains");

            solver.assert_bounds(height, 2, 3);
        }
    }

    #[test]
    fn overlapping_compulsory_parts_overload_the_resource() {
        for filter in TIME_TABLE_FILTERS {
            let mut solver = TestSolver::default();
            let first = task(&mut solver, 0, 0, 5, 2);
            let second = task(&mut solver, 0, 0, 5, 2);
            let capacity = solver.new_variable(3, 3);

            let result = solver.new_propagator(Cumulative::new(
                [first, second].into(),
                capacity,
                options(filter),
            ));

            assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
        }
    }
}
