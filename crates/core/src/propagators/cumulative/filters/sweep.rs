use std::cmp::Reverse;
use std::rc::Rc;

use super::CumulativeFilter;
use crate::basic_types::PropagationStatusCP;
use crate::engine::variables::IntegerVariable;
use crate::propagation::PropagationContext;
use crate::propagation::ReadDomains;
use crate::propagators::cumulative::profile::compulsory_profiles;
use crate::propagators::cumulative::profile::ResourceProfile;
use crate::propagators::cumulative::Task;

/// Time-table reasoning over the profiles produced by a sweep over the compulsory parts, so the
/// cost does not depend on the length of the horizon. The sweep fails as soon as a profile
/// overloads the resource.
///
/// When `height_sorted` is set, the tasks are visited by decreasing height and the filtering
/// stops at the first task which cannot overload even the highest profile.
#[derive(Debug)]
pub(crate) struct SweepFilter {
    height_sorted: bool,
    order: Vec<usize>,
}

impl SweepFilter {
    pub(crate) fn new(height_sorted: bool) -> Self {
        SweepFilter {
            height_sorted,
            order: Vec::new(),
        }
    }
}

impl<Var: IntegerVariable> CumulativeFilter<Var> for SweepFilter {
    fn filter(
        &mut self,
        context: &mut PropagationContext,
        tasks: &[Rc<Task<Var>>],
        capacity: &Var,
        subset: &[usize],
    ) -> PropagationStatusCP {
        let capacity_ub = context.upper_bound(capacity) as i64;
        let profiles = compulsory_profiles(&*context, tasks, subset, Some(capacity_ub))?;
        let Some(peak) = profiles.iter().map(|profile| profile.height).max() else {
            return Ok(());
        };
        let _ = context.set_lower_bound(capacity, peak as i32)?;

        self.order.clear();
        self.order.extend_from_slice(subset);
        if self.height_sorted {
            self.order
                .sort_by_key(|&index| Reverse(tasks[index].min_height(&*context)));
        }

        for &index in self.order.iter() {
            let task = &tasks[index];
            let height = task.min_height(&*context) as i64;
            let duration = task.min_duration(&*context);
            if self.height_sorted && peak + height <= capacity_ub {
                break;
            }
            if height == 0 || duration == 0 {
                continue;
            }

            let load_of_others = |profile: &ResourceProfile<Var>| {
                if profile.contains_task(task) {
                    profile.height - height
                } else {
                    profile.height
                }
            };
            let overloads =
                |profile: &ResourceProfile<Var>| load_of_others(profile) + height > capacity_ub;

            let earliest_start = task.est(&*context);
            let mut new_earliest_start = earliest_start;
            for profile in profiles.iter() {
                if profile.end <= new_earliest_start {
                    continue;
                }
                if profile.start >= new_earliest_start + duration {
                    break;
                }
                if overloads(profile) {
                    new_earliest_start = profile.end;
                }
            }
            if new_earliest_start > earliest_start {
                task.push_start(context, new_earliest_start)?;
            }

            let latest_completion = task.lct(&*context);
            let mut new_latest_completion = latest_completion;
            for profile in profiles.iter().rev() {
                if profile.start >= new_latest_completion {
                    continue;
                }
                if profile.end <= new_latest_completion - duration {
                    break;
                }
                if overloads(profile) {
                    new_latest_completion = profile.start;
                }
            }
            if new_latest_completion < latest_completion {
                task.push_end(context, new_latest_completion)?;
            }

            let highest_other_load = profiles
                .iter()
                .filter(|profile| profile.contains_task(task))
                .map(load_of_others)
                .max();
            if let Some(highest_other_load) = highest_other_load {
                let room = capacity_ub - highest_other_load;
                let _ = context.set_upper_bound(&task.height, room as i32)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::test_solver::TestSolver;
    use crate::propagators::cumulative::filters::test_utils::task;
    use crate::propagators::cumulative::Cumulative;
    use crate::propagators::cumulative::CumulativeFilterKind;
    use crate::propagators::cumulative::CumulativeOptions;

    #[test]
    fn start_jumps_over_consecutive_profiles() {
        let mut solver = TestSolver::default();
        let first = task(&mut solver, 0, 0, 3, 2);
        let second = task(&mut solver, 3, 3, 3, 2);
        let free = task(&mut solver, 0, 20, 2, 2);
        let start = free.start;
        let capacity = solver.new_variable(3, 3);

        let _ = solver
            .new_propagator(Cumulative::new(
                [first, second, free].into(),
                capacity,
                CumulativeOptions {
                    filter: CumulativeFilterKind::Sweep,
                    ..Default::default()
                },
            ))
            .expect("no empty domains");

        solver.assert_bounds(start, 6, 20);
    }

    #[test]
    fn height_sorted_sweep_skips_light_tasks() {
        let mut solver = TestSolver::default();
        let fixed = task(&mut solver, 0, 0, 4, 2);
        let light = task(&mut solver, 0, 10, 2, 1);
        let heavy = task(&mut solver, 0, 10, 2, 3);
        let (light_start, heavy_start) = (light.start, heavy.start);
        let capacity = solver.new_variable(4, 4);

        let _ = solver
            .new_propagator(Cumulative::new(
                [fixed, light, heavy].into(),
                capacity,
                CumulativeOptions {
                    filter: CumulativeFilterKind::SweepHeightSorted,
                    ..Default::default()
                },
            ))
            .expect("no empty domains");

        solver.assert_bounds(light_start, 0, 10);
        solver.assert_bounds(heavy_start, 4, 10);
    }
}
