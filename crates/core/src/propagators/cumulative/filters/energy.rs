use std::rc::Rc;

use super::CumulativeFilter;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::IntegerVariable;
use crate::math::num_ext::clamp_to_i32;
use crate::math::num_ext::NumExt;
use crate::propagation::PropagationContext;
use crate::propagation::ReadDomains;
use crate::propagators::cumulative::Task;

/// Energetic reasoning on the area `duration * height` of the tasks.
///
/// Only tasks with a positive minimum duration and height take part. Over the window spanned by
/// these tasks the filter raises the capacity to the mandatory energy divided by the width of the
/// window, and bounds the duration and height of every task by the surface the other tasks leave.
/// Every window `[est_a, lct_b]` is then checked for overload.
#[derive(Debug, Default)]
pub(crate) struct EnergyFilter {
    participants: Vec<usize>,
    by_completion: Vec<usize>,
}

impl<Var: IntegerVariable> CumulativeFilter<Var> for EnergyFilter {
    fn filter(
        &mut self,
        context: &mut PropagationContext,
        tasks: &[Rc<Task<Var>>],
        capacity: &Var,
        subset: &[usize],
    ) -> PropagationStatusCP {
        self.participants.clear();
        self.participants.extend(subset.iter().copied().filter(|&index| {
            tasks[index].min_duration(&*context) > 0 && tasks[index].min_height(&*context) > 0
        }));
        if self.participants.is_empty() {
            return Ok(());
        }

        self.bound_by_window(context, tasks, capacity)?;
        self.check_windows(&*context, tasks, capacity)
    }
}

impl EnergyFilter {
    fn bound_by_window<Var: IntegerVariable>(
        &self,
        context: &mut PropagationContext,
        tasks: &[Rc<Task<Var>>],
        capacity: &Var,
    ) -> PropagationStatusCP {
        let window_start = self
            .participants
            .iter()
            .map(|&index| tasks[index].est(&*context))
            .min()
            .unwrap_or_default() as i64;
        let window_end = self
            .participants
            .iter()
            .map(|&index| tasks[index].lct(&*context))
            .max()
            .unwrap_or_default() as i64;
        let width = window_end - window_start;
        let total_energy = self
            .participants
            .iter()
            .map(|&index| tasks[index].min_energy(&*context))
            .sum::<i64>();

        let surface = context.upper_bound(capacity) as i64 * width;
        if total_energy > surface {
            return Err(PropagatorConflict::new(format!(
                "energy {total_energy} exceeds the surface {surface} of [{window_start}, {window_end})"
            ))
            .into());
        }
        if width > 0 {
            let _ = context.set_lower_bound(
                capacity,
                clamp_to_i32(<i64 as NumExt>::div_ceil(total_energy, width)),
            )?;
        }

        let surface = context.upper_bound(capacity) as i64 * width;
        for &index in self.participants.iter() {
            let task = &tasks[index];
            let available = surface - (total_energy - task.min_energy(&*context));
            let _ = context.set_upper_bound(
                &task.duration,
                clamp_to_i32(available / task.min_height(&*context) as i64),
            )?;
            let _ = context.set_upper_bound(
                &task.height,
                clamp_to_i32(available / task.min_duration(&*context) as i64),
            )?;
        }

        Ok(())
    }

    /// Checks that the energy of the tasks inside every window `[est_a, lct_b]` fits under the
    /// capacity.
    fn check_windows<Var: IntegerVariable>(
        &mut self,
        context: &impl ReadDomains,
        tasks: &[Rc<Task<Var>>],
        capacity: &Var,
    ) -> PropagationStatusCP {
        let capacity = context.upper_bound(capacity) as i64;

        self.by_completion.clear();
        self.by_completion.extend_from_slice(&self.participants);
        self.by_completion
            .sort_by_key(|&index| tasks[index].lct(context));

        for &first in self.participants.iter() {
            let window_start = tasks[first].est(context);
            let mut energy = 0;
            for &index in self.by_completion.iter() {
                let task = &tasks[index];
                if task.est(context) < window_start {
                    continue;
                }
                energy += task.min_energy(context);
                let window_end = task.lct(context);
                if energy > capacity * (window_end - window_start) as i64 {
                    return Err(PropagatorConflict::new(format!(
                        "energy {energy} does not fit in [{window_start}, {window_end}) under capacity {capacity}"
                    ))
                    .into());
                }
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
    use crate::propagators::cumulative::Cumulative;
    use crate::propagators::cumulative::CumulativeFilterKind;
    use crate::propagators::cumulative::CumulativeOptions;

    fn energy() -> CumulativeOptions {
        CumulativeOptions {
            filter: CumulativeFilterKind::Energy,
            ..Default::default()
        }
    }

    #[test]
    fn capacity_covers_the_mandatory_energy() {
        let mut solver = TestSolver::default();
        let first = task(&mut solver, 0, 4, 4, 2);
        let second = task(&mut solver, 0, 4, 4, 3);
        let capacity = solver.new_variable(0, 10);

        let _ = solver
            .new_propagator(Cumulative::new([first, second].into(), capacity, energy()))
            .expect("no empty domains");

        // 20 units of energy in a window of width 8.
        solver.assert_bounds(capacity, 3, 10);
    }

    #[test]
    fn durations_are_bounded_by_the_available_surface() {
        let mut solver = TestSolver::default();
        let mut first = task(&mut solver, 0, 0, 2, 2);
        first.duration = solver.new_variable(2, 10);
        first.end = solver.new_variable(2, 6);
        let duration = first.duration;
        let second = task(&mut solver, 0, 3, 3, 2);
        let capacity = solver.new_variable(2, 2);

        let _ = solver
            .new_propagator(Cumulative::new([first, second].into(), capacity, energy()))
            .expect("no empty domains");

        // The window is [0, 6) with a surface of 12, of which the second task takes 6.
        solver.assert_bounds(duration, 2, 3);
    }

    #[test]
    fn overloaded_window_is_infeasible() {
        let mut solver = TestSolver::default();
        let first = task(&mut solver, 0, 2, 3, 2);
        let second = task(&mut solver, 0, 2, 3, 2);
        let third = task(&mut solver, 10, 30, 1, 1);
        let capacity = solver.new_variable(2, 2);

        // The first two tasks need 12 units of energy within [0, 5).
        let result = solver.new_propagator(Cumulative::new(
            [first, second, third].into(),
            capacity,
            energy(),
        ));

        assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
    }
}
