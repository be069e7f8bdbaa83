use std::rc::Rc;

use super::CumulativeFilter;
use super::DisjunctiveTaskIntervalFilter;
use super::EnergyFilter;
use super::SweepFilter;
use super::TimeTableFilter;
use crate::basic_types::PropagationStatusCP;
use crate::engine::variables::IntegerVariable;
use crate::propagation::PropagationContext;
use crate::propagators::cumulative::CumulativeOptions;
use crate::propagators::cumulative::Task;

/// Runs the time-table filter when the horizon of the subset is at most
/// `time_table_horizon_factor * n^2` and the sweep otherwise, followed by energetic reasoning and
/// the disjunctive reasoning on the near-unary tasks.
#[derive(Debug)]
pub(crate) struct DefaultFilter {
    horizon_factor: i64,
    time_table: TimeTableFilter,
    sweep: SweepFilter,
    energy: EnergyFilter,
    disjunctive: DisjunctiveTaskIntervalFilter,
}

impl DefaultFilter {
    pub(crate) fn new(options: &CumulativeOptions) -> Self {
        DefaultFilter {
            horizon_factor: options.time_table_horizon_factor,
            time_table: TimeTableFilter::default(),
            sweep: SweepFilter::new(false),
            energy: EnergyFilter::default(),
            disjunctive: DisjunctiveTaskIntervalFilter::new(options.disjunctive_max_tasks),
        }
    }
}

impl<Var: IntegerVariable> CumulativeFilter<Var> for DefaultFilter {
    fn filter(
        &mut self,
        context: &mut PropagationContext,
        tasks: &[Rc<Task<Var>>],
        capacity: &Var,
        subset: &[usize],
    ) -> PropagationStatusCP {
        let earliest_start = subset.iter().map(|&index| tasks[index].est(&*context)).min();
        let latest_completion = subset.iter().map(|&index| tasks[index].lct(&*context)).max();
        let (Some(earliest_start), Some(latest_completion)) = (earliest_start, latest_completion)
        else {
            return Ok(());
        };

        let horizon = latest_completion as i64 - earliest_start as i64;
        let num_tasks = subset.len() as i64;
        if horizon <= self.horizon_factor.saturating_mul(num_tasks * num_tasks) {
            self.time_table.filter(context, tasks, capacity, subset)?;
        } else {
            self.sweep.filter(context, tasks, capacity, subset)?;
        }

        self.energy.filter(context, tasks, capacity, subset)?;
        self.disjunctive.filter(context, tasks, capacity, subset)
    }
}
