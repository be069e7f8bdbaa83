use std::rc::Rc;

use super::filters::create_filter;
use super::filters::CumulativeFilter;
use super::profile::compulsory_profiles;
use super::profile::cumulative_entailment;
use super::profile::overload_conflict;
use super::task::create_tasks;
use super::Cumulative;
use super::Task;
use crate::basic_types::ConstraintOperationError;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::IntegerVariable;
use crate::propagation::Domains;
use crate::propagation::Entailment;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::ReadDomains;

impl<Var: IntegerVariable + 'static> PropagatorConstructor for Cumulative<Var> {
    type PropagatorImpl = CumulativePropagator<Var>;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        let tasks = create_tasks(&self.tasks, &self.capacity, &mut context)?;
        let all_tasks = (0..tasks.len()).collect();

        Ok(CumulativePropagator {
            tasks,
            capacity: self.capacity,
            filter: create_filter(&self.options),
            all_tasks,
        })
    }
}

/// Propagator for the cumulative constraint which enforces the consistency of every task and
/// runs its filter over all tasks on every call.
#[derive(Debug)]
pub struct CumulativePropagator<Var> {
    tasks: Box<[Rc<Task<Var>>]>,
    capacity: Var,
    filter: Box<dyn CumulativeFilter<Var>>,
    all_tasks: Box<[usize]>,
}

impl<Var: IntegerVariable + 'static> Propagator for CumulativePropagator<Var> {
    fn name(&self) -> &str {
        "Cumulative"
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        for task in self.tasks.iter() {
            task.enforce_consistency(&mut context)?;
        }

        self.filter
            .filter(&mut context, &self.tasks, &self.capacity, &self.all_tasks)
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        cumulative_entailment(&domains, &self.tasks, &self.capacity)
    }

    fn detect_inconsistency(&self, domains: Domains) -> Option<PropagatorConflict> {
        detect_overload(&domains, &self.tasks, &self.capacity)
    }
}

/// Finds a profile of compulsory parts which exceeds the largest capacity.
pub(super) fn detect_overload<Var: IntegerVariable>(
    domains: &impl ReadDomains,
    tasks: &[Rc<Task<Var>>],
    capacity: &Var,
) -> Option<PropagatorConflict> {
    let all_tasks = (0..tasks.len()).collect::<Vec<_>>();
    let capacity = domains.upper_bound(capacity) as i64;
    compulsory_profiles(domains, tasks, &all_tasks, None)
        .ok()?
        .iter()
        .find(|profile| profile.height > capacity)
        .map(|profile| overload_conflict(profile, capacity))
}
