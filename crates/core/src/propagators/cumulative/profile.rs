use std::rc::Rc;

use itertools::Itertools;

use super::Task;
use crate::basic_types::Inconsistency;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::IntegerVariable;
use crate::propagation::Entailment;
use crate::propagation::ReadDomains;

/// A maximal interval `[start, end)` over which the set of tasks with a compulsory part does not
/// change.
#[derive(Debug)]
pub(crate) struct ResourceProfile<Var> {
    pub(crate) start: i32,
    pub(crate) end: i32,
    /// The summed minimum heights of `profile_tasks`.
    pub(crate) height: i64,
    pub(crate) profile_tasks: Vec<Rc<Task<Var>>>,
}

impl<Var: IntegerVariable> ResourceProfile<Var> {
    /// Whether the compulsory part of `task` covers this profile.
    pub(crate) fn contains_task(&self, task: &Task<Var>) -> bool {
        self.profile_tasks
            .iter()
            .any(|profile_task| profile_task.id == task.id)
    }
}

/// Sweeps over the start and end events of the compulsory parts of the tasks in `subset` and
/// returns the resulting profiles, sorted by time.
///
/// With `fail_above` the sweep stops at the first profile whose height exceeds it.
pub(crate) fn compulsory_profiles<Var: IntegerVariable>(
    context: &impl ReadDomains,
    tasks: &[Rc<Task<Var>>],
    subset: &[usize],
    fail_above: Option<i64>,
) -> Result<Vec<ResourceProfile<Var>>, Inconsistency> {
    let mut events = subset
        .iter()
        .filter_map(|&index| {
            let task = &tasks[index];
            let (start, end) = task.compulsory_part(context)?;
            let height = task.min_height(context) as i64;
            Some([(start, height, index), (end, -height, index)])
        })
        .flatten()
        .collect::<Vec<_>>();
    events.sort_by_key(|&(time, _, _)| time);

    let mut profiles = Vec::new();
    let mut active: Vec<Rc<Task<Var>>> = Vec::new();
    let mut height = 0;

    let mut position = 0;
    while position < events.len() {
        let time = events[position].0;
        while position < events.len() && events[position].0 == time {
            let (_, change, index) = events[position];
            height += change;
            if change > 0 {
                active.push(Rc::clone(&tasks[index]));
            } else {
                active.retain(|task| task.index() != index);
            }
            position += 1;
        }

        if position < events.len() && !active.is_empty() {
            let profile = ResourceProfile {
                start: time,
                end: events[position].0,
                height,
                profile_tasks: active.clone(),
            };
            if let Some(capacity) = fail_above {
                if profile.height > capacity {
                    return Err(overload_conflict(&profile, capacity).into());
                }
            }
            profiles.push(profile);
        }
    }

    Ok(profiles)
}

pub(crate) fn overload_conflict<Var: IntegerVariable>(
    profile: &ResourceProfile<Var>,
    capacity: i64,
) -> PropagatorConflict {
    PropagatorConflict::new(format!(
        "tasks [{}] use {} > {capacity} of the resource at time {}",
        profile
            .profile_tasks
            .iter()
            .map(|task| task.index())
            .join(", "),
        profile.height,
        profile.start,
    ))
}

/// False when the compulsory parts already overload the largest capacity; true when every task
/// is fixed and the resulting profile fits in the smallest capacity.
pub(crate) fn cumulative_entailment<Var: IntegerVariable>(
    context: &impl ReadDomains,
    tasks: &[Rc<Task<Var>>],
    capacity: &Var,
) -> Entailment {
    let all_tasks = (0..tasks.len()).collect::<Vec<_>>();
    let Ok(profiles) = compulsory_profiles(context, tasks, &all_tasks, None) else {
        return Entailment::Undefined;
    };
    let peak = profiles
        .iter()
        .map(|profile| profile.height)
        .max()
        .unwrap_or(0);

    if peak > context.upper_bound(capacity) as i64 {
        return Entailment::False;
    }

    if tasks.iter().all(|task| task.is_fixed(context)) {
        let consistent = tasks.iter().all(|task| {
            context.lower_bound(&task.start) as i64 + context.lower_bound(&task.duration) as i64
                == context.lower_bound(&task.end) as i64
        });
        if !consistent {
            return Entailment::False;
        }
        if peak <= context.lower_bound(capacity) as i64 {
            return Entailment::True;
        }
    }

    Entailment::Undefined
}
