use std::hash::Hash;
use std::rc::Rc;

use crate::basic_types::ConstraintOperationError;
use crate::engine::variables::IntegerVariable;
use crate::engine::DomainEvents;
use crate::engine::EmptyDomain;
use crate::math::num_ext::clamp_to_i32;
use crate::propagation::LocalId;
use crate::propagation::PropagationContext;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::ReadDomains;

/// A task as it is passed to the constructor of a cumulative propagator.
#[derive(Clone, Debug)]
pub struct ArgTask<Var> {
    pub start: Var,
    pub duration: Var,
    pub end: Var,
    /// The amount of the resource used while the task executes.
    pub height: Var,
}

/// A task of a cumulative propagator; it executes over `[start, start + duration)` and
/// `end = start + duration`.
///
/// The variables of task `i` are registered with local ids `4i` to `4i + 3`, in the order start,
/// duration, end and height.
#[derive(Debug)]
pub(crate) struct Task<Var> {
    pub(crate) start: Var,
    pub(crate) duration: Var,
    pub(crate) end: Var,
    pub(crate) height: Var,
    pub(crate) id: LocalId,
}

impl<Var> PartialEq for Task<Var> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<Var> Eq for Task<Var> {}

impl<Var> Hash for Task<Var> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<Var: IntegerVariable> Task<Var> {
    pub(crate) fn index(&self) -> usize {
        self.id.unpack() as usize
    }

    /// The earliest start time.
    pub(crate) fn est(&self, context: &impl ReadDomains) -> i32 {
        context.lower_bound(&self.start)
    }

    /// The latest start time.
    pub(crate) fn lst(&self, context: &impl ReadDomains) -> i32 {
        context.upper_bound(&self.start)
    }

    /// The earliest completion time.
    pub(crate) fn ect(&self, context: &impl ReadDomains) -> i32 {
        context.lower_bound(&self.end)
    }

    /// The latest completion time.
    pub(crate) fn lct(&self, context: &impl ReadDomains) -> i32 {
        context.upper_bound(&self.end)
    }

    pub(crate) fn min_duration(&self, context: &impl ReadDomains) -> i32 {
        context.lower_bound(&self.duration)
    }

    pub(crate) fn min_height(&self, context: &impl ReadDomains) -> i32 {
        context.lower_bound(&self.height)
    }

    pub(crate) fn min_energy(&self, context: &impl ReadDomains) -> i64 {
        self.min_duration(context) as i64 * self.min_height(context) as i64
    }

    /// The interval `[lst, ect)` in which the task executes in every solution, if it is not empty
    /// and the task uses the resource.
    pub(crate) fn compulsory_part(&self, context: &impl ReadDomains) -> Option<(i32, i32)> {
        let latest_start = self.lst(context);
        let earliest_completion = self.ect(context);
        (latest_start < earliest_completion && self.min_height(context) > 0)
            .then_some((latest_start, earliest_completion))
    }

    /// Whether the envelopes `[est, lct)` of the two tasks intersect.
    pub(crate) fn may_overlap(&self, other: &Task<Var>, context: &impl ReadDomains) -> bool {
        self.est(context) < other.lct(context) && other.est(context) < self.lct(context)
    }

    pub(crate) fn is_fixed(&self, context: &impl ReadDomains) -> bool {
        context.is_fixed(&self.start)
            && context.is_fixed(&self.duration)
            && context.is_fixed(&self.end)
            && context.is_fixed(&self.height)
    }

    /// Propagates `start + duration = end`, `duration >= 0` and `height >= 0` on the bounds until
    /// nothing changes.
    pub(crate) fn enforce_consistency(
        &self,
        context: &mut PropagationContext,
    ) -> Result<(), EmptyDomain> {
        let _ = context.set_lower_bound(&self.duration, 0)?;
        let _ = context.set_lower_bound(&self.height, 0)?;

        loop {
            let start_lb = context.lower_bound(&self.start) as i64;
            let start_ub = context.upper_bound(&self.start) as i64;
            let duration_lb = context.lower_bound(&self.duration) as i64;
            let duration_ub = context.upper_bound(&self.duration) as i64;
            let end_lb = context.lower_bound(&self.end) as i64;
            let end_ub = context.upper_bound(&self.end) as i64;

            let mut changed =
                context.set_lower_bound(&self.end, clamp_to_i32(start_lb + duration_lb))?;
            changed |= context.set_upper_bound(&self.end, clamp_to_i32(start_ub + duration_ub))?;
            changed |= context.set_lower_bound(&self.start, clamp_to_i32(end_lb - duration_ub))?;
            changed |= context.set_upper_bound(&self.start, clamp_to_i32(end_ub - duration_lb))?;
            changed |= context.set_lower_bound(&self.duration, clamp_to_i32(end_lb - start_ub))?;
            changed |= context.set_upper_bound(&self.duration, clamp_to_i32(end_ub - start_lb))?;

            if !changed {
                return Ok(());
            }
        }
    }

    /// Raises the earliest start time, together with the earliest completion time.
    pub(crate) fn push_start(
        &self,
        context: &mut PropagationContext,
        earliest_start: i32,
    ) -> Result<(), EmptyDomain> {
        let minimum_duration = self.min_duration(&*context);
        let _ = context.set_lower_bound(&self.start, earliest_start)?;
        let _ = context.set_lower_bound(
            &self.end,
            earliest_start.saturating_add(minimum_duration),
        )?;
        Ok(())
    }

    /// Lowers the latest completion time, together with the latest start time.
    pub(crate) fn push_end(
        &self,
        context: &mut PropagationContext,
        latest_completion: i32,
    ) -> Result<(), EmptyDomain> {
        let minimum_duration = self.min_duration(&*context);
        let _ = context.set_upper_bound(&self.end, latest_completion)?;
        let _ = context.set_upper_bound(
            &self.start,
            latest_completion.saturating_sub(minimum_duration),
        )?;
        Ok(())
    }
}

/// Registers the variables of the tasks and the capacity, and checks that the energies of the
/// tasks can be summed without overflow.
pub(crate) fn create_tasks<Var: IntegerVariable>(
    arg_tasks: &[ArgTask<Var>],
    capacity: &Var,
    context: &mut PropagatorConstructorContext,
) -> Result<Box<[Rc<Task<Var>>]>, ConstraintOperationError> {
    let mut total_energy: i64 = 0;
    for task in arg_tasks.iter() {
        let energy = (context.upper_bound(&task.duration) as i64)
            .checked_mul(context.upper_bound(&task.height) as i64)
            .ok_or(ConstraintOperationError::ArithmeticOverflow)?;
        total_energy = total_energy
            .checked_add(energy.max(0))
            .ok_or(ConstraintOperationError::ArithmeticOverflow)?;
    }

    let tasks = arg_tasks
        .iter()
        .enumerate()
        .map(|(index, task)| {
            let local_id = |offset: usize| LocalId::from((4 * index + offset) as u32);
            context.register(task.start.clone(), DomainEvents::BOUNDS, local_id(0));
            context.register(task.duration.clone(), DomainEvents::BOUNDS, local_id(1));
            context.register(task.end.clone(), DomainEvents::BOUNDS, local_id(2));
            context.register(task.height.clone(), DomainEvents::BOUNDS, local_id(3));

            Rc::new(Task {
                start: task.start.clone(),
                duration: task.duration.clone(),
                end: task.end.clone(),
                height: task.height.clone(),
                id: LocalId::from(index as u32),
            })
        })
        .collect::<Box<[_]>>();

    context.register(
        capacity.clone(),
        DomainEvents::UPPER_BOUND,
        LocalId::from((4 * arg_tasks.len()) as u32),
    );

    Ok(tasks)
}
