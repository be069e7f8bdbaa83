use crate::basic_types::ConstraintOperationError;
use crate::basic_types::Inconsistency;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::IntegerVariable;
use crate::engine::DomainEvents;
use crate::engine::IntDeltaMonitor;
use crate::math::num_ext::clamp_to_i32;
use crate::propagation::Domains;
use crate::propagation::Entailment;
use crate::propagation::LocalId;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::Priority;
use crate::propagation::ReadDomains;

/// The relation between `|x - y|` and the distance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DistanceOperator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
}

/// The [`PropagatorConstructor`] for the [`DistancePropagator`].
#[derive(Clone, Debug)]
pub struct DistanceArgs<XVar, YVar> {
    pub x: XVar,
    pub y: YVar,
    pub operator: DistanceOperator,
    pub distance: i32,
}

impl<XVar, YVar> PropagatorConstructor for DistanceArgs<XVar, YVar>
where
    XVar: IntegerVariable,
    YVar: IntegerVariable,
{
    type PropagatorImpl = DistancePropagator<XVar, YVar>;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        let DistanceArgs {
            x,
            y,
            operator,
            distance,
        } = self;

        let events = match operator {
            DistanceOperator::Equal => DomainEvents::ANY_INT,
            DistanceOperator::NotEqual => DomainEvents::ASSIGN,
            DistanceOperator::GreaterThan | DistanceOperator::LessThan => DomainEvents::BOUNDS,
        };
        context.register(x.clone(), events, LocalId::from(0));
        context.register(y.clone(), events, LocalId::from(1));

        let removed_values = (operator == DistanceOperator::Equal).then(|| {
            (
                context.int_delta_monitor(x.clone()),
                context.int_delta_monitor(y.clone()),
            )
        });

        Ok(DistancePropagator {
            x,
            y,
            operator,
            distance: distance as i64,
            removed_values,
        })
    }
}

/// Propagator for `|x - y| op distance`.
///
/// Equality is filtered value by value: a value needs a support at `±distance` in the other
/// domain, and the removals are replayed through delta monitors to re-check only the values they
/// supported. The other relations are filtered on bounds or on instantiation.
#[derive(Clone, Debug)]
pub struct DistancePropagator<XVar, YVar> {
    x: XVar,
    y: YVar,
    operator: DistanceOperator,
    distance: i64,

    /// The delta monitors of `x` and `y`; only kept for equality.
    removed_values: Option<(IntDeltaMonitor<XVar>, IntDeltaMonitor<YVar>)>,
}

fn has_support<Var: IntegerVariable>(
    context: &impl ReadDomains,
    var: &Var,
    value: i64,
    distance: i64,
) -> bool {
    [value - distance, value + distance]
        .into_iter()
        .filter_map(|candidate| i32::try_from(candidate).ok())
        .any(|candidate| context.contains(var, candidate))
}

/// Removes `candidate` from `var` when it no longer has a support in `other`.
fn remove_if_unsupported<Var: IntegerVariable, Other: IntegerVariable>(
    context: &mut PropagationContext,
    var: &Var,
    other: &Other,
    candidate: i64,
    distance: i64,
) -> Result<bool, Inconsistency> {
    let Ok(candidate) = i32::try_from(candidate) else {
        return Ok(false);
    };
    let supported = has_support(&*context, other, candidate as i64, distance);
    if context.contains(var, candidate) && !supported {
        Ok(context.remove(var, candidate)?)
    } else {
        Ok(false)
    }
}

/// The smallest and the largest value of `|x - y|` over the bounds.
fn distance_range(x_bounds: (i64, i64), y_bounds: (i64, i64)) -> (i64, i64) {
    let (x_lower_bound, x_upper_bound) = x_bounds;
    let (y_lower_bound, y_upper_bound) = y_bounds;
    let smallest = 0
        .max(x_lower_bound - y_upper_bound)
        .max(y_lower_bound - x_upper_bound);
    let largest = (x_upper_bound - y_lower_bound).max(y_upper_bound - x_lower_bound);
    (smallest, largest)
}

impl<XVar: IntegerVariable, YVar: IntegerVariable> DistancePropagator<XVar, YVar> {
    fn bounds(&self, context: &impl ReadDomains) -> ((i64, i64), (i64, i64)) {
        (
            (
                context.lower_bound(&self.x) as i64,
                context.upper_bound(&self.x) as i64,
            ),
            (
                context.lower_bound(&self.y) as i64,
                context.upper_bound(&self.y) as i64,
            ),
        )
    }

    fn conflict(&self) -> PropagatorConflict {
        PropagatorConflict::new(format!(
            "|x - y| {:?} {} cannot hold",
            self.operator, self.distance
        ))
    }

    fn propagate_equal_from_scratch(
        &self,
        context: &mut PropagationContext,
    ) -> PropagationStatusCP {
        loop {
            let x_without_support = context
                .iterate_domain(&self.x)
                .filter(|&value| !has_support(&*context, &self.y, value as i64, self.distance))
                .collect::<Vec<_>>();
            let y_without_support = context
                .iterate_domain(&self.y)
                .filter(|&value| !has_support(&*context, &self.x, value as i64, self.distance))
                .collect::<Vec<_>>();

            if x_without_support.is_empty() && y_without_support.is_empty() {
                return Ok(());
            }
            for value in x_without_support {
                let _ = context.remove(&self.x, value)?;
            }
            for value in y_without_support {
                let _ = context.remove(&self.y, value)?;
            }
        }
    }

    fn propagate_greater_than(&self, context: &mut PropagationContext) -> PropagationStatusCP {
        loop {
            let ((x_lower_bound, x_upper_bound), (y_lower_bound, y_upper_bound)) =
                self.bounds(&*context);

            let mut changed = context.remove_range(
                &self.x,
                clamp_to_i32(y_upper_bound - self.distance),
                clamp_to_i32(y_lower_bound + self.distance),
            )?;
            changed |= context.remove_range(
                &self.y,
                clamp_to_i32(x_upper_bound - self.distance),
                clamp_to_i32(x_lower_bound + self.distance),
            )?;

            if !changed {
                return Ok(());
            }
        }
    }

    fn propagate_less_than(&self, context: &mut PropagationContext) -> PropagationStatusCP {
        loop {
            let ((x_lower_bound, x_upper_bound), (y_lower_bound, y_upper_bound)) =
                self.bounds(&*context);
            let reach = self.distance - 1;

            let mut changed =
                context.set_lower_bound(&self.x, clamp_to_i32(y_lower_bound - reach))?;
            changed |= context.set_upper_bound(&self.x, clamp_to_i32(y_upper_bound + reach))?;
            changed |= context.set_lower_bound(&self.y, clamp_to_i32(x_lower_bound - reach))?;
            changed |= context.set_upper_bound(&self.y, clamp_to_i32(x_upper_bound + reach))?;

            if !changed {
                return Ok(());
            }
        }
    }

    fn propagate_not_equal(&self, context: &mut PropagationContext) -> PropagationStatusCP {
        if let Some(value) = context.fixed_value(&self.y) {
            for forbidden in [value as i64 - self.distance, value as i64 + self.distance] {
                if let Ok(forbidden) = i32::try_from(forbidden) {
                    let _ = context.remove(&self.x, forbidden)?;
                }
            }
            context.set_passive();
        } else if let Some(value) = context.fixed_value(&self.x) {
            for forbidden in [value as i64 - self.distance, value as i64 + self.distance] {
                if let Ok(forbidden) = i32::try_from(forbidden) {
                    let _ = context.remove(&self.y, forbidden)?;
                }
            }
            context.set_passive();
        }
        Ok(())
    }

    fn propagate_operator(&self, context: &mut PropagationContext) -> PropagationStatusCP {
        match self.operator {
            DistanceOperator::Equal => Ok(()),
            DistanceOperator::NotEqual => self.propagate_not_equal(context),
            DistanceOperator::GreaterThan => self.propagate_greater_than(context),
            DistanceOperator::LessThan => self.propagate_less_than(context),
        }
    }

    /// Handles a negative distance; returns whether the propagator is done.
    fn negative_distance(&self, context: &mut PropagationContext) -> Result<bool, Inconsistency> {
        if self.distance >= 0 {
            return Ok(false);
        }
        match self.operator {
            DistanceOperator::Equal | DistanceOperator::LessThan => Err(self.conflict().into()),
            DistanceOperator::NotEqual | DistanceOperator::GreaterThan => {
                context.set_passive();
                Ok(true)
            }
        }
    }

    fn set_passive_if_entailed(&self, context: &mut PropagationContext) {
        if self.entailment(&*context) == Entailment::True {
            context.set_passive();
        }
    }

    fn entailment(&self, context: &impl ReadDomains) -> Entailment {
        let (x_bounds, y_bounds) = self.bounds(context);
        let (smallest, largest) = distance_range(x_bounds, y_bounds);

        if x_bounds.0 == x_bounds.1 && y_bounds.0 == y_bounds.1 {
            let holds = match self.operator {
                DistanceOperator::Equal => smallest == self.distance,
                DistanceOperator::NotEqual => smallest != self.distance,
                DistanceOperator::GreaterThan => smallest > self.distance,
                DistanceOperator::LessThan => smallest < self.distance,
            };
            return if holds {
                Entailment::True
            } else {
                Entailment::False
            };
        }

        match self.operator {
            DistanceOperator::Equal if smallest > self.distance || largest < self.distance => {
                Entailment::False
            }
            DistanceOperator::LessThan if smallest >= self.distance => Entailment::False,
            DistanceOperator::LessThan if largest < self.distance => Entailment::True,
            DistanceOperator::GreaterThan if smallest > self.distance => Entailment::True,
            DistanceOperator::GreaterThan if largest <= self.distance => Entailment::False,
            _ => Entailment::Undefined,
        }
    }
}

impl<XVar: IntegerVariable, YVar: IntegerVariable> Propagator for DistancePropagator<XVar, YVar> {
    fn name(&self) -> &str {
        "Distance"
    }

    fn priority(&self) -> Priority {
        Priority::High
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        if self.negative_distance(&mut context)? {
            return Ok(());
        }

        if self.operator == DistanceOperator::Equal {
            self.propagate_equal_from_scratch(&mut context)?;
            if let Some((x_removed_values, y_removed_values)) = self.removed_values.as_mut() {
                x_removed_values.skip_to_end(&mut context);
                y_removed_values.skip_to_end(&mut context);
            }
        } else {
            self.propagate_operator(&mut context)?;
        }

        self.set_passive_if_entailed(&mut context);
        Ok(())
    }

    fn propagate(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        if self.negative_distance(&mut context)? {
            return Ok(());
        }

        let Some((x_removed_values, y_removed_values)) = self.removed_values.as_mut() else {
            self.propagate_operator(&mut context)?;
            self.set_passive_if_entailed(&mut context);
            return Ok(());
        };

        let x = self.x.clone();
        let y = self.y.clone();
        let distance = self.distance;

        // A removed value of one side only supported the two values at `±distance` on the other.
        loop {
            x_removed_values.freeze(&context);
            y_removed_values.freeze(&context);

            let mut removed = 0;
            x_removed_values.for_each(&mut context, |context, value| {
                for candidate in [value as i64 - distance, value as i64 + distance] {
                    removed += remove_if_unsupported(context, &y, &x, candidate, distance)? as usize;
                }
                Ok::<(), Inconsistency>(())
            })?;
            y_removed_values.for_each(&mut context, |context, value| {
                for candidate in [value as i64 - distance, value as i64 + distance] {
                    removed += remove_if_unsupported(context, &x, &y, candidate, distance)? as usize;
                }
                Ok::<(), Inconsistency>(())
            })?;

            x_removed_values.unfreeze(&mut context);
            y_removed_values.unfreeze(&mut context);

            if removed == 0 {
                break;
            }
        }

        self.set_passive_if_entailed(&mut context);
        Ok(())
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        if self.distance < 0 {
            return match self.operator {
                DistanceOperator::Equal | DistanceOperator::LessThan => Entailment::False,
                DistanceOperator::NotEqual | DistanceOperator::GreaterThan => Entailment::True,
            };
        }
        self.entailment(&domains)
    }

    fn detect_inconsistency(&self, domains: Domains) -> Option<PropagatorConflict> {
        (self.is_entailed(domains) == Entailment::False).then(|| self.conflict())
    }
}
