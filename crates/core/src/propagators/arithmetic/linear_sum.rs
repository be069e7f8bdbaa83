use log::warn;

use crate::basic_types::ConstraintOperationError;
use crate::basic_types::Inconsistency;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::cp_assert_simple;
use crate::engine::variables::IntegerVariable;
use crate::engine::DomainEvent;
use crate::engine::DomainEvents;
use crate::engine::TrailedInteger;
use crate::math::num_ext::clamp_to_i32;
use crate::propagation::Domains;
use crate::propagation::EnqueueDecision;
use crate::propagation::Entailment;
use crate::propagation::LocalId;
use crate::propagation::NotificationContext;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::Priority;
use crate::propagation::ReadDomains;

/// The relation between the weighted sum and the right-hand side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinearOperator {
    Equal,
    LessOrEqual,
    GreaterOrEqual,
    NotEqual,
}

impl LinearOperator {
    /// Whether `sum op rhs` holds.
    pub fn holds(self, sum: i64, rhs: i64) -> bool {
        match self {
            LinearOperator::Equal => sum == rhs,
            LinearOperator::LessOrEqual => sum <= rhs,
            LinearOperator::GreaterOrEqual => sum >= rhs,
            LinearOperator::NotEqual => sum != rhs,
        }
    }

    /// The entailment of `sum op rhs` given the interval of the sum.
    pub(crate) fn entailment(self, sum_lower_bound: i64, sum_upper_bound: i64, rhs: i64) -> Entailment {
        let (satisfied, violated) = match self {
            LinearOperator::Equal => (
                sum_lower_bound == rhs && sum_upper_bound == rhs,
                rhs < sum_lower_bound || rhs > sum_upper_bound,
            ),
            LinearOperator::LessOrEqual => (sum_upper_bound <= rhs, sum_lower_bound > rhs),
            LinearOperator::GreaterOrEqual => (sum_lower_bound >= rhs, sum_upper_bound < rhs),
            LinearOperator::NotEqual => (
                rhs < sum_lower_bound || rhs > sum_upper_bound,
                sum_lower_bound == rhs && sum_upper_bound == rhs,
            ),
        };

        if satisfied {
            Entailment::True
        } else if violated {
            Entailment::False
        } else {
            Entailment::Undefined
        }
    }
}

/// The [`PropagatorConstructor`] for the [`LinearSumPropagator`].
#[derive(Clone, Debug)]
pub struct LinearSumArgs<Var> {
    pub terms: Box<[(i32, Var)]>,
    pub operator: LinearOperator,
    pub rhs: i32,
}

/// Splits the terms into the positive-coefficient group followed by the negative one, dropping
/// zero coefficients, and checks that every intermediate value fits in 64-bit arithmetic.
pub(crate) fn split_terms<Var: IntegerVariable>(
    terms: &[(i32, Var)],
    rhs: i32,
    context: &PropagatorConstructorContext,
) -> Result<(Box<[Var]>, Box<[i64]>, usize), ConstraintOperationError> {
    let mut magnitude = (rhs as i64).abs();
    for (coefficient, var) in terms {
        let largest_value = (context.lower_bound(var) as i64)
            .abs()
            .max((context.upper_bound(var) as i64).abs());
        magnitude = (*coefficient as i64)
            .abs()
            .checked_mul(largest_value)
            .and_then(|term_magnitude| magnitude.checked_add(term_magnitude))
            .ok_or(ConstraintOperationError::ArithmeticOverflow)?;
    }
    // Sums of differences of bounds are at most twice the magnitude.
    let _ = magnitude
        .checked_mul(2)
        .ok_or(ConstraintOperationError::ArithmeticOverflow)?;

    let positive = terms.iter().filter(|(coefficient, _)| *coefficient > 0);
    let negative = terms.iter().filter(|(coefficient, _)| *coefficient < 0);
    let num_positive = positive.clone().count();

    let (coefficients, variables): (Vec<i64>, Vec<Var>) = positive
        .chain(negative)
        .map(|(coefficient, var)| ((*coefficient as i64).abs(), var.clone()))
        .unzip();

    Ok((variables.into(), coefficients.into(), num_positive))
}

/// The interval `[min, max]` of `c * x` (or `-c * x` for a negated term) when `x` ranges over
/// `[lower_bound, upper_bound]`; `coefficient` is an absolute value.
pub(crate) fn term_contribution(
    coefficient: i64,
    positive: bool,
    lower_bound: i64,
    upper_bound: i64,
) -> (i64, i64) {
    if positive {
        (coefficient * lower_bound, coefficient * upper_bound)
    } else {
        (-coefficient * upper_bound, -coefficient * lower_bound)
    }
}

impl<Var: IntegerVariable> PropagatorConstructor for LinearSumArgs<Var> {
    type PropagatorImpl = LinearSumPropagator<Var>;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        let (x, coefficients, num_positive) = split_terms(&self.terms, self.rhs, &context)?;
        if x.is_empty() {
            warn!("linear sum without non-zero terms; it only checks 0 against the right-hand side");
        }

        let mut lower_bounds = Vec::with_capacity(x.len());
        let mut upper_bounds = Vec::with_capacity(x.len());
        for (index, x_i) in x.iter().enumerate() {
            context.register(x_i.clone(), DomainEvents::BOUNDS, LocalId::from(index as u32));
            lower_bounds.push(context.new_trailed_integer(context.lower_bound(x_i) as i64));
            upper_bounds.push(context.new_trailed_integer(context.upper_bound(x_i) as i64));
        }

        let sum_lower_bound = context.new_trailed_integer(0);
        let sum_upper_bound = context.new_trailed_integer(0);

        Ok(LinearSumPropagator {
            x,
            coefficients,
            num_positive,
            operator: self.operator,
            rhs: self.rhs as i64,
            lower_bounds: lower_bounds.into(),
            upper_bounds: upper_bounds.into(),
            sum_lower_bound,
            sum_upper_bound,
        })
    }
}

/// Propagator for `Σ c_i * x_i op rhs` with `op` one of `=`, `≤`, `≥`, `≠`.
///
/// The running bounds of the sum are maintained in O(1) per event from the cached bounds of
/// every term. Bounds are filtered with the slack `F = rhs - sumLB` (room above the lower bound of
/// the sum) and `E = sumUB - rhs` (room below the upper bound).
#[derive(Clone, Debug)]
pub struct LinearSumPropagator<Var> {
    /// The positive-coefficient terms followed by the negative ones.
    x: Box<[Var]>,
    /// Absolute values of the coefficients.
    coefficients: Box<[i64]>,
    num_positive: usize,
    operator: LinearOperator,
    rhs: i64,

    lower_bounds: Box<[TrailedInteger]>,
    upper_bounds: Box<[TrailedInteger]>,
    sum_lower_bound: TrailedInteger,
    sum_upper_bound: TrailedInteger,
}

impl<Var: IntegerVariable> LinearSumPropagator<Var> {
    fn contribution(&self, index: usize, lower_bound: i64, upper_bound: i64) -> (i64, i64) {
        term_contribution(
            self.coefficients[index],
            index < self.num_positive,
            lower_bound,
            upper_bound,
        )
    }

    fn sum_bounds(&self, context: &impl ReadDomains) -> (i64, i64) {
        self.x
            .iter()
            .enumerate()
            .map(|(index, x_i)| {
                self.contribution(
                    index,
                    context.lower_bound(x_i) as i64,
                    context.upper_bound(x_i) as i64,
                )
            })
            .fold((0, 0), |(lower, upper), (min, max)| (lower + min, upper + max))
    }

    /// Recomputes every cached bound and the running sums from the domains.
    fn reset_caches(&self, context: &mut PropagationContext) {
        for (index, x_i) in self.x.iter().enumerate() {
            let lower_bound = context.lower_bound(x_i) as i64;
            let upper_bound = context.upper_bound(x_i) as i64;
            context.assign(self.lower_bounds[index], lower_bound);
            context.assign(self.upper_bounds[index], upper_bound);
        }
        let (sum_lower_bound, sum_upper_bound) = self.sum_bounds(&*context);
        context.assign(self.sum_lower_bound, sum_lower_bound);
        context.assign(self.sum_upper_bound, sum_upper_bound);
    }

    fn conflict(&self, sum_lower_bound: i64, sum_upper_bound: i64) -> PropagatorConflict {
        PropagatorConflict::new(format!(
            "the sum ranges over [{sum_lower_bound}, {sum_upper_bound}], which cannot satisfy {:?} {}",
            self.operator, self.rhs
        ))
    }

    /// Tightens the bounds with the given slacks until neither produces a change. Returns the
    /// final slacks.
    fn filter_bounds(
        &self,
        context: &mut PropagationContext,
        mut slack_above: i64,
        mut slack_below: i64,
        use_slack_above: bool,
        use_slack_below: bool,
    ) -> Result<(i64, i64), Inconsistency> {
        loop {
            let mut changed = false;

            for (index, x_i) in self.x.iter().enumerate() {
                let coefficient = self.coefficients[index];
                let positive = index < self.num_positive;

                if use_slack_above {
                    let lower_bound = context.lower_bound(x_i) as i64;
                    let upper_bound = context.upper_bound(x_i) as i64;
                    if coefficient * (upper_bound - lower_bound) > slack_above {
                        let step = slack_above / coefficient;
                        if positive {
                            let _ = context.set_upper_bound(x_i, clamp_to_i32(lower_bound + step))?;
                            let new_upper_bound = context.upper_bound(x_i) as i64;
                            slack_below -= coefficient * (upper_bound - new_upper_bound);
                        } else {
                            let _ = context.set_lower_bound(x_i, clamp_to_i32(upper_bound - step))?;
                            let new_lower_bound = context.lower_bound(x_i) as i64;
                            slack_below -= coefficient * (new_lower_bound - lower_bound);
                        }
                        changed = true;
                    }
                }

                if use_slack_below {
                    let lower_bound = context.lower_bound(x_i) as i64;
                    let upper_bound = context.upper_bound(x_i) as i64;
                    if coefficient * (upper_bound - lower_bound) > slack_below {
                        let step = slack_below / coefficient;
                        if positive {
                            let _ = context.set_lower_bound(x_i, clamp_to_i32(upper_bound - step))?;
                            let new_lower_bound = context.lower_bound(x_i) as i64;
                            slack_above -= coefficient * (new_lower_bound - lower_bound);
                        } else {
                            let _ = context.set_upper_bound(x_i, clamp_to_i32(lower_bound + step))?;
                            let new_upper_bound = context.upper_bound(x_i) as i64;
                            slack_above -= coefficient * (upper_bound - new_upper_bound);
                        }
                        changed = true;
                    }
                }
            }

            // Holes can make a bound jump further than requested, which shrinks the other slack.
            if use_slack_above && use_slack_below && (slack_above < 0 || slack_below < 0) {
                let (sum_lower_bound, sum_upper_bound) = self.sum_bounds(&*context);
                return Err(self.conflict(sum_lower_bound, sum_upper_bound).into());
            }

            // Only equality needs the alternation; a single pass is idempotent for inequalities.
            if !changed || !(use_slack_above && use_slack_below) {
                return Ok((slack_above, slack_below));
            }
        }
    }

    /// For `≠` with at most one unfixed term: `Ok(None)` when every term is fixed, otherwise the
    /// index of the unfixed term with the value it must avoid (if the avoided value is integral).
    /// `Err(())` when more than one term is unfixed.
    fn last_free_term(
        &self,
        context: &impl ReadDomains,
    ) -> Result<Option<(usize, Option<i32>)>, ()> {
        let mut unfixed = self
            .x
            .iter()
            .enumerate()
            .filter(|(_, x_i)| !context.is_fixed(*x_i))
            .map(|(index, _)| index);
        let first_unfixed = unfixed.next();
        if unfixed.next().is_some() {
            return Err(());
        }

        Ok(first_unfixed.map(|index| {
            let x_i = &self.x[index];
            let (sum_lower_bound, _) = self.sum_bounds(context);
            let (own_min, _) = self.contribution(
                index,
                context.lower_bound(x_i) as i64,
                context.upper_bound(x_i) as i64,
            );
            let rest = sum_lower_bound - own_min;
            let coefficient = self.coefficients[index];
            let target = if index < self.num_positive {
                self.rhs - rest
            } else {
                rest - self.rhs
            };

            let forbidden = (target % coefficient == 0)
                .then(|| i32::try_from(target / coefficient).ok())
                .flatten();
            (index, forbidden)
        }))
    }

    fn propagate_not_equal(&self, context: &mut PropagationContext) -> PropagationStatusCP {
        match self.last_free_term(&*context) {
            Err(()) => {
                let (sum_lower_bound, sum_upper_bound) = self.sum_bounds(&*context);
                if self.rhs < sum_lower_bound || self.rhs > sum_upper_bound {
                    context.set_passive();
                }
                return Ok(());
            }
            Ok(None) => {
                let (sum_lower_bound, sum_upper_bound) = self.sum_bounds(&*context);
                if sum_lower_bound == self.rhs {
                    return Err(self.conflict(sum_lower_bound, sum_upper_bound).into());
                }
            }
            Ok(Some((index, forbidden))) => {
                if let Some(forbidden) = forbidden {
                    let _ = context.remove(&self.x[index], forbidden)?;
                }
            }
        }

        context.set_passive();
        Ok(())
    }
}

impl<Var: IntegerVariable> Propagator for LinearSumPropagator<Var> {
    fn name(&self) -> &str {
        "LinearSum"
    }

    fn priority(&self) -> Priority {
        match self.x.len() {
            0..=2 => Priority::High,
            3 => Priority::Medium,
            _ => Priority::Low,
        }
    }

    fn notify(
        &mut self,
        mut context: NotificationContext,
        local_id: LocalId,
        event: DomainEvent,
    ) -> EnqueueDecision {
        let index = local_id.unpack() as usize;
        let x_i = &self.x[index];

        let old_lower_bound = context.read(self.lower_bounds[index]);
        let old_upper_bound = context.read(self.upper_bounds[index]);
        let new_lower_bound = context.lower_bound(x_i) as i64;
        let new_upper_bound = context.upper_bound(x_i) as i64;

        let (old_min, old_max) = self.contribution(index, old_lower_bound, old_upper_bound);
        let (new_min, new_max) = self.contribution(index, new_lower_bound, new_upper_bound);
        cp_assert_simple!(new_min >= old_min && new_max <= old_max);

        context.add_assign(self.sum_lower_bound, new_min - old_min);
        context.add_assign(self.sum_upper_bound, new_max - old_max);
        context.assign(self.lower_bounds[index], new_lower_bound);
        context.assign(self.upper_bounds[index], new_upper_bound);

        let relevant = match self.operator {
            LinearOperator::Equal => true,
            LinearOperator::LessOrEqual => new_min != old_min,
            LinearOperator::GreaterOrEqual => new_max != old_max,
            LinearOperator::NotEqual => x_i.unpack_event(event) == DomainEvent::Assign,
        };
        if relevant {
            EnqueueDecision::Enqueue
        } else {
            EnqueueDecision::Skip
        }
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        self.reset_caches(&mut context);
        self.propagate(context)
    }

    fn propagate(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        if self.operator == LinearOperator::NotEqual {
            return self.propagate_not_equal(&mut context);
        }

        let sum_lower_bound = context.read(self.sum_lower_bound);
        let sum_upper_bound = context.read(self.sum_upper_bound);
        let slack_above = self.rhs - sum_lower_bound;
        let slack_below = sum_upper_bound - self.rhs;

        let (use_slack_above, use_slack_below) = match self.operator {
            LinearOperator::Equal => (true, true),
            LinearOperator::LessOrEqual => (true, false),
            LinearOperator::GreaterOrEqual => (false, true),
            LinearOperator::NotEqual => unreachable!("handled above"),
        };
        if (use_slack_above && slack_above < 0) || (use_slack_below && slack_below < 0) {
            return Err(self.conflict(sum_lower_bound, sum_upper_bound).into());
        }

        let (slack_above, slack_below) = self.filter_bounds(
            &mut context,
            slack_above,
            slack_below,
            use_slack_above,
            use_slack_below,
        )?;

        let entailed = match self.operator {
            LinearOperator::Equal => slack_above <= 0 && slack_below <= 0,
            LinearOperator::LessOrEqual => slack_below <= 0,
            LinearOperator::GreaterOrEqual => slack_above <= 0,
            LinearOperator::NotEqual => false,
        };
        if entailed {
            context.set_passive();
        }

        Ok(())
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        if self.operator == LinearOperator::NotEqual {
            if let Ok(Some((index, forbidden))) = self.last_free_term(&domains) {
                let avoided =
                    !forbidden.is_some_and(|value| domains.contains(&self.x[index], value));
                return if avoided {
                    Entailment::True
                } else {
                    Entailment::Undefined
                };
            }
        }

        let (sum_lower_bound, sum_upper_bound) = self.sum_bounds(&domains);
        self.operator
            .entailment(sum_lower_bound, sum_upper_bound, self.rhs)
    }

    fn detect_inconsistency(&self, domains: Domains) -> Option<PropagatorConflict> {
        let (sum_lower_bound, sum_upper_bound) = self.sum_bounds(&domains);
        (self.operator.entailment(sum_lower_bound, sum_upper_bound, self.rhs) == Entailment::False)
            .then(|| self.conflict(sum_lower_bound, sum_upper_bound))
    }
}
