use crate::basic_types::ConstraintOperationError;
use crate::basic_types::Inconsistency;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::IntegerVariable;
use crate::engine::DomainEvents;
use crate::engine::IntDeltaMonitor;
use crate::engine::TrailedInteger;
use crate::math::num_ext::clamp_to_i32;
use crate::math::num_ext::NumExt;
use crate::propagation::Domains;
use crate::propagation::Entailment;
use crate::propagation::LocalId;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::Priority;
use crate::propagation::ReadDomains;

/// The [`PropagatorConstructor`] for the [`ScalePropagator`].
#[derive(Clone, Debug)]
pub struct ScaleArgs<VX, VY> {
    pub x: VX,
    pub y: VY,
    pub scale: i32,
}

impl<VX, VY> PropagatorConstructor for ScaleArgs<VX, VY>
where
    VX: IntegerVariable,
    VY: IntegerVariable,
{
    type PropagatorImpl = ScalePropagator<VX, VY>;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        let ScaleArgs { x, y, scale } = self;
        if scale == 0 {
            return Err(ConstraintOperationError::InvalidParameter(
                "the scale of y = c * x must be non-zero",
            ));
        }

        context.register(x.clone(), DomainEvents::ANY_INT, LocalId::from(0));
        context.register(y.clone(), DomainEvents::ANY_INT, LocalId::from(1));

        let x_removed_values = context.int_delta_monitor(x.clone());
        let y_removed_values = context.int_delta_monitor(y.clone());
        let values_filtered = context.new_trailed_integer(0);

        Ok(ScalePropagator {
            x,
            y,
            scale: scale as i64,
            x_removed_values,
            y_removed_values,
            values_filtered,
        })
    }
}

/// Propagator for `y = scale * x`.
///
/// Bounds are propagated in both directions, rounding towards the feasible side. As soon as one
/// of the domains has a hole, the values are filtered one by one: values of `y` need a preimage
/// in the domain of `x`, and values of `x` an image in the domain of `y`. From then on, until
/// backtracking past that point, every removal is mirrored through the delta monitors instead of
/// filtering the domains again.
#[derive(Clone, Debug)]
pub struct ScalePropagator<VX, VY> {
    x: VX,
    y: VY,
    scale: i64,

    x_removed_values: IntDeltaMonitor<VX>,
    y_removed_values: IntDeltaMonitor<VY>,
    /// 1 once the domains were filtered value by value.
    values_filtered: TrailedInteger,
}

impl<VX: IntegerVariable, VY: IntegerVariable> ScalePropagator<VX, VY> {
    /// Returns whether any bound changed.
    fn propagate_bounds(&self, context: &mut PropagationContext) -> Result<bool, Inconsistency> {
        let x_lower_bound = context.lower_bound(&self.x) as i64;
        let x_upper_bound = context.upper_bound(&self.x) as i64;
        let image_a = self.scale * x_lower_bound;
        let image_b = self.scale * x_upper_bound;

        let mut changed = context.set_lower_bound(&self.y, clamp_to_i32(image_a.min(image_b)))?;
        changed |= context.set_upper_bound(&self.y, clamp_to_i32(image_a.max(image_b)))?;

        let y_lower_bound = context.lower_bound(&self.y) as i64;
        let y_upper_bound = context.upper_bound(&self.y) as i64;
        let (new_lower_bound, new_upper_bound) = if self.scale > 0 {
            (
                <i64 as NumExt>::div_ceil(y_lower_bound, self.scale),
                <i64 as NumExt>::div_floor(y_upper_bound, self.scale),
            )
        } else {
            (
                <i64 as NumExt>::div_ceil(y_upper_bound, self.scale),
                <i64 as NumExt>::div_floor(y_lower_bound, self.scale),
            )
        };

        changed |= context.set_lower_bound(&self.x, clamp_to_i32(new_lower_bound))?;
        changed |= context.set_upper_bound(&self.x, clamp_to_i32(new_upper_bound))?;

        Ok(changed)
    }

    fn propagate_values(&self, context: &mut PropagationContext) -> PropagationStatusCP {
        let unsupported_y = context
            .iterate_domain(&self.y)
            .filter(|&value| {
                let value = value as i64;
                value % self.scale != 0
                    || !i32::try_from(value / self.scale)
                        .is_ok_and(|preimage| context.contains(&self.x, preimage))
            })
            .collect::<Vec<_>>();
        for value in unsupported_y {
            let _ = context.remove(&self.y, value)?;
        }

        let unsupported_x = context
            .iterate_domain(&self.x)
            .filter(|&value| {
                !i32::try_from(self.scale * value as i64)
                    .is_ok_and(|image| context.contains(&self.y, image))
            })
            .collect::<Vec<_>>();
        for value in unsupported_x {
            let _ = context.remove(&self.x, value)?;
        }

        Ok(())
    }

    /// Filters the values once either domain has a hole, and marks the remaining removals as
    /// consumed.
    fn filter_values_on_holes(&mut self, context: &mut PropagationContext) -> PropagationStatusCP {
        if context.has_holes(&self.x) || context.has_holes(&self.y) {
            self.propagate_values(context)?;
            context.assign(self.values_filtered, 1);
        }

        self.x_removed_values.skip_to_end(context);
        self.y_removed_values.skip_to_end(context);
        Ok(())
    }

    fn mirror_removals(&mut self, context: &mut PropagationContext) -> PropagationStatusCP {
        let (x, y, scale) = (self.x.clone(), self.y.clone(), self.scale);

        loop {
            self.x_removed_values.freeze(&*context);
            self.y_removed_values.freeze(&*context);

            let mut mirrored = 0;
            self.x_removed_values.for_each(context, |context, value| {
                if let Ok(image) = i32::try_from(scale * value as i64) {
                    mirrored += context.remove(&y, image)? as usize;
                }
                Ok::<(), Inconsistency>(())
            })?;
            self.y_removed_values.for_each(context, |context, value| {
                let value = value as i64;
                if value % scale == 0 {
                    if let Ok(preimage) = i32::try_from(value / scale) {
                        mirrored += context.remove(&x, preimage)? as usize;
                    }
                }
                Ok::<(), Inconsistency>(())
            })?;

            self.x_removed_values.unfreeze(context);
            self.y_removed_values.unfreeze(context);

            if mirrored == 0 {
                return Ok(());
            }
        }
    }

    fn set_passive_if_fixed(&self, context: &mut PropagationContext) {
        if context.is_fixed(&self.x) {
            context.set_passive();
        }
    }
}

impl<VX: IntegerVariable, VY: IntegerVariable> Propagator for ScalePropagator<VX, VY> {
    fn name(&self) -> &str {
        "Scale"
    }

    fn priority(&self) -> Priority {
        Priority::High
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        while self.propagate_bounds(&mut context)? {}
        self.filter_values_on_holes(&mut context)?;

        self.set_passive_if_fixed(&mut context);
        Ok(())
    }

    fn propagate(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        while self.propagate_bounds(&mut context)? {}

        if context.read(self.values_filtered) == 0 {
            self.filter_values_on_holes(&mut context)?;
        } else {
            self.mirror_removals(&mut context)?;
        }

        self.set_passive_if_fixed(&mut context);
        Ok(())
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        let image_a = self.scale * domains.lower_bound(&self.x) as i64;
        let image_b = self.scale * domains.upper_bound(&self.x) as i64;
        let y_lower_bound = domains.lower_bound(&self.y) as i64;
        let y_upper_bound = domains.upper_bound(&self.y) as i64;

        if image_a.max(image_b) < y_lower_bound || image_a.min(image_b) > y_upper_bound {
            return Entailment::False;
        }

        match (domains.fixed_value(&self.x), domains.fixed_value(&self.y)) {
            (Some(x), Some(y)) if self.scale * x as i64 == y as i64 => Entailment::True,
            (Some(_), Some(_)) => Entailment::False,
            _ => Entailment::Undefined,
        }
    }

    fn detect_inconsistency(&self, domains: Domains) -> Option<PropagatorConflict> {
        (self.is_entailed(domains) == Entailment::False)
            .then(|| PropagatorConflict::new("y cannot be the scaled value of x"))
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

    #[test]
    fn bounds_round_towards_the_feasible_side() {
        let mut solver = TestSolver::default();
        let x = solver.new_variable(-10, 10);
        let y = solver.new_variable(1, 13);

        let _ = solver
            .new_propagator(ScaleArgs { x, y, scale: 3 })
            .expect("no empty domains");

        solver.assert_bounds(x, 1, 4);
        solver.assert_bounds(y, 3, 12);
    }

    #[test]
    fn negative_scale_swaps_the_bounds() {
        let mut solver = TestSolver::default();
        let x = solver.new_variable(-10, 10);
        let y = solver.new_variable(1, 13);

        let _ = solver
            .new_propagator(ScaleArgs { x, y, scale: -2 })
            .expect("no empty domains");

        solver.assert_bounds(x, -6, -1);
        solver.assert_bounds(y, 2, 12);
    }

    #[test]
    fn holes_are_filtered_value_by_value() {
        let mut solver = TestSolver::default();
        let x = solver.new_sparse_variable(vec![1, 3, 5]);
        let y = solver.new_variable(0, 10);

        let _ = solver
            .new_propagator(ScaleArgs { x, y, scale: 2 })
            .expect("no empty domains");

        assert_eq!(vec![2, 6, 10], solver.domain(y));
        assert_eq!(vec![1, 3, 5], solver.domain(x));
    }

    #[test]
    fn removals_are_mirrored() {
        let mut solver = TestSolver::default();
        let x = solver.new_variable(0, 4);
        let y = solver.new_variable(0, 8);

        let propagator = solver
            .new_propagator(ScaleArgs { x, y, scale: 2 })
            .expect("no empty domains");

        let _ = solver.remove(y, 4);
        solver.propagate(propagator).expect("feasible");

        assert_eq!(vec![0, 1, 3, 4], solver.domain(x));
        assert_eq!(vec![0, 2, 6, 8], solver.domain(y));
    }

    #[test]
    fn zero_scale_is_rejected() {
        let mut solver = TestSolver::default();
        let x = solver.new_variable(0, 4);
        let y = solver.new_variable(0, 8);

        let result = solver.new_propagator(ScaleArgs { x, y, scale: 0 });

        assert!(matches!(
            result,
            Err(ConstraintOperationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn disjoint_ranges_are_infeasible() {
        let mut solver = TestSolver::default();
        let x = solver.new_variable(5, 6);
        let y = solver.new_variable(0, 8);

        let result = solver.new_propagator(ScaleArgs { x, y, scale: 2 });

        assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
    }

    #[test]
    fn filtered_domains_mirror_later_removals() {
        let mut solver = TestSolver::default();
        let x = solver.new_sparse_variable(vec![1, 3, 5]);
        let y = solver.new_variable(0, 10);
        let propagator = solver
            .new_propagator(ScaleArgs { x, y, scale: 2 })
            .expect("no empty domains");

        let _ = solver.remove(x, 3).expect("non-empty domain");
        let _ = solver.set_upper_bound(y, 9).expect("non-empty domain");
        solver.propagate(propagator).expect("feasible");

        assert_eq!(vec![1], solver.domain(x));
        assert_eq!(vec![2], solver.domain(y));
    }

    #[test]
    fn bounds_only_until_a_hole_appears() {
        let mut solver = TestSolver::default();
        let x = solver.new_variable(0, 4);
        let y = solver.new_variable(0, 8);
        let propagator = solver
            .new_propagator(ScaleArgs { x, y, scale: 2 })
            .expect("no empty domains");

        let _ = solver.set_upper_bound(y, 7).expect("non-empty domain");
        solver.propagate(propagator).expect("feasible");
        solver.assert_bounds(x, 0, 3);
        solver.assert_bounds(y, 0, 6);
        assert!(solver.contains(y, 3));

        solver.new_checkpoint();
        let _ = solver.remove(y, 2).expect("non-empty domain");
        solver.propagate(propagator).expect("feasible");
        assert_eq!(vec![0, 2, 3], solver.domain(x));
        assert_eq!(vec![0, 4, 6], solver.domain(y));
        let scale = solver.propagator::<ScalePropagator<DomainId, DomainId>>(propagator);
        assert_eq!(1, solver.read(scale.values_filtered));

        solver.synchronise(0);
        let _ = solver.set_lower_bound(x, 1).expect("non-empty domain");
        solver.propagate(propagator).expect("feasible");
        solver.assert_bounds(y, 2, 6);
        assert!(solver.contains(y, 3));
        let scale = solver.propagator::<ScalePropagator<DomainId, DomainId>>(propagator);
        assert_eq!(0, solver.read(scale.values_filtered));
    }

    /// Once a domain has a hole, every value of `y` must have a preimage in `x` and every value of
    /// `x` an image in `y`; no pair `(v, scale * v)` allowed by the removals may disappear.
    #[test]
    fn random_removals_keep_the_supported_pairs() {
        let mut rng = SmallRng::seed_from_u64(3);

        for _ in 0..200 {
            let scale = rng.gen_range(1..=3) * if rng.gen_bool(0.4) { -1 } else { 1 };
            let x_values = (-6..=6).filter(|_| rng.gen_bool(0.8)).collect::<Vec<i32>>();
            if x_values.is_empty() {
                continue;
            }
            let y_lower_bound = rng.gen_range(-20..0);
            let y_upper_bound = rng.gen_range(0..20);

            let mut solver = TestSolver::default();
            let x = solver.new_sparse_variable(x_values.clone());
            let y = solver.new_variable(y_lower_bound, y_upper_bound);
            let mut removed = Vec::new();

            let Ok(propagator) = solver.new_propagator(ScaleArgs { x, y, scale }) else {
                continue;
            };

            for _ in 0..6 {
                let value = rng.gen_range(-6..=6);
                if !solver.contains(x, value) || solver.domain(x).len() == 1 {
                    continue;
                }
                removed.push(value);
                let _ = solver.remove(x, value).expect("other values remain");

                let supported = x_values
                    .iter()
                    .filter(|value| !removed.contains(value))
                    .map(|&value| (value, scale * value))
                    .filter(|(_, image)| (y_lower_bound..=y_upper_bound).contains(image))
                    .collect::<Vec<_>>();
                if solver.propagate(propagator).is_err() {
                    assert!(supported.is_empty(), "conflict with scale {scale}");
                    break;
                }

                for (value, image) in supported {
                    assert!(solver.contains(x, value), "x lost {value} with scale {scale}");
                    assert!(solver.contains(y, image), "y lost {image} with scale {scale}");
                }

                if solver.has_holes(x) || solver.has_holes(y) {
                    for value in solver.domain(y) {
                        assert!(value % scale == 0 && solver.contains(x, value / scale));
                    }
                    for value in solver.domain(x) {
                        assert!(solver.contains(y, scale * value));
                    }
                }
            }
        }
    }
}
