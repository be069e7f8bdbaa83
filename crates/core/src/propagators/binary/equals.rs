use crate::basic_types::ConstraintOperationError;
use crate::basic_types::Inconsistency;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::IntegerVariable;
use crate::engine::DomainEvents;
use crate::engine::IntDeltaMonitor;
use crate::propagation::Domains;
use crate::propagation::Entailment;
use crate::propagation::LocalId;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::Priority;
use crate::propagation::ReadDomains;

/// The [`PropagatorConstructor`] for the [`EqualsPropagator`].
#[derive(Clone, Debug)]
pub struct EqualsArgs<AVar, BVar> {
    pub a: AVar,
    pub b: BVar,
    pub offset: i32,
}

impl<AVar, BVar> PropagatorConstructor for EqualsArgs<AVar, BVar>
where
    AVar: IntegerVariable,
    BVar: IntegerVariable,
{
    type PropagatorImpl = EqualsPropagator<AVar, BVar>;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        let EqualsArgs { a, b, offset } = self;

        context.register(a.clone(), DomainEvents::ANY_INT, LocalId::from(0));
        context.register(b.clone(), DomainEvents::ANY_INT, LocalId::from(1));

        let a_removed_values = context.int_delta_monitor(a.clone());
        let b_removed_values = context.int_delta_monitor(b.clone());

        Ok(EqualsPropagator {
            a,
            b,
            offset,
            a_removed_values,
            b_removed_values,
        })
    }
}

/// Propagator for the constraint `a = b + offset`.
///
/// The first propagation intersects the domains. Afterwards the values removed from either side
/// are replayed through delta monitors and removed from the other side.
#[derive(Clone, Debug)]
pub struct EqualsPropagator<AVar, BVar> {
    a: AVar,
    b: BVar,
    offset: i32,

    a_removed_values: IntDeltaMonitor<AVar>,
    b_removed_values: IntDeltaMonitor<BVar>,
}

impl<AVar: IntegerVariable, BVar: IntegerVariable> EqualsPropagator<AVar, BVar> {
    fn propagate_bounds(&self, context: &mut PropagationContext) -> Result<(), Inconsistency> {
        loop {
            let mut changed = context.set_lower_bound(
                &self.a,
                context.lower_bound(&self.b).saturating_add(self.offset),
            )?;
            changed |= context.set_upper_bound(
                &self.a,
                context.upper_bound(&self.b).saturating_add(self.offset),
            )?;
            changed |= context.set_lower_bound(
                &self.b,
                context.lower_bound(&self.a).saturating_sub(self.offset),
            )?;
            changed |= context.set_upper_bound(
                &self.b,
                context.upper_bound(&self.a).saturating_sub(self.offset),
            )?;

            if !changed {
                return Ok(());
            }
        }
    }

    fn set_passive_if_fixed(&self, context: &mut PropagationContext) {
        if context.is_fixed(&self.a) {
            context.set_passive();
        }
    }
}

impl<AVar: IntegerVariable, BVar: IntegerVariable> Propagator for EqualsPropagator<AVar, BVar> {
    fn name(&self) -> &str {
        "Equals"
    }

    fn priority(&self) -> Priority {
        Priority::High
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        self.propagate_bounds(&mut context)?;

        let a_without_support = context
            .iterate_domain(&self.a)
            .filter(|&value| !context.contains(&self.b, value - self.offset))
            .collect::<Vec<_>>();
        for value in a_without_support {
            let _ = context.remove(&self.a, value)?;
        }

        let b_without_support = context
            .iterate_domain(&self.b)
            .filter(|&value| !context.contains(&self.a, value + self.offset))
            .collect::<Vec<_>>();
        for value in b_without_support {
            let _ = context.remove(&self.b, value)?;
        }

        self.a_removed_values.skip_to_end(&mut context);
        self.b_removed_values.skip_to_end(&mut context);

        self.set_passive_if_fixed(&mut context);
        Ok(())
    }

    fn propagate(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        let offset = self.offset;
        let a = self.a.clone();
        let b = self.b.clone();

        // Mirroring a removal adds to the delta of the other side, which is replayed in the
        // next round; it only contains values which are already gone from this side.
        loop {
            self.a_removed_values.freeze(&context);
            self.b_removed_values.freeze(&context);

            let mut mirrored = 0;
            self.a_removed_values
                .for_each(&mut context, |context, value| {
                    mirrored += context.remove(&b, value - offset)? as usize;
                    Ok::<(), Inconsistency>(())
                })?;
            self.b_removed_values
                .for_each(&mut context, |context, value| {
                    mirrored += context.remove(&a, value + offset)? as usize;
                    Ok::<(), Inconsistency>(())
                })?;

            self.a_removed_values.unfreeze(&mut context);
            self.b_removed_values.unfreeze(&mut context);

            if mirrored == 0 {
                break;
            }
        }

        self.set_passive_if_fixed(&mut context);
        Ok(())
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        match (domains.fixed_value(&self.a), domains.fixed_value(&self.b)) {
            (Some(a), Some(b)) if a as i64 == b as i64 + self.offset as i64 => Entailment::True,
            (Some(_), Some(_)) => Entailment::False,
            _ => {
                let overlapping = domains
                    .iterate_domain(&self.a)
                    .any(|value| domains.contains(&self.b, value - self.offset));
                if overlapping {
                    Entailment::Undefined
                } else {
                    Entailment::False
                }
            }
        }
    }

    fn detect_inconsistency(&self, domains: Domains) -> Option<PropagatorConflict> {
        let shifted_lower_bound = domains.lower_bound(&self.b) as i64 + self.offset as i64;
        let shifted_upper_bound = domains.upper_bound(&self.b) as i64 + self.offset as i64;

        ((domains.upper_bound(&self.a) as i64) < shifted_lower_bound
            || (domains.lower_bound(&self.a) as i64) > shifted_upper_bound)
            .then(|| PropagatorConflict::new("the shifted domains of a and b are disjoint"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_solver::TestSolver;

    #[test]
    fn first_propagation_intersects_the_domains() {
        let mut solver = TestSolver::default();
        let x = solver.new_sparse_variable(vec![1, 3, 5]);
        let y = solver.new_variable(0, 10);

        let _ = solver
            .new_propagator(EqualsArgs {
                a: x,
                b: y,
                offset: 0,
            })
            .expect("no empty domains");

        assert_eq!(vec![1, 3, 5], solver.domain(y));
    }

    #[test]
    fn removals_are_mirrored_with_the_offset() {
        let mut solver = TestSolver::default();
        let x = solver.new_variable(0, 10);
        let y = solver.new_variable(0, 10);

        let propagator = solver
            .new_propagator(EqualsArgs {
                a: x,
                b: y,
                offset: 2,
            })
            .expect("no empty domains");
        solver.assert_bounds(x, 2, 10);
        solver.assert_bounds(y, 0, 8);

        let _ = solver.remove(x, 5);
        let _ = solver.remove(y, 6);
        solver.propagate(propagator).expect("feasible");

        assert!(!solver.contains(y, 3));
        assert!(!solver.contains(x, 8));
        assert_eq!(vec![2, 3, 4, 6, 7, 9, 10], solver.domain(x));
    }

    #[test]
    fn backtracking_replays_redone_removals() {
        let mut solver = TestSolver::default();
        let x = solver.new_variable(0, 5);
        let y = solver.new_variable(0, 5);

        let propagator = solver
            .new_propagator(EqualsArgs {
                a: x,
                b: y,
                offset: 0,
            })
            .expect("no empty domains");

        solver.new_checkpoint();
        let _ = solver.remove(x, 2);
        solver.propagate(propagator).expect("feasible");
        assert!(!solver.contains(y, 2));

        solver.synchronise(0);
        assert!(solver.contains(y, 2));

        let _ = solver.remove(x, 3);
        solver.propagate(propagator).expect("feasible");
        assert!(solver.contains(y, 2));
        assert!(!solver.contains(y, 3));
    }

    #[test]
    fn disjoint_domains_are_infeasible() {
        let mut solver = TestSolver::default();
        let x = solver.new_sparse_variable(vec![0, 2, 4]);
        let y = solver.new_sparse_variable(vec![1, 3]);

        let result = solver.new_propagator(EqualsArgs {
            a: x,
            b: y,
            offset: 0,
        });

        assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
    }

    #[test]
    fn fixed_sides_become_passive() {
        let mut solver = TestSolver::default();
        let x = solver.new_variable(0, 5);
        let y = solver.new_variable(3, 3);

        let propagator = solver
            .new_propagator(EqualsArgs {
                a: x,
                b: y,
                offset: 1,
            })
            .expect("no empty domains");

        solver.assert_bounds(x, 4, 4);
        assert!(solver.is_passive(propagator));
        assert_eq!(Entailment::True, solver.is_entailed(propagator));
    }
}
