use std::ops::Range;

use log::warn;

use super::linear_sum::split_terms;
use super::linear_sum::term_contribution;
use super::LinearOperator;
use crate::basic_types::ConstraintOperationError;
use crate::basic_types::Inconsistency;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::IntegerVariable;
use crate::engine::DomainEvent;
use crate::engine::DomainEvents;
use crate::engine::TrailedInteger;
use crate::math::num_ext::clamp_to_i32;
use crate::propagation::Domains;
use crate::propagation::EnqueueDecision;
use crate::propagation::Entailment;
use crate::propagation::HasAssignments;
use crate::propagation::LocalId;
use crate::propagation::NotificationContext;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::Priority;
use crate::propagation::ReadDomains;

/// Shape of the partial-sum tree of a [`BigSumPropagator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BigSumOptions {
    /// The number of children of every internal node; at least 2.
    pub branching_factor: usize,
}

impl Default for BigSumOptions {
    fn default() -> Self {
        BigSumOptions {
            branching_factor: 20,
        }
    }
}

/// The [`PropagatorConstructor`] for the [`BigSumPropagator`].
#[derive(Clone, Debug)]
pub struct BigSumArgs<Var> {
    pub terms: Box<[(i32, Var)]>,
    pub operator: LinearOperator,
    pub rhs: i32,
    pub options: BigSumOptions,
}

impl<Var: IntegerVariable> PropagatorConstructor for BigSumArgs<Var> {
    type PropagatorImpl = BigSumPropagator<Var>;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        let BigSumArgs {
            terms,
            operator,
            rhs,
            options,
        } = self;

        if options.branching_factor < 2 {
            return Err(ConstraintOperationError::InvalidParameter(
                "the branching factor of a big sum must be at least 2",
            ));
        }

        let (x, coefficients, num_positive) = split_terms(&terms, rhs, &context)?;
        if x.len() < options.branching_factor {
            warn!(
                "big sum over {} terms with branching factor {}; the flat sum is cheaper",
                x.len(),
                options.branching_factor
            );
        }

        // Leaves take the indices of the terms; every level of internal nodes is appended after
        // the previous one, so a parent always has a larger index than its children.
        let mut parents: Vec<Option<usize>> = vec![None; x.len()];
        let mut children: Vec<Range<usize>> = vec![];
        let mut level = 0..x.len();
        while level.len() > 1 {
            let next_level_start = parents.len();
            let mut group_start = level.start;
            while group_start < level.end {
                let group_end = (group_start + options.branching_factor).min(level.end);
                let node = parents.len();
                parents.push(None);
                for child in group_start..group_end {
                    parents[child] = Some(node);
                }
                children.push(group_start..group_end);
                group_start = group_end;
            }
            level = next_level_start..parents.len();
        }

        for (index, x_i) in x.iter().enumerate() {
            context.register(x_i.clone(), DomainEvents::BOUNDS, LocalId::from(index as u32));
        }

        let lower_sums = (0..parents.len())
            .map(|_| context.new_trailed_integer(0))
            .collect();
        let upper_sums = (0..parents.len())
            .map(|_| context.new_trailed_integer(0))
            .collect();

        Ok(BigSumPropagator {
            x,
            coefficients,
            num_positive,
            operator,
            rhs: rhs as i64,
            parents: parents.into(),
            children: children.into(),
            lower_sums,
            upper_sums,
        })
    }
}

/// Propagator for `Σ c_i * x_i op rhs` over many terms.
///
/// The terms are the leaves of a balanced tree in which every node holds the bounds of the sum
/// of its subtree. A bound change at a leaf reaches the root in O(log n), and filtering only
/// descends into subtrees whose range exceeds the slack, so propagation is sub-linear when few
/// terms can be tightened.
#[derive(Clone, Debug)]
pub struct BigSumPropagator<Var> {
    x: Box<[Var]>,
    coefficients: Box<[i64]>,
    num_positive: usize,
    operator: LinearOperator,
    rhs: i64,

    parents: Box<[Option<usize>]>,
    /// The children of internal node `x.len() + i` at index `i`.
    children: Box<[Range<usize>]>,
    lower_sums: Box<[TrailedInteger]>,
    upper_sums: Box<[TrailedInteger]>,
}

impl<Var: IntegerVariable> BigSumPropagator<Var> {
    fn root(&self) -> Option<usize> {
        self.parents.len().checked_sub(1)
    }

    fn leaf_contribution(&self, context: &impl ReadDomains, leaf: usize) -> (i64, i64) {
        term_contribution(
            self.coefficients[leaf],
            leaf < self.num_positive,
            context.lower_bound(&self.x[leaf]) as i64,
            context.upper_bound(&self.x[leaf]) as i64,
        )
    }

    fn root_sums(&self, context: &impl ReadDomains) -> (i64, i64) {
        self.root().map_or((0, 0), |root| {
            (
                context.read(self.lower_sums[root]),
                context.read(self.upper_sums[root]),
            )
        })
    }

    /// Pushes the current bounds of a leaf up to the root. Returns whether the lower and the
    /// upper sum changed.
    fn update_leaf(&self, context: &mut impl HasAssignments, leaf: usize) -> (bool, bool) {
        let (new_min, new_max) = self.leaf_contribution(&*context, leaf);
        let lower_difference = new_min - context.read(self.lower_sums[leaf]);
        let upper_difference = new_max - context.read(self.upper_sums[leaf]);
        if lower_difference == 0 && upper_difference == 0 {
            return (false, false);
        }

        let mut node = Some(leaf);
        while let Some(current) = node {
            let trailed_values = context.trailed_values_mut();
            trailed_values.add_assign(self.lower_sums[current], lower_difference);
            trailed_values.add_assign(self.upper_sums[current], upper_difference);
            node = self.parents[current];
        }

        (lower_difference != 0, upper_difference != 0)
    }

    fn conflict(&self, context: &impl ReadDomains) -> PropagatorConflict {
        let (sum_lower_bound, sum_upper_bound) = self.root_sums(context);
        PropagatorConflict::new(format!(
            "the sum of {} terms ranges over [{sum_lower_bound}, {sum_upper_bound}], which cannot satisfy {:?} {}",
            self.x.len(),
            self.operator,
            self.rhs
        ))
    }

    /// The slack above the lower bound of the sum and below its upper bound.
    fn slacks(&self, context: &impl ReadDomains) -> (i64, i64) {
        let (sum_lower_bound, sum_upper_bound) = self.root_sums(context);
        (self.rhs - sum_lower_bound, sum_upper_bound - self.rhs)
    }

    fn check_slacks(
        &self,
        context: &PropagationContext,
        use_slack_above: bool,
        use_slack_below: bool,
    ) -> Result<(), Inconsistency> {
        let (slack_above, slack_below) = self.slacks(context);
        if (use_slack_above && slack_above < 0) || (use_slack_below && slack_below < 0) {
            return Err(self.conflict(context).into());
        }
        Ok(())
    }

    fn filter_subtree(
        &self,
        context: &mut PropagationContext,
        node: usize,
        use_slack_above: bool,
        use_slack_below: bool,
    ) -> Result<bool, Inconsistency> {
        let (slack_above, slack_below) = self.slacks(&*context);
        let range = context.read(self.upper_sums[node]) - context.read(self.lower_sums[node]);
        if !((use_slack_above && range > slack_above) || (use_slack_below && range > slack_below))
        {
            return Ok(false);
        }

        if node < self.x.len() {
            return self.filter_leaf(context, node, use_slack_above, use_slack_below);
        }

        let mut changed = false;
        for child in self.children[node - self.x.len()].clone() {
            changed |= self.filter_subtree(context, child, use_slack_above, use_slack_below)?;
        }
        Ok(changed)
    }

    fn filter_leaf(
        &self,
        context: &mut PropagationContext,
        leaf: usize,
        use_slack_above: bool,
        use_slack_below: bool,
    ) -> Result<bool, Inconsistency> {
        let x_i = &self.x[leaf];
        let coefficient = self.coefficients[leaf];
        let positive = leaf < self.num_positive;
        let mut changed = false;

        if use_slack_above {
            let (slack_above, _) = self.slacks(&*context);
            let lower_bound = context.lower_bound(x_i) as i64;
            let upper_bound = context.upper_bound(x_i) as i64;
            if coefficient * (upper_bound - lower_bound) > slack_above {
                let step = slack_above / coefficient;
                changed |= if positive {
                    context.set_upper_bound(x_i, clamp_to_i32(lower_bound + step))?
                } else {
                    context.set_lower_bound(x_i, clamp_to_i32(upper_bound - step))?
                };
                let _ = self.update_leaf(context, leaf);
                self.check_slacks(context, use_slack_above, use_slack_below)?;
            }
        }

        if use_slack_below {
            let (_, slack_below) = self.slacks(&*context);
            let lower_bound = context.lower_bound(x_i) as i64;
            let upper_bound = context.upper_bound(x_i) as i64;
            if coefficient * (upper_bound - lower_bound) > slack_below {
                let step = slack_below / coefficient;
                changed |= if positive {
                    context.set_lower_bound(x_i, clamp_to_i32(upper_bound - step))?
                } else {
                    context.set_upper_bound(x_i, clamp_to_i32(lower_bound + step))?
                };
                let _ = self.update_leaf(context, leaf);
                self.check_slacks(context, use_slack_above, use_slack_below)?;
            }
        }

        Ok(changed)
    }

    fn propagate_not_equal(&self, context: &mut PropagationContext) -> PropagationStatusCP {
        let (sum_lower_bound, sum_upper_bound) = self.root_sums(&*context);
        if self.rhs < sum_lower_bound || self.rhs > sum_upper_bound {
            context.set_passive();
            return Ok(());
        }
        if sum_lower_bound == sum_upper_bound {
            return Err(self.conflict(&*context).into());
        }

        let mut unfixed = (0..self.x.len()).filter(|&leaf| !context.is_fixed(&self.x[leaf]));
        let (Some(leaf), None) = (unfixed.next(), unfixed.next()) else {
            return Ok(());
        };

        let (own_min, _) = self.leaf_contribution(&*context, leaf);
        let rest = sum_lower_bound - own_min;
        let coefficient = self.coefficients[leaf];
        let target = if leaf < self.num_positive {
            self.rhs - rest
        } else {
            rest - self.rhs
        };
        if target % coefficient == 0 {
            if let Ok(forbidden) = i32::try_from(target / coefficient) {
                let _ = context.remove(&self.x[leaf], forbidden)?;
            }
        }

        context.set_passive();
        Ok(())
    }
}

impl<Var: IntegerVariable> Propagator for BigSumPropagator<Var> {
    fn name(&self) -> &str {
        "BigSum"
    }

    fn priority(&self) -> Priority {
        Priority::Low
    }

    fn notify(
        &mut self,
        mut context: NotificationContext,
        local_id: LocalId,
        event: DomainEvent,
    ) -> EnqueueDecision {
        let leaf = local_id.unpack() as usize;
        let (lower_changed, upper_changed) = self.update_leaf(&mut context, leaf);

        let relevant = match self.operator {
            LinearOperator::Equal => lower_changed || upper_changed,
            LinearOperator::LessOrEqual => lower_changed,
            LinearOperator::GreaterOrEqual => upper_changed,
            LinearOperator::NotEqual => self.x[leaf].unpack_event(event) == DomainEvent::Assign,
        };
        if relevant {
            EnqueueDecision::Enqueue
        } else {
            EnqueueDecision::Skip
        }
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        for node in 0..self.parents.len() {
            let (lower_sum, upper_sum) = if node < self.x.len() {
                self.leaf_contribution(&context, node)
            } else {
                self.children[node - self.x.len()]
                    .clone()
                    .fold((0, 0), |(lower, upper), child| {
                        (
                            lower + context.read(self.lower_sums[child]),
                            upper + context.read(self.upper_sums[child]),
                        )
                    })
            };
            context.assign(self.lower_sums[node], lower_sum);
            context.assign(self.upper_sums[node], upper_sum);
        }

        self.propagate(context)
    }

    fn propagate(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        let (use_slack_above, use_slack_below) = match self.operator {
            LinearOperator::Equal => (true, true),
            LinearOperator::LessOrEqual => (true, false),
            LinearOperator::GreaterOrEqual => (false, true),
            LinearOperator::NotEqual => return self.propagate_not_equal(&mut context),
        };

        self.check_slacks(&context, use_slack_above, use_slack_below)?;

        if let Some(root) = self.root() {
            while self.filter_subtree(&mut context, root, use_slack_above, use_slack_below)? {
                if !(use_slack_above && use_slack_below) {
                    break;
                }
            }
        }

        let (slack_above, slack_below) = self.slacks(&context);
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
        let (sum_lower_bound, sum_upper_bound) = (0..self.x.len())
            .map(|leaf| self.leaf_contribution(&domains, leaf))
            .fold((0, 0), |(lower, upper), (min, max)| (lower + min, upper + max));
        self.operator
            .entailment(sum_lower_bound, sum_upper_bound, self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::Rng;
    use rand::SeedableRng;

    use super::*;
    use crate::engine::test_solver::TestSolver;
    use crate::propagators::arithmetic::LinearSumArgs;

    fn options(branching_factor: usize) -> BigSumOptions {
        BigSumOptions { branching_factor }
    }

    #[test]
    fn branching_factor_below_two_is_rejected() {
        let mut solver = TestSolver::default();
        let x = solver.new_variable(0, 10);

        let result = solver.new_propagator(BigSumArgs {
            terms: [(1, x)].into(),
            operator: LinearOperator::Equal,
            rhs: 4,
            options: options(1),
        });

        assert!(matches!(
            result,
            Err(ConstraintOperationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn equality_over_many_terms() {
        let mut solver = TestSolver::default();
        let x = (0..30).map(|_| solver.new_variable(0, 10)).collect::<Vec<_>>();

        let propagator = solver
            .new_propagator(BigSumArgs {
                terms: x.iter().map(|&x_i| (1, x_i)).collect(),
                operator: LinearOperator::Equal,
                rhs: 5,
                options: options(4),
            })
            .expect("no empty domains");

        for &x_i in &x {
            solver.assert_bounds(x_i, 0, 5);
        }

        let _ = solver.set_lower_bound(x[17], 3);
        solver.propagate(propagator).expect("feasible");
        for (index, &x_i) in x.iter().enumerate() {
            if index != 17 {
                solver.assert_bounds(x_i, 0, 2);
            }
        }
    }

    #[test]
    fn tree_sums_are_restored_on_backtrack() {
        let mut solver = TestSolver::default();
        let x = (0..9).map(|_| solver.new_variable(0, 4)).collect::<Vec<_>>();

        let propagator = solver
            .new_propagator(BigSumArgs {
                terms: x.iter().map(|&x_i| (2, x_i)).collect(),
                operator: LinearOperator::LessOrEqual,
                rhs: 10,
                options: options(2),
            })
            .expect("no empty domains");
        solver.assert_bounds(x[0], 0, 4);

        solver.new_checkpoint();
        let _ = solver.set_lower_bound(x[0], 3);
        let _ = solver.set_lower_bound(x[8], 1);
        solver.propagate(propagator).expect("feasible");
        solver.assert_bounds(x[4], 0, 1);

        solver.synchronise(0);
        let _ = solver.set_lower_bound(x[3], 4);
        solver.propagate(propagator).expect("feasible");
        solver.assert_bounds(x[4], 0, 1);
        solver.assert_bounds(x[0], 0, 1);
    }

    #[test]
    fn greater_or_equal_fails_when_the_upper_sum_is_too_small() {
        let mut solver = TestSolver::default();
        let x = (0..5).map(|_| solver.new_variable(0, 1)).collect::<Vec<_>>();

        let result = solver.new_propagator(BigSumArgs {
            terms: x.iter().map(|&x_i| (1, x_i)).collect(),
            operator: LinearOperator::GreaterOrEqual,
            rhs: 6,
            options: options(2),
        });

        assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
    }

    #[test]
    fn not_equal_uses_the_root_sums() {
        let mut solver = TestSolver::default();
        let x = (0..4).map(|_| solver.new_variable(0, 2)).collect::<Vec<_>>();

        let propagator = solver
            .new_propagator(BigSumArgs {
                terms: x.iter().map(|&x_i| (1, x_i)).collect(),
                operator: LinearOperator::NotEqual,
                rhs: 3,
                options: options(2),
            })
            .expect("no empty domains");

        let _ = solver.fix(x[0], 1);
        let _ = solver.fix(x[1], 1);
        let _ = solver.fix(x[2], 0);
        solver.propagate(propagator).expect("feasible");

        assert_eq!(vec![0, 2], solver.domain(x[3]));
    }

    #[test]
    fn agrees_with_the_flat_sum() {
        let mut rng = SmallRng::seed_from_u64(7);

        for _ in 0..30 {
            let num_terms = rng.gen_range(1..25);
            let terms = (0..num_terms)
                .map(|_| {
                    let coefficient = rng.gen_range(1..5) * if rng.gen_bool(0.3) { -1 } else { 1 };
                    let lower_bound = rng.gen_range(-5..5);
                    let upper_bound = lower_bound + rng.gen_range(0..8);
                    (coefficient, lower_bound, upper_bound)
                })
                .collect::<Vec<_>>();
            let operator = [
                LinearOperator::Equal,
                LinearOperator::LessOrEqual,
                LinearOperator::GreaterOrEqual,
            ][rng.gen_range(0..3)];
            let rhs = rng.gen_range(-20..20);

            let mut flat = TestSolver::default();
            let flat_vars = terms
                .iter()
                .map(|&(_, lb, ub)| flat.new_variable(lb, ub))
                .collect::<Vec<_>>();
            let flat_result = flat.new_propagator(LinearSumArgs {
                terms: terms
                    .iter()
                    .zip(&flat_vars)
                    .map(|(&(c, _, _), &var)| (c, var))
                    .collect(),
                operator,
                rhs,
            });

            let mut tree = TestSolver::default();
            let tree_vars = terms
                .iter()
                .map(|&(_, lb, ub)| tree.new_variable(lb, ub))
                .collect::<Vec<_>>();
            let tree_result = tree.new_propagator(BigSumArgs {
                terms: terms
                    .iter()
                    .zip(&tree_vars)
                    .map(|(&(c, _, _), &var)| (c, var))
                    .collect(),
                operator,
                rhs,
                options: options(3),
            });

            assert_eq!(flat_result.is_ok(), tree_result.is_ok());
            if flat_result.is_ok() {
                for (&flat_var, &tree_var) in flat_vars.iter().zip(&tree_vars) {
                    assert_eq!(flat.lower_bound(flat_var), tree.lower_bound(tree_var));
                    assert_eq!(flat.upper_bound(flat_var), tree.upper_bound(tree_var));
                }
            }
        }
    }
}
