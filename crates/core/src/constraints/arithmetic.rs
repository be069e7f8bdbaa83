use log::debug;

use super::Constraint;
use crate::engine::variables::IntegerVariable;
use crate::engine::State;
use crate::propagators::BigSumArgs;
use crate::propagators::BigSumOptions;
use crate::propagators::LinearOperator;
use crate::propagators::LinearSumArgs;
use crate::ConstraintOperationError;

/// Chooses between the flat and the tree-based propagator for linear constraints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinearOptions {
    /// Sums with more terms than this use the
    /// [`BigSumPropagator`](crate::propagators::BigSumPropagator).
    pub big_sum_threshold: usize,
    pub big_sum: BigSumOptions,
}

impl Default for LinearOptions {
    fn default() -> Self {
        LinearOptions {
            big_sum_threshold: 100,
            big_sum: BigSumOptions::default(),
        }
    }
}

/// Creates the constraint `sum(c_i * x_i) op rhs`.
///
/// Zero coefficients are ignored. Sums with more than [`LinearOptions::big_sum_threshold`] terms
/// are propagated over a tree of partial sums, smaller ones by iterating over all terms.
pub fn linear<Var: IntegerVariable>(
    terms: impl Into<Box<[(i32, Var)]>>,
    operator: LinearOperator,
    rhs: i32,
    options: LinearOptions,
) -> impl Constraint {
    Linear {
        terms: terms.into(),
        operator,
        rhs,
        options,
    }
}

#[derive(Debug)]
struct Linear<Var> {
    terms: Box<[(i32, Var)]>,
    operator: LinearOperator,
    rhs: i32,
    options: LinearOptions,
}

impl<Var: IntegerVariable> Constraint for Linear<Var> {
    fn post(self, state: &mut State) -> Result<(), ConstraintOperationError> {
        if self.terms.len() > self.options.big_sum_threshold {
            debug!("posting a linear sum over {} terms as a big sum", self.terms.len());
            BigSumArgs {
                terms: self.terms,
                operator: self.operator,
                rhs: self.rhs,
                options: self.options.big_sum,
            }
            .post(state)
        } else {
            LinearSumArgs {
                terms: self.terms,
                operator: self.operator,
                rhs: self.rhs,
            }
            .post(state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::variables::DomainId;
    use crate::propagation::PropagatorId;
    use crate::propagators::BigSumPropagator;
    use crate::propagators::LinearSumPropagator;

    fn sum_of(state: &mut State, num_terms: usize) -> Vec<(i32, DomainId)> {
        (0..num_terms)
            .map(|_| (1, state.new_variable(0, 1)))
            .collect()
    }

    #[test]
    fn small_sums_use_the_flat_propagator() {
        let mut state = State::default();
        let terms = sum_of(&mut state, 3);

        linear(terms, LinearOperator::LessOrEqual, 2, LinearOptions::default())
            .post(&mut state)
            .expect("feasible");

        assert!(state
            .get_propagator::<LinearSumPropagator<DomainId>>(PropagatorId(0))
            .is_some());
    }

    #[test]
    fn large_sums_use_the_tree() {
        let mut state = State::default();
        let terms = sum_of(&mut state, 5);
        let options = LinearOptions {
            big_sum_threshold: 4,
            big_sum: BigSumOptions {
                branching_factor: 2,
            },
        };

        linear(terms.clone(), LinearOperator::GreaterOrEqual, 5, options)
            .post(&mut state)
            .expect("feasible");

        assert!(state
            .get_propagator::<BigSumPropagator<DomainId>>(PropagatorId(0))
            .is_some());
        for (_, var) in terms {
            assert_eq!(1, state.lower_bound(var));
        }
    }

    #[test]
    fn infeasible_sums_are_reported() {
        let mut state = State::default();
        let terms = sum_of(&mut state, 2);

        let result =
            linear(terms, LinearOperator::Equal, 3, LinearOptions::default()).post(&mut state);

        assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
    }
}
