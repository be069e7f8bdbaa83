use crate::basic_types::ConstraintOperationError;
use crate::basic_types::PropagationStatusCP;
use crate::engine::variables::GraphId;
use crate::engine::EmptyDomain;
use crate::engine::GraphDelta;
use crate::engine::GraphDeltaMonitor;
use crate::engine::GraphEvents;
use crate::engine::Membership;
use crate::propagation::Domains;
use crate::propagation::Entailment;
use crate::propagation::LocalId;
use crate::propagation::Priority;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::ReadDomains;

/// The [`PropagatorConstructor`] for the [`AntiSymmetryPropagator`]: for every two distinct
/// nodes `i` and `j`, the arcs `(i, j)` and `(j, i)` are not both in the graph.
#[derive(Clone, Debug)]
pub struct AntiSymmetryArgs {
    pub graph: GraphId,
}

impl PropagatorConstructor for AntiSymmetryArgs {
    type PropagatorImpl = AntiSymmetryPropagator;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        if !context.graph(self.graph).is_directed() {
            return Err(ConstraintOperationError::InvalidParameter(
                "anti-symmetry is only defined on directed graphs",
            ));
        }

        context.register_graph(self.graph, GraphEvents::ARC_ENFORCED, LocalId::from(0));
        let enforced_arcs = context.graph_delta_monitor(self.graph);

        Ok(AntiSymmetryPropagator {
            graph: self.graph,
            enforced_arcs,
        })
    }
}

/// Removes the reverse of every arc in the kernel; loops are exempt.
#[derive(Clone, Debug)]
pub struct AntiSymmetryPropagator {
    graph: GraphId,
    enforced_arcs: GraphDeltaMonitor,
}

impl Propagator for AntiSymmetryPropagator {
    fn name(&self) -> &str {
        "AntiSymmetry"
    }

    fn priority(&self) -> Priority {
        Priority::High
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        let kernel_arcs = context
            .graph(self.graph)
            .arcs_with_state(Membership::Enforced)
            .filter(|&(from, to)| from != to)
            .collect::<Vec<_>>();
        for (from, to) in kernel_arcs {
            let _ = context.remove_arc(self.graph, to, from)?;
        }

        self.enforced_arcs.skip_to_end(&mut context);
        Ok(())
    }

    fn propagate(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        let graph = self.graph;
        self.enforced_arcs.freeze(&context);
        self.enforced_arcs.for_each(
            &mut context,
            GraphEvents::ARC_ENFORCED.events(),
            |context, delta| -> Result<(), EmptyDomain> {
                if let GraphDelta::ArcEnforced(from, to) = delta {
                    if from != to {
                        let _ = context.remove_arc(graph, to, from)?;
                    }
                }
                Ok(())
            },
        )?;
        self.enforced_arcs.unfreeze(&mut context);
        Ok(())
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        let graph = domains.graph(self.graph);
        let num_nodes = graph.num_nodes();
        let pairs = move || {
            (0..num_nodes).flat_map(move |from| (from + 1..num_nodes).map(move |to| (from, to)))
        };

        if pairs().any(|(i, j)| graph.is_arc_in_kernel(i, j) && graph.is_arc_in_kernel(j, i)) {
            Entailment::False
        } else if pairs()
            .all(|(i, j)| !graph.is_arc_in_envelope(i, j) || !graph.is_arc_in_envelope(j, i))
        {
            Entailment::True
        } else {
            Entailment::Undefined
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::Rng;
    use rand::SeedableRng;

    use super::*;
    use crate::engine::test_solver::TestSolver;

    #[test]
    fn reverse_of_kernel_arc_is_removed() {
        let mut solver = TestSolver::default();
        let graph = solver.new_graph(3, true);
        let _ = solver.enforce_arc(graph, 0, 1).expect("arc in envelope");

        let _ = solver
            .new_propagator(AntiSymmetryArgs { graph })
            .expect("no empty domains");

        assert!(!solver.graph(graph).is_arc_in_envelope(1, 0));
        assert!(solver.graph(graph).is_arc_in_envelope(0, 2));
    }

    #[test]
    fn enforced_arcs_are_handled_incrementally() {
        let mut solver = TestSolver::default();
        let graph = solver.new_graph(3, true);
        let propagator = solver
            .new_propagator(AntiSymmetryArgs { graph })
            .expect("no empty domains");

        let _ = solver.enforce_arc(graph, 2, 1).expect("arc in envelope");
        let _ = solver.enforce_arc(graph, 0, 0).expect("arc in envelope");
        solver.propagate(propagator).expect("no conflict");

        assert!(!solver.graph(graph).is_arc_in_envelope(1, 2));
        assert!(solver.graph(graph).is_arc_in_kernel(0, 0));
    }

    #[test]
    fn symmetric_kernel_arcs_are_a_conflict() {
        let mut solver = TestSolver::default();
        let graph = solver.new_graph(2, true);
        let propagator = solver
            .new_propagator(AntiSymmetryArgs { graph })
            .expect("no empty domains");

        let _ = solver.enforce_arc(graph, 0, 1).expect("arc in envelope");
        let _ = solver.enforce_arc(graph, 1, 0).expect("arc in envelope");

        assert!(solver.propagate(propagator).is_err());
        assert_eq!(Entailment::False, solver.is_entailed(propagator));
    }

    #[test]
    fn undirected_graphs_are_rejected() {
        let mut solver = TestSolver::default();
        let graph = solver.new_graph(2, false);

        let result = solver.new_propagator(AntiSymmetryArgs { graph });

        assert!(matches!(
            result,
            Err(ConstraintOperationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn entailed_once_no_pair_remains_open() {
        let mut solver = TestSolver::default();
        let graph = solver.new_graph_with_envelope(3, true, [(0, 1), (1, 2), (2, 1)]);
        let propagator = solver
            .new_propagator(AntiSymmetryArgs { graph })
            .expect("no empty domains");
        assert_eq!(Entailment::Undefined, solver.is_entailed(propagator));

        let _ = solver.enforce_arc(graph, 1, 2).expect("arc in envelope");
        solver.propagate(propagator).expect("no conflict");

        assert_eq!(Entailment::True, solver.is_entailed(propagator));
    }

    /// Arc pairs are independent, so for every pair of distinct nodes the surviving states are
    /// checked against the two-arc assignments which agree with the decisions.
    #[test]
    fn random_decisions_keep_exactly_the_antisymmetric_assignments() {
        let mut rng = SmallRng::seed_from_u64(19);

        for _ in 0..50 {
            let num_nodes = rng.gen_range(2..=5);
            let mut decisions = vec![vec![None; num_nodes]; num_nodes];

            let mut solver = TestSolver::default();
            let graph = solver.new_graph(num_nodes, true);
            let propagator = solver
                .new_propagator(AntiSymmetryArgs { graph })
                .expect("no decisions yet");

            for _ in 0..num_nodes * num_nodes {
                let from = rng.gen_range(0..num_nodes);
                let to = rng.gen_range(0..num_nodes);
                if solver.graph(graph).arc_state(from, to) != Membership::Undecided {
                    continue;
                }
                let enforce = rng.gen_bool(0.6);
                decisions[from][to] = Some(enforce);
                let _ = if enforce {
                    solver.enforce_arc(graph, from, to)
                } else {
                    solver.remove_arc(graph, from, to)
                }
                .expect("undecided arc");

                let agrees = |decision: Option<bool>, member: bool| {
                    decision.map_or(true, |decided| decided == member)
                };
                let mut feasible = true;
                let mut possible = vec![vec![(false, false); num_nodes]; num_nodes];
                for i in 0..num_nodes {
                    let decided = decisions[i][i];
                    possible[i][i] = (agrees(decided, true), agrees(decided, false));
                    for j in (0..num_nodes).filter(|&j| j != i) {
                        let assignments = [(false, false), (true, false), (false, true)]
                            .into_iter()
                            .filter(|&(forward, backward)| {
                                agrees(decisions[i][j], forward)
                                    && agrees(decisions[j][i], backward)
                            })
                            .collect::<Vec<_>>();
                        feasible &= !assignments.is_empty();
                        possible[i][j] = (
                            assignments.iter().any(|&(forward, _)| forward),
                            assignments.iter().any(|&(forward, _)| !forward),
                        );
                    }
                }

                if solver.propagate(propagator).is_err() {
                    assert!(!feasible, "conflict with {decisions:?}");
                    break;
                }
                assert!(feasible, "missed conflict with {decisions:?}");

                let domain = solver.graph(graph);
                for (from, row) in possible.iter().enumerate() {
                    for (to, &(can_be_in, can_be_out)) in row.iter().enumerate() {
                        let state = (
                            domain.is_arc_in_envelope(from, to),
                            domain.is_arc_in_kernel(from, to),
                        );
                        assert_eq!((can_be_in, !can_be_out), state, "{decisions:?}");
                    }
                }
            }
        }
    }
}
