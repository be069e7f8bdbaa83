use std::collections::VecDeque;

use crate::basic_types::ConstraintOperationError;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::GraphId;
use crate::engine::variables::IntegerVariable;
use crate::engine::DomainEvents;
use crate::engine::GraphDomain;
use crate::engine::GraphEvents;
use crate::engine::Membership;
use crate::math::num_ext::clamp_to_i32;
use crate::propagation::Domains;
use crate::propagation::Entailment;
use crate::propagation::LocalId;
use crate::propagation::Priority;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::ReadDomains;

/// The [`PropagatorConstructor`] for the [`DiameterPropagator`]: `diameter` is the largest
/// shortest-path distance between two nodes of `graph`.
#[derive(Clone, Debug)]
pub struct DiameterArgs<Var> {
    pub graph: GraphId,
    pub diameter: Var,
}

impl<Var: IntegerVariable + 'static> PropagatorConstructor for DiameterArgs<Var> {
    type PropagatorImpl = DiameterPropagator<Var>;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        context.register_graph(self.graph, GraphEvents::ANY_GRAPH, LocalId::from(0));
        context.register(self.diameter.clone(), DomainEvents::BOUNDS, LocalId::from(1));
        let num_nodes = context.graph(self.graph).num_nodes();

        Ok(DiameterPropagator {
            graph: self.graph,
            diameter: self.diameter,
            distances: vec![None; num_nodes],
            queue: VecDeque::with_capacity(num_nodes),
        })
    }
}

/// Runs a breadth-first search in the envelope from every kernel node, cut off at the upper
/// bound of the diameter. Undecided nodes which some kernel node cannot reach are removed and
/// the lower bound of the diameter is raised to the longest distance between kernel nodes.
#[derive(Clone, Debug)]
pub struct DiameterPropagator<Var> {
    graph: GraphId,
    diameter: Var,
    distances: Vec<Option<usize>>,
    queue: VecDeque<(usize, usize)>,
}

/// What the kernel nodes reach in the envelope.
#[derive(Debug, Default)]
struct Reachability {
    /// The longest distance from one kernel node to another.
    longest: usize,
    unreachable: Vec<usize>,
}

/// Envelope distances from `source`, up to `max_depth`.
fn distances_from(
    graph: &GraphDomain,
    source: usize,
    max_depth: usize,
    distances: &mut [Option<usize>],
    queue: &mut VecDeque<(usize, usize)>,
) {
    distances.fill(None);
    queue.clear();

    distances[source] = Some(0);
    queue.push_back((source, 0));
    while let Some((node, depth)) = queue.pop_front() {
        if depth == max_depth {
            continue;
        }
        for successor in graph.envelope_successors(node) {
            if distances[successor].is_none() {
                distances[successor] = Some(depth + 1);
                queue.push_back((successor, depth + 1));
            }
        }
    }
}

/// Fails with the first pair of kernel nodes `(from, to)` for which `to` is not within
/// `max_depth` of `from`.
fn explore(
    graph: &GraphDomain,
    max_depth: usize,
    distances: &mut [Option<usize>],
    queue: &mut VecDeque<(usize, usize)>,
) -> Result<Reachability, (usize, usize)> {
    let mut reachability = Reachability::default();
    let mut is_unreachable = vec![false; graph.num_nodes()];

    for source in graph.nodes_with_state(Membership::Enforced) {
        distances_from(graph, source, max_depth, distances, queue);
        for node in 0..graph.num_nodes() {
            match (graph.node_state(node), distances[node]) {
                (Membership::Enforced, None) => return Err((source, node)),
                (Membership::Enforced, Some(distance)) => {
                    reachability.longest = reachability.longest.max(distance);
                }
                (Membership::Undecided, None) if !is_unreachable[node] => {
                    is_unreachable[node] = true;
                    reachability.unreachable.push(node);
                }
                _ => {}
            }
        }
    }

    Ok(reachability)
}

impl<Var: IntegerVariable + 'static> Propagator for DiameterPropagator<Var> {
    fn name(&self) -> &str {
        "Diameter"
    }

    fn priority(&self) -> Priority {
        Priority::Low
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        let _ = context.set_lower_bound(&self.diameter, 0)?;
        let max_depth = context.upper_bound(&self.diameter) as usize;

        // Removing a node may lengthen the paths between the others.
        let longest = loop {
            let graph = context.graph(self.graph);
            let reachability = explore(graph, max_depth, &mut self.distances, &mut self.queue)
                .map_err(|(from, to)| {
                    PropagatorConflict::new(format!(
                        "node {to} is not within distance {max_depth} of node {from}"
                    ))
                })?;

            if reachability.unreachable.is_empty() {
                break reachability.longest;
            }
            for node in reachability.unreachable {
                let _ = context.remove_node(self.graph, node)?;
            }
        };

        let longest = clamp_to_i32(longest as i64);
        let _ = context.set_lower_bound(&self.diameter, longest)?;
        let graph = context.graph(self.graph);
        if graph.is_instantiated() && graph.nodes_with_state(Membership::Enforced).next().is_some()
        {
            let _ = context.set_upper_bound(&self.diameter, longest)?;
        }

        Ok(())
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        let graph = domains.graph(self.graph);
        let upper_bound = domains.upper_bound(&self.diameter);
        if upper_bound < 0 {
            return Entailment::False;
        }

        let mut distances = vec![None; graph.num_nodes()];
        let mut queue = VecDeque::new();
        match explore(graph, upper_bound as usize, &mut distances, &mut queue) {
            Err(_) => Entailment::False,
            Ok(reachability) if graph.is_instantiated() => {
                let longest = clamp_to_i32(reachability.longest as i64);
                if !domains.contains(&self.diameter, longest) {
                    Entailment::False
                } else if domains.is_fixed(&self.diameter) {
                    Entailment::True
                } else {
                    Entailment::Undefined
                }
            }
            Ok(_) => Entailment::Undefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_solver::TestSolver;

    fn path(solver: &mut TestSolver, num_nodes: usize) -> GraphId {
        solver.new_graph_with_envelope(
            num_nodes,
            false,
            (1..num_nodes).map(|node| (node - 1, node)),
        )
    }

    #[test]
    fn nodes_out_of_reach_are_removed() {
        let mut solver = TestSolver::default();
        let graph = path(&mut solver, 4);
        let _ = solver.enforce_arc(graph, 0, 1).expect("edge in envelope");
        let diameter = solver.new_variable(0, 1);

        let _ = solver
            .new_propagator(DiameterArgs { graph, diameter })
            .expect("no empty domains");

        assert!(!solver.graph(graph).is_node_in_envelope(2));
        assert!(!solver.graph(graph).is_node_in_envelope(3));
        solver.assert_bounds(diameter, 1, 1);
    }

    #[test]
    fn lower_bound_is_the_longest_kernel_distance() {
        let mut solver = TestSolver::default();
        let graph = path(&mut solver, 4);
        let _ = solver.enforce_arc(graph, 0, 1).expect("edge in envelope");
        let _ = solver.enforce_arc(graph, 2, 3).expect("edge in envelope");
        let diameter = solver.new_variable(-2, 5);

        let _ = solver
            .new_propagator(DiameterArgs { graph, diameter })
            .expect("no empty domains");

        solver.assert_bounds(diameter, 3, 5);
    }

    #[test]
    fn distant_kernel_nodes_are_infeasible() {
        let mut solver = TestSolver::default();
        let graph = path(&mut solver, 4);
        let _ = solver.enforce_arc(graph, 0, 1).expect("edge in envelope");
        let _ = solver.enforce_arc(graph, 2, 3).expect("edge in envelope");
        let diameter = solver.new_variable(0, 2);

        let result = solver.new_propagator(DiameterArgs { graph, diameter });

        assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
    }

    #[test]
    fn decreasing_the_upper_bound_prunes_the_graph() {
        let mut solver = TestSolver::default();
        let graph = path(&mut solver, 4);
        let _ = solver.enforce_arc(graph, 0, 1).expect("edge in envelope");
        let diameter = solver.new_variable(0, 10);
        let propagator = solver
            .new_propagator(DiameterArgs { graph, diameter })
            .expect("no empty domains");
        assert!(solver.graph(graph).is_node_in_envelope(3));

        let _ = solver.set_upper_bound(diameter, 2).expect("non-empty domain");
        solver.propagate(propagator).expect("no conflict");

        assert!(solver.graph(graph).is_node_in_envelope(2));
        assert!(!solver.graph(graph).is_node_in_envelope(3));
    }

    #[test]
    fn instantiated_graph_fixes_the_diameter() {
        let mut solver = TestSolver::default();
        let graph = path(&mut solver, 3);
        let _ = solver.enforce_arc(graph, 0, 1).expect("edge in envelope");
        let _ = solver.enforce_arc(graph, 1, 2).expect("edge in envelope");
        let diameter = solver.new_variable(0, 10);

        let propagator = solver
            .new_propagator(DiameterArgs { graph, diameter })
            .expect("no empty domains");

        solver.assert_bounds(diameter, 2, 2);
        assert_eq!(Entailment::True, solver.is_entailed(propagator));
    }

    #[test]
    fn distances_follow_arc_directions() {
        let mut solver = TestSolver::default();
        let graph = solver.new_graph_with_envelope(3, true, [(0, 1), (1, 2), (2, 0)]);
        let _ = solver.enforce_arc(graph, 0, 1).expect("arc in envelope");
        let diameter = solver.new_variable(0, 10);

        let _ = solver
            .new_propagator(DiameterArgs { graph, diameter })
            .expect("no empty domains");

        solver.assert_bounds(diameter, 2, 10);
    }
}
