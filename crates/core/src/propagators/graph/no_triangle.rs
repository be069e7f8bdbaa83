use crate::basic_types::ConstraintOperationError;
use crate::basic_types::PropagationStatusCP;
use crate::engine::variables::GraphId;
use crate::engine::EmptyDomain;
use crate::engine::GraphDelta;
use crate::engine::GraphDeltaMonitor;
use crate::engine::GraphDomain;
use crate::engine::GraphEvents;
use crate::engine::Membership;
use crate::propagation::Domains;
use crate::propagation::Entailment;
use crate::propagation::LocalId;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::ReadDomains;

/// The [`PropagatorConstructor`] for the [`NoTrianglePropagator`]: the undirected `graph`
/// contains no cycle of length three.
#[derive(Clone, Debug)]
pub struct NoTriangleArgs {
    pub graph: GraphId,
}

impl PropagatorConstructor for NoTriangleArgs {
    type PropagatorImpl = NoTrianglePropagator;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        if context.graph(self.graph).is_directed() {
            return Err(ConstraintOperationError::InvalidParameter(
                "triangle-freeness is only defined on undirected graphs",
            ));
        }

        context.register_graph(self.graph, GraphEvents::ARC_ENFORCED, LocalId::from(0));
        let enforced_edges = context.graph_delta_monitor(self.graph);

        Ok(NoTrianglePropagator {
            graph: self.graph,
            enforced_edges,
        })
    }
}

/// For every kernel edge `{a, b}` and third node `c`, removes `{b, c}` when `{a, c}` is in the
/// kernel and `{a, c}` when `{b, c}` is. Loops never take part in a triangle.
#[derive(Clone, Debug)]
pub struct NoTrianglePropagator {
    graph: GraphId,
    enforced_edges: GraphDeltaMonitor,
}

/// The edges which would close a triangle with the kernel edge `{first, second}`.
fn closing_edges(graph: &GraphDomain, first: usize, second: usize) -> Vec<(usize, usize)> {
    if first == second {
        return Vec::new();
    }

    let mut closing = Vec::new();
    for third in (0..graph.num_nodes()).filter(|&third| third != first && third != second) {
        if graph.is_arc_in_kernel(first, third) {
            closing.push((second, third));
        }
        if graph.is_arc_in_kernel(second, third) {
            closing.push((first, third));
        }
    }
    closing
}

fn remove_closing_edges(
    context: &mut PropagationContext,
    graph: GraphId,
    first: usize,
    second: usize,
) -> Result<(), EmptyDomain> {
    for (from, to) in closing_edges(context.graph(graph), first, second) {
        let _ = context.remove_arc(graph, from, to)?;
    }
    Ok(())
}

fn has_triangle(graph: &GraphDomain, in_graph: impl Fn(usize, usize) -> bool) -> bool {
    let num_nodes = graph.num_nodes();
    (0..num_nodes).any(|a| {
        (a + 1..num_nodes).filter(|&b| in_graph(a, b)).any(|b| {
            (b + 1..num_nodes).any(|c| in_graph(a, c) && in_graph(b, c))
        })
    })
}

impl Propagator for NoTrianglePropagator {
    fn name(&self) -> &str {
        "NoTriangle"
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        let kernel_edges = context
            .graph(self.graph)
            .arcs_with_state(Membership::Enforced)
            .collect::<Vec<_>>();
        for (first, second) in kernel_edges {
            remove_closing_edges(&mut context, self.graph, first, second)?;
        }

        self.enforced_edges.skip_to_end(&mut context);
        Ok(())
    }

    fn propagate(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        let graph = self.graph;
        self.enforced_edges.freeze(&context);
        self.enforced_edges.for_each(
            &mut context,
            GraphEvents::ARC_ENFORCED.events(),
            |context, delta| -> Result<(), EmptyDomain> {
                if let GraphDelta::ArcEnforced(first, second) = delta {
                    remove_closing_edges(context, graph, first, second)?;
                }
                Ok(())
            },
        )?;
        self.enforced_edges.unfreeze(&mut context);
        Ok(())
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        let graph = domains.graph(self.graph);

        if has_triangle(graph, |a, b| graph.is_arc_in_kernel(a, b)) {
            Entailment::False
        } else if !has_triangle(graph, |a, b| graph.is_arc_in_envelope(a, b)) {
            Entailment::True
        } else {
            Entailment::Undefined
        }
    }
}
