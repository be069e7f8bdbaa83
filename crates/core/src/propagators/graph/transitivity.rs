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
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::ReadDomains;

/// The [`PropagatorConstructor`] for the [`TransitivityPropagator`]: whenever `(i, j)` and
/// `(j, k)` are in the graph, so is `(i, k)`. Loops are ignored.
#[derive(Clone, Debug)]
pub struct TransitivityArgs {
    pub graph: GraphId,
}

impl PropagatorConstructor for TransitivityArgs {
    type PropagatorImpl = TransitivityPropagator;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        context.register_graph(self.graph, GraphEvents::ARCS, LocalId::from(0));
        let directed = context.graph(self.graph).is_directed();
        let arc_changes = context.graph_delta_monitor(self.graph);

        Ok(TransitivityPropagator {
            graph: self.graph,
            directed,
            arc_changes,
        })
    }
}

/// Propagates the three consequences of transitivity for distinct `i`, `j` and `k`:
/// - `(i, j)` and `(j, k)` in the kernel enforce `(i, k)`;
/// - `(i, j)` in the kernel and `(i, k)` removed remove `(j, k)`;
/// - `(j, k)` in the kernel and `(i, k)` removed remove `(i, j)`.
///
/// Every enforced and removed arc is replayed through the delta monitor until no new changes
/// are recorded, so the closure is complete when the propagator returns.
#[derive(Clone, Debug)]
pub struct TransitivityPropagator {
    graph: GraphId,
    directed: bool,
    arc_changes: GraphDeltaMonitor,
}

fn orientations(directed: bool, from: usize, to: usize) -> impl Iterator<Item = (usize, usize)> {
    let reverse = (!directed).then_some((to, from));
    std::iter::once((from, to)).chain(reverse)
}

fn process(
    context: &mut PropagationContext,
    graph: GraphId,
    directed: bool,
    delta: GraphDelta,
) -> Result<bool, EmptyDomain> {
    let mut changed = false;
    match delta {
        GraphDelta::ArcEnforced(from, to) => {
            for (from, to) in orientations(directed, from, to) {
                changed |= arc_enforced(context, graph, from, to)?;
            }
        }
        GraphDelta::ArcRemoved(from, to) => {
            for (from, to) in orientations(directed, from, to) {
                changed |= arc_removed(context, graph, from, to)?;
            }
        }
        GraphDelta::NodeEnforced(_) | GraphDelta::NodeRemoved(_) => {}
    }
    Ok(changed)
}

fn arc_enforced(
    context: &mut PropagationContext,
    graph: GraphId,
    from: usize,
    to: usize,
) -> Result<bool, EmptyDomain> {
    if from == to {
        return Ok(false);
    }

    let domain = context.graph(graph);
    let mut to_enforce = Vec::new();
    let mut to_remove = Vec::new();
    for other in (0..domain.num_nodes()).filter(|&other| other != from && other != to) {
        if domain.is_arc_in_kernel(to, other) {
            to_enforce.push((from, other));
        }
        if domain.is_arc_in_kernel(other, from) {
            to_enforce.push((other, to));
        }
        if !domain.is_arc_in_envelope(from, other) {
            to_remove.push((to, other));
        }
        if !domain.is_arc_in_envelope(other, to) {
            to_remove.push((other, from));
        }
    }

    apply(context, graph, to_enforce, to_remove)
}

fn arc_removed(
    context: &mut PropagationContext,
    graph: GraphId,
    from: usize,
    to: usize,
) -> Result<bool, EmptyDomain> {
    if from == to {
        return Ok(false);
    }

    let domain = context.graph(graph);
    let mut to_remove = Vec::new();
    for middle in (0..domain.num_nodes()).filter(|&middle| middle != from && middle != to) {
        if domain.is_arc_in_kernel(from, middle) {
            to_remove.push((middle, to));
        }
        if domain.is_arc_in_kernel(middle, to) {
            to_remove.push((from, middle));
        }
    }

    apply(context, graph, Vec::new(), to_remove)
}

fn apply(
    context: &mut PropagationContext,
    graph: GraphId,
    to_enforce: Vec<(usize, usize)>,
    to_remove: Vec<(usize, usize)>,
) -> Result<bool, EmptyDomain> {
    let mut changed = false;
    for (from, to) in to_enforce {
        changed |= context.enforce_arc(graph, from, to)?;
    }
    for (from, to) in to_remove {
        changed |= context.remove_arc(graph, from, to)?;
    }
    Ok(changed)
}

impl Propagator for TransitivityPropagator {
    fn name(&self) -> &str {
        "Transitivity"
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        loop {
            let domain = context.graph(self.graph);
            let changes = domain
                .arcs_with_state(Membership::Enforced)
                .map(|(from, to)| GraphDelta::ArcEnforced(from, to))
                .chain(
                    domain
                        .arcs_with_state(Membership::Removed)
                        .map(|(from, to)| GraphDelta::ArcRemoved(from, to)),
                )
                .collect::<Vec<_>>();

            let mut changed = false;
            for delta in changes {
                changed |= process(&mut context, self.graph, self.directed, delta)?;
            }
            if !changed {
                break;
            }
        }

        self.arc_changes.skip_to_end(&mut context);
        Ok(())
    }

    fn propagate(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        let (graph, directed) = (self.graph, self.directed);
        while self.arc_changes.has_unprocessed(&context) {
            self.arc_changes.freeze(&context);
            self.arc_changes.for_each(
                &mut context,
                GraphEvents::ARCS.events(),
                |context, delta| -> Result<(), EmptyDomain> {
                    let _ = process(context, graph, directed, delta)?;
                    Ok(())
                },
            )?;
            self.arc_changes.unfreeze(&mut context);
        }
        Ok(())
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        let graph = domains.graph(self.graph);
        let num_nodes = graph.num_nodes();

        for (first, second) in graph.arcs_with_state(Membership::Enforced) {
            for (from, middle) in orientations(self.directed, first, second) {
                if from == middle {
                    continue;
                }
                let violated = (0..num_nodes).any(|to| {
                    to != middle
                        && to != from
                        && graph.is_arc_in_kernel(middle, to)
                        && !graph.is_arc_in_envelope(from, to)
                });
                if violated {
                    return Entailment::False;
                }
            }
        }

        if graph.is_instantiated() {
            Entailment::True
        } else {
            Entailment::Undefined
        }
    }
}
