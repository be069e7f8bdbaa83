use crate::basic_types::ConstraintOperationError;
use crate::basic_types::PropagationStatusCP;
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

/// The elements of a graph which are counted by a [`GraphCountPropagator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountedElements {
    /// Arcs, or edges for undirected graphs, including loops.
    Arcs,
    /// Arcs from a node to itself.
    Loops,
    Nodes,
}

impl CountedElements {
    fn name(&self) -> &'static str {
        match self {
            CountedElements::Arcs => "NbArcs",
            CountedElements::Loops => "NbLoops",
            CountedElements::Nodes => "NbNodes",
        }
    }

    fn graph_events(&self) -> GraphEvents {
        match self {
            CountedElements::Arcs | CountedElements::Loops => GraphEvents::ARCS,
            CountedElements::Nodes => GraphEvents::NODES,
        }
    }

    fn with_state(&self, graph: &GraphDomain, state: Membership) -> Vec<(usize, usize)> {
        match self {
            CountedElements::Arcs => graph.arcs_with_state(state).collect(),
            CountedElements::Loops => (0..graph.num_nodes())
                .filter(|&node| graph.arc_state(node, node) == state)
                .map(|node| (node, node))
                .collect(),
            CountedElements::Nodes => graph
                .nodes_with_state(state)
                .map(|node| (node, node))
                .collect(),
        }
    }

    fn count(&self, graph: &GraphDomain, state: Membership) -> usize {
        self.with_state(graph, state).len()
    }
}

/// The [`PropagatorConstructor`] for `count` being the number of arcs in `graph`.
#[derive(Clone, Debug)]
pub struct NbArcsArgs<Var> {
    pub graph: GraphId,
    pub count: Var,
}

/// The [`PropagatorConstructor`] for `count` being the number of loops in `graph`.
#[derive(Clone, Debug)]
pub struct NbLoopsArgs<Var> {
    pub graph: GraphId,
    pub count: Var,
}

/// The [`PropagatorConstructor`] for `count` being the number of nodes in `graph`.
#[derive(Clone, Debug)]
pub struct NbNodesArgs<Var> {
    pub graph: GraphId,
    pub count: Var,
}

macro_rules! count_constructor {
    ($args:ident, $elements:expr) => {
        impl<Var: IntegerVariable + 'static> PropagatorConstructor for $args<Var> {
            type PropagatorImpl = GraphCountPropagator<Var>;

            fn create(
                self,
                context: PropagatorConstructorContext,
            ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
                Ok(GraphCountPropagator::new(
                    self.graph, self.count, $elements, context,
                ))
            }
        }
    };
}

count_constructor!(NbArcsArgs, CountedElements::Arcs);
count_constructor!(NbLoopsArgs, CountedElements::Loops);
count_constructor!(NbNodesArgs, CountedElements::Nodes);

/// Keeps `count` between the number of elements in the kernel and in the envelope. When the
/// count can only be the kernel size the undecided elements are removed; when it can only be
/// the envelope size they are enforced.
#[derive(Clone, Debug)]
pub struct GraphCountPropagator<Var> {
    graph: GraphId,
    count: Var,
    elements: CountedElements,
}

impl<Var: IntegerVariable> GraphCountPropagator<Var> {
    fn new(
        graph: GraphId,
        count: Var,
        elements: CountedElements,
        mut context: PropagatorConstructorContext,
    ) -> Self {
        context.register_graph(graph, elements.graph_events(), LocalId::from(0));
        context.register(count.clone(), DomainEvents::BOUNDS, LocalId::from(1));

        GraphCountPropagator {
            graph,
            count,
            elements,
        }
    }
}

impl<Var: IntegerVariable + 'static> Propagator for GraphCountPropagator<Var> {
    fn name(&self) -> &str {
        self.elements.name()
    }

    fn priority(&self) -> Priority {
        Priority::Low
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        let graph = context.graph(self.graph);
        let in_kernel = self.elements.count(graph, Membership::Enforced);
        let undecided = self.elements.with_state(graph, Membership::Undecided);
        let in_envelope = in_kernel + undecided.len();

        let _ = context.set_lower_bound(&self.count, clamp_to_i32(in_kernel as i64))?;
        let _ = context.set_upper_bound(&self.count, clamp_to_i32(in_envelope as i64))?;
        if undecided.is_empty() {
            return Ok(());
        }

        if context.upper_bound(&self.count) as i64 == in_kernel as i64 {
            for (from, to) in undecided {
                let _ = match self.elements {
                    CountedElements::Arcs | CountedElements::Loops => {
                        context.remove_arc(self.graph, from, to)?
                    }
                    CountedElements::Nodes => context.remove_node(self.graph, from)?,
                };
            }
        } else if context.lower_bound(&self.count) as i64 == in_envelope as i64 {
            for (from, to) in undecided {
                let _ = match self.elements {
                    CountedElements::Arcs | CountedElements::Loops => {
                        context.enforce_arc(self.graph, from, to)?
                    }
                    CountedElements::Nodes => context.enforce_node(self.graph, from)?,
                };
            }
        }

        Ok(())
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        let graph = domains.graph(self.graph);
        let in_kernel = self.elements.count(graph, Membership::Enforced) as i64;
        let in_envelope = in_kernel + self.elements.count(graph, Membership::Undecided) as i64;

        if in_envelope < domains.lower_bound(&self.count) as i64
            || in_kernel > domains.upper_bound(&self.count) as i64
        {
            Entailment::False
        } else if in_kernel == in_envelope && domains.is_fixed(&self.count) {
            Entailment::True
        } else {
            Entailment::Undefined
        }
    }
}
