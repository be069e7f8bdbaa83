use std::vec::Drain;

use super::notifications::GraphEvent;
use super::variables::GraphId;
use super::EmptyDomain;
use crate::basic_types::Trail;
use crate::containers::KeyedVec;
use crate::cp_assert_moderate;

/// Whether a node or arc is forbidden, still open, or mandatory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Membership {
    /// Outside the envelope.
    Removed,
    /// In the envelope but not in the kernel.
    Undecided,
    /// In the kernel.
    Enforced,
}

/// A single change to a graph variable, as replayed by a graph delta monitor.
///
/// Arcs of undirected graphs are reported once, with the smaller endpoint first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphDelta {
    ArcEnforced(usize, usize),
    ArcRemoved(usize, usize),
    NodeEnforced(usize),
    NodeRemoved(usize),
}

impl GraphDelta {
    pub fn event(&self) -> GraphEvent {
        match self {
            GraphDelta::ArcEnforced(_, _) => GraphEvent::ArcEnforced,
            GraphDelta::ArcRemoved(_, _) => GraphEvent::ArcRemoved,
            GraphDelta::NodeEnforced(_) => GraphEvent::NodeEnforced,
            GraphDelta::NodeRemoved(_) => GraphEvent::NodeRemoved,
        }
    }
}

/// The kernel and envelope of one graph variable over the nodes `0..num_nodes`.
#[derive(Clone, Debug)]
pub struct GraphDomain {
    num_nodes: usize,
    directed: bool,
    nodes: Vec<Membership>,
    /// Row-major adjacency matrix; undirected graphs keep both directions in sync.
    arcs: Vec<Membership>,
    delta: Vec<GraphDelta>,
}

impl GraphDomain {
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn node_state(&self, node: usize) -> Membership {
        self.nodes[node]
    }

    pub fn arc_state(&self, from: usize, to: usize) -> Membership {
        self.arcs[from * self.num_nodes + to]
    }

    pub fn is_node_in_kernel(&self, node: usize) -> bool {
        self.node_state(node) == Membership::Enforced
    }

    pub fn is_node_in_envelope(&self, node: usize) -> bool {
        self.node_state(node) != Membership::Removed
    }

    pub fn is_arc_in_kernel(&self, from: usize, to: usize) -> bool {
        self.arc_state(from, to) == Membership::Enforced
    }

    pub fn is_arc_in_envelope(&self, from: usize, to: usize) -> bool {
        self.arc_state(from, to) != Membership::Removed
    }

    /// The successors of `node` in the envelope (the neighbours, for undirected graphs).
    pub fn envelope_successors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_nodes).filter(move |&to| self.is_arc_in_envelope(node, to))
    }

    pub fn kernel_successors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_nodes).filter(move |&to| self.is_arc_in_kernel(node, to))
    }

    pub fn envelope_predecessors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_nodes).filter(move |&from| self.is_arc_in_envelope(from, node))
    }

    pub fn kernel_predecessors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_nodes).filter(move |&from| self.is_arc_in_kernel(from, node))
    }

    /// Every arc in the given state, once per undirected edge.
    pub fn arcs_with_state(&self, state: Membership) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.num_nodes)
            .flat_map(move |from| {
                let first = if self.directed { 0 } else { from };
                (first..self.num_nodes).map(move |to| (from, to))
            })
            .filter(move |&(from, to)| self.arc_state(from, to) == state)
    }

    pub fn nodes_with_state(&self, state: Membership) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_nodes).filter(move |&node| self.nodes[node] == state)
    }

    /// Kernel and envelope coincide.
    pub fn is_instantiated(&self) -> bool {
        !self.nodes.contains(&Membership::Undecided) && !self.arcs.contains(&Membership::Undecided)
    }

    fn set_arc(&mut self, from: usize, to: usize, state: Membership) {
        self.arcs[from * self.num_nodes + to] = state;
        if !self.directed {
            self.arcs[to * self.num_nodes + from] = state;
        }
    }

    fn normalise(&self, from: usize, to: usize) -> (usize, usize) {
        if self.directed {
            (from, to)
        } else {
            (from.min(to), from.max(to))
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum GraphChange {
    Node {
        graph: GraphId,
        node: usize,
        old_state: Membership,
    },
    Arc {
        graph: GraphId,
        from: usize,
        to: usize,
        old_state: Membership,
    },
    Delta {
        graph: GraphId,
    },
}

/// The store of graph variables.
///
/// Nodes and arcs only move from [`Membership::Undecided`] to one of the decided states, except
/// when synchronising to an earlier checkpoint. Enforcing an arc enforces its endpoints and
/// removing a node removes its incident arcs, so the kernel is always a subgraph of the envelope.
#[derive(Clone, Debug, Default)]
pub struct GraphAssignments {
    graphs: KeyedVec<GraphId, GraphDomain>,
    trail: Trail<GraphChange>,
    events: Vec<(GraphEvent, GraphId)>,
}

impl GraphAssignments {
    /// Creates a graph whose envelope is the complete graph (with loops) over `num_nodes` nodes
    /// and whose kernel is empty.
    pub fn grow(&mut self, num_nodes: usize, directed: bool) -> GraphId {
        self.graphs.push(GraphDomain {
            num_nodes,
            directed,
            nodes: vec![Membership::Undecided; num_nodes],
            arcs: vec![Membership::Undecided; num_nodes * num_nodes],
            delta: Vec::new(),
        })
    }

    /// Creates a graph whose envelope contains exactly the given arcs.
    pub fn grow_with_envelope(
        &mut self,
        num_nodes: usize,
        directed: bool,
        envelope_arcs: impl IntoIterator<Item = (usize, usize)>,
    ) -> GraphId {
        let mut domain = GraphDomain {
            num_nodes,
            directed,
            nodes: vec![Membership::Undecided; num_nodes],
            arcs: vec![Membership::Removed; num_nodes * num_nodes],
            delta: Vec::new(),
        };
        for (from, to) in envelope_arcs {
            domain.set_arc(from, to, Membership::Undecided);
        }
        self.graphs.push(domain)
    }

    pub fn graph(&self, graph: GraphId) -> &GraphDomain {
        &self.graphs[graph]
    }

    pub fn num_graphs(&self) -> usize {
        self.graphs.len()
    }

    pub fn enforce_node(&mut self, graph: GraphId, node: usize) -> Result<bool, EmptyDomain> {
        match self.graphs[graph].nodes[node] {
            Membership::Enforced => Ok(false),
            Membership::Removed => Err(EmptyDomain::graph(graph)),
            Membership::Undecided => {
                self.set_node(graph, node, Membership::Enforced);
                self.record(graph, GraphDelta::NodeEnforced(node));
                Ok(true)
            }
        }
    }

    /// Removes the node and every arc incident to it from the envelope.
    pub fn remove_node(&mut self, graph: GraphId, node: usize) -> Result<bool, EmptyDomain> {
        match self.graphs[graph].nodes[node] {
            Membership::Removed => Ok(false),
            Membership::Enforced => Err(EmptyDomain::graph(graph)),
            Membership::Undecided => {
                for other in 0..self.graphs[graph].num_nodes {
                    let _ = self.remove_arc(graph, node, other)?;
                    if self.graphs[graph].directed {
                        let _ = self.remove_arc(graph, other, node)?;
                    }
                }
                self.set_node(graph, node, Membership::Removed);
                self.record(graph, GraphDelta::NodeRemoved(node));
                Ok(true)
            }
        }
    }

    /// Moves the arc into the kernel, together with both of its endpoints.
    pub fn enforce_arc(
        &mut self,
        graph: GraphId,
        from: usize,
        to: usize,
    ) -> Result<bool, EmptyDomain> {
        match self.graphs[graph].arc_state(from, to) {
            Membership::Enforced => Ok(false),
            Membership::Removed => Err(EmptyDomain::graph(graph)),
            Membership::Undecided => {
                let _ = self.enforce_node(graph, from)?;
                let _ = self.enforce_node(graph, to)?;
                self.set_arc(graph, from, to, Membership::Enforced);
                let (from, to) = self.graphs[graph].normalise(from, to);
                self.record(graph, GraphDelta::ArcEnforced(from, to));
                Ok(true)
            }
        }
    }

    pub fn remove_arc(
        &mut self,
        graph: GraphId,
        from: usize,
        to: usize,
    ) -> Result<bool, EmptyDomain> {
        match self.graphs[graph].arc_state(from, to) {
            Membership::Removed => Ok(false),
            Membership::Enforced => Err(EmptyDomain::graph(graph)),
            Membership::Undecided => {
                self.set_arc(graph, from, to, Membership::Removed);
                let (from, to) = self.graphs[graph].normalise(from, to);
                self.record(graph, GraphDelta::ArcRemoved(from, to));
                Ok(true)
            }
        }
    }

    pub fn delta_length(&self, graph: GraphId) -> usize {
        self.graphs[graph].delta.len()
    }

    pub fn delta_entry(&self, graph: GraphId, index: usize) -> GraphDelta {
        self.graphs[graph].delta[index]
    }

    fn set_node(&mut self, graph: GraphId, node: usize, state: Membership) {
        let old_state = self.graphs[graph].nodes[node];
        self.trail.push(GraphChange::Node {
            graph,
            node,
            old_state,
        });
        self.graphs[graph].nodes[node] = state;
    }

    fn set_arc(&mut self, graph: GraphId, from: usize, to: usize, state: Membership) {
        let old_state = self.graphs[graph].arc_state(from, to);
        self.trail.push(GraphChange::Arc {
            graph,
            from,
            to,
            old_state,
        });
        self.graphs[graph].set_arc(from, to, state);
    }

    fn record(&mut self, graph: GraphId, delta: GraphDelta) {
        self.graphs[graph].delta.push(delta);
        self.trail.push(GraphChange::Delta { graph });
        self.events.push((delta.event(), graph));
    }

    pub fn new_checkpoint(&mut self) {
        self.trail.new_checkpoint()
    }

    pub fn get_checkpoint(&self) -> usize {
        self.trail.get_checkpoint()
    }

    pub fn synchronise(&mut self, new_checkpoint: usize) {
        for change in self.trail.synchronise(new_checkpoint) {
            match change {
                GraphChange::Node {
                    graph,
                    node,
                    old_state,
                } => self.graphs[graph].nodes[node] = old_state,
                GraphChange::Arc {
                    graph,
                    from,
                    to,
                    old_state,
                } => self.graphs[graph].set_arc(from, to, old_state),
                GraphChange::Delta { graph } => {
                    let popped = self.graphs[graph].delta.pop();
                    cp_assert_moderate!(popped.is_some());
                }
            }
        }
        self.events.clear();
    }

    pub fn drain_graph_events(&mut self) -> Drain<'_, (GraphEvent, GraphId)> {
        self.events.drain(..)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforcing_an_arc_enforces_its_endpoints() {
        let mut graphs = GraphAssignments::default();
        let graph = graphs.grow(3, true);

        assert_eq!(Ok(true), graphs.enforce_arc(graph, 0, 2));

        let domain = graphs.graph(graph);
        assert!(domain.is_node_in_kernel(0));
        assert!(domain.is_node_in_kernel(2));
        assert!(!domain.is_node_in_kernel(1));
        assert!(!domain.is_arc_in_kernel(2, 0));
        assert_eq!(
            vec![GraphEvent::NodeEnforced, GraphEvent::NodeEnforced, GraphEvent::ArcEnforced],
            graphs
                .drain_graph_events()
                .map(|(event, _)| event)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn removing_a_node_removes_its_arcs() {
        let mut graphs = GraphAssignments::default();
        let graph = graphs.grow(3, true);

        let _ = graphs.remove_node(graph, 1);

        let domain = graphs.graph(graph);
        assert!(!domain.is_arc_in_envelope(0, 1));
        assert!(!domain.is_arc_in_envelope(1, 2));
        assert!(!domain.is_arc_in_envelope(1, 1));
        assert!(domain.is_arc_in_envelope(0, 2));
    }

    #[test]
    fn contradicting_decided_elements_is_an_empty_domain() {
        let mut graphs = GraphAssignments::default();
        let graph = graphs.grow(2, true);
        let _ = graphs.enforce_arc(graph, 0, 1);
        let _ = graphs.remove_arc(graph, 1, 0);

        assert!(graphs.remove_arc(graph, 0, 1).is_err());
        assert!(graphs.enforce_arc(graph, 1, 0).is_err());
        assert!(graphs.remove_node(graph, 0).is_err());
    }

    #[test]
    fn undirected_arcs_are_symmetric() {
        let mut graphs = GraphAssignments::default();
        let graph = graphs.grow(3, false);

        let _ = graphs.enforce_arc(graph, 2, 0);

        assert!(graphs.graph(graph).is_arc_in_kernel(0, 2));
        assert_eq!(
            GraphDelta::ArcEnforced(0, 2),
            graphs.delta_entry(graph, graphs.delta_length(graph) - 1)
        );
    }

    #[test]
    fn synchronise_restores_states_and_delta() {
        let mut graphs = GraphAssignments::default();
        let graph = graphs.grow_with_envelope(3, true, [(0, 1), (1, 2)]);

        graphs.new_checkpoint();
        let _ = graphs.enforce_arc(graph, 0, 1);
        let _ = graphs.remove_arc(graph, 1, 2);
        graphs.synchronise(0);

        let domain = graphs.graph(graph);
        assert_eq!(Membership::Undecided, domain.arc_state(0, 1));
        assert_eq!(Membership::Undecided, domain.arc_state(1, 2));
        assert_eq!(Membership::Removed, domain.arc_state(2, 0));
        assert_eq!(Membership::Undecided, domain.node_state(0));
        assert_eq!(0, graphs.delta_length(graph));
    }
}
