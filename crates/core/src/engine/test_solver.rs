//! A thin wrapper around [`State`] for unit-testing propagators.

use super::variables::DomainId;
use super::variables::GraphId;
use super::variables::IntegerVariable;
use super::Contradiction;
use super::EmptyDomain;
use super::GraphDomain;
use super::State;
use super::TrailedInteger;
use crate::basic_types::ConstraintOperationError;
use crate::propagation::Entailment;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorId;

#[derive(Debug, Default)]
pub(crate) struct TestSolver {
    pub(crate) state: State,
}

impl TestSolver {
    pub(crate) fn new_variable(&mut self, lb: i32, ub: i32) -> DomainId {
        self.state.new_variable(lb, ub)
    }

    pub(crate) fn new_sparse_variable(&mut self, values: Vec<i32>) -> DomainId {
        self.state.new_sparse_variable(&values)
    }

    pub(crate) fn new_graph(&mut self, num_nodes: usize, directed: bool) -> GraphId {
        self.state.new_graph(num_nodes, directed)
    }

    pub(crate) fn new_graph_with_envelope(
        &mut self,
        num_nodes: usize,
        directed: bool,
        envelope_arcs: impl IntoIterator<Item = (usize, usize)>,
    ) -> GraphId {
        self.state
            .new_graph_with_envelope(num_nodes, directed, envelope_arcs)
    }

    /// Posts the propagator, which runs its full propagation once.
    pub(crate) fn new_propagator<Constructor: PropagatorConstructor>(
        &mut self,
        constructor: Constructor,
    ) -> Result<PropagatorId, ConstraintOperationError> {
        self.state.add_propagator(constructor)
    }

    pub(crate) fn propagator<P: Propagator>(&self, propagator: PropagatorId) -> &P {
        self.state
            .get_propagator::<P>(propagator)
            .expect("propagator has a different type")
    }

    pub(crate) fn contains<Var: IntegerVariable>(&self, var: Var, value: i32) -> bool {
        self.state.contains(var, value)
    }

    pub(crate) fn has_holes<Var: IntegerVariable>(&self, var: Var) -> bool {
        let width = self.upper_bound(var.clone()) as i64 - self.lower_bound(var.clone()) as i64 + 1;
        var.domain_size(&self.state.assignments) as i64 != width
    }

    pub(crate) fn read(&self, trailed_integer: TrailedInteger) -> i64 {
        self.state.trailed_values.read(trailed_integer)
    }

    pub(crate) fn lower_bound<Var: IntegerVariable>(&self, var: Var) -> i32 {
        self.state.lower_bound(var)
    }

    pub(crate) fn upper_bound<Var: IntegerVariable>(&self, var: Var) -> i32 {
        self.state.upper_bound(var)
    }

    pub(crate) fn domain<Var: IntegerVariable>(&self, var: Var) -> Vec<i32> {
        var.iterate_domain(&self.state.assignments).collect()
    }

    pub(crate) fn graph(&self, graph: GraphId) -> &GraphDomain {
        self.state.graph(graph)
    }

    pub(crate) fn assert_bounds<Var: IntegerVariable>(&self, var: Var, lb: i32, ub: i32) {
        let actual_lb = self.lower_bound(var.clone());
        let actual_ub = self.upper_bound(var.clone());

        assert_eq!(
            (lb, ub),
            (actual_lb, actual_ub),
            "the expected bounds [{lb}..{ub}] did not match the actual bounds [{actual_lb}..{actual_ub}] of {var:?}"
        );
    }

    pub(crate) fn set_lower_bound<Var: IntegerVariable>(
        &mut self,
        var: Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        self.state.set_lower_bound(var, value)
    }

    pub(crate) fn set_upper_bound<Var: IntegerVariable>(
        &mut self,
        var: Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        self.state.set_upper_bound(var, value)
    }

    pub(crate) fn remove<Var: IntegerVariable>(
        &mut self,
        var: Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        self.state.remove(var, value)
    }

    pub(crate) fn fix<Var: IntegerVariable>(
        &mut self,
        var: Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        self.state.fix(var, value)
    }

    pub(crate) fn enforce_arc(
        &mut self,
        graph: GraphId,
        from: usize,
        to: usize,
    ) -> Result<bool, EmptyDomain> {
        self.state.enforce_arc(graph, from, to)
    }

    pub(crate) fn remove_arc(
        &mut self,
        graph: GraphId,
        from: usize,
        to: usize,
    ) -> Result<bool, EmptyDomain> {
        self.state.remove_arc(graph, from, to)
    }

    pub(crate) fn remove_node(&mut self, graph: GraphId, node: usize) -> Result<bool, EmptyDomain> {
        self.state.remove_node(graph, node)
    }

    /// Notifies the watchers of the pending events and calls the given propagator once.
    pub(crate) fn propagate(&mut self, propagator: PropagatorId) -> Result<(), Contradiction> {
        self.state.notify_propagators(None);
        self.state.call_propagator(propagator, false)
    }

    pub(crate) fn propagate_until_fixed_point(&mut self) -> Result<(), Contradiction> {
        self.state.propagate_to_fixed_point()
    }

    pub(crate) fn is_entailed(&mut self, propagator: PropagatorId) -> Entailment {
        self.state.is_entailed(propagator)
    }

    pub(crate) fn is_passive(&self, propagator: PropagatorId) -> bool {
        self.state.is_passive(propagator)
    }

    pub(crate) fn new_checkpoint(&mut self) {
        self.state.new_checkpoint();
    }

    pub(crate) fn synchronise(&mut self, level: usize) {
        self.state.restore_to(level);
    }
}
