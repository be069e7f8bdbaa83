use super::Domains;
use super::HasAssignments;
use super::LocalId;
use super::Propagator;
use super::PropagatorId;
use super::PropagatorVarId;
use crate::basic_types::ConstraintOperationError;
use crate::engine::notifications::Watchers;
use crate::engine::variables::GraphId;
use crate::engine::variables::IntegerVariable;
use crate::engine::Assignments;
use crate::engine::DomainEvents;
use crate::engine::GraphAssignments;
use crate::engine::GraphDeltaMonitor;
use crate::engine::GraphEvents;
use crate::engine::IntDeltaMonitor;
use crate::engine::State;
use crate::engine::TrailedInteger;
use crate::engine::TrailedValues;

/// Creates a propagator: registers its propagation conditions, allocates its reversible state,
/// and validates its parameters.
pub trait PropagatorConstructor {
    type PropagatorImpl: Propagator;

    fn create(
        self,
        context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError>;
}

/// The hooks into the driver which are available while a propagator is constructed.
#[derive(Debug)]
pub struct PropagatorConstructorContext<'a> {
    state: &'a mut State,
    pub(crate) propagator_id: PropagatorId,
}

impl PropagatorConstructorContext<'_> {
    pub(crate) fn new(
        propagator_id: PropagatorId,
        state: &mut State,
    ) -> PropagatorConstructorContext<'_> {
        PropagatorConstructorContext {
            state,
            propagator_id,
        }
    }

    pub fn domains(&mut self) -> Domains<'_> {
        Domains::new(
            &self.state.assignments,
            &self.state.graphs,
            &mut self.state.trailed_values,
        )
    }

    /// Subscribes the propagator to the given events on `var`; they are reported with
    /// `local_id`.
    pub fn register(
        &mut self,
        var: impl IntegerVariable,
        domain_events: DomainEvents,
        local_id: LocalId,
    ) {
        let propagator_var = PropagatorVarId {
            propagator: self.propagator_id,
            variable: local_id,
        };

        let mut watchers = Watchers::new(propagator_var, &mut self.state.notification_engine);
        var.watch_all(&mut watchers, domain_events.events());
    }

    pub fn register_graph(&mut self, graph: GraphId, graph_events: GraphEvents, local_id: LocalId) {
        let propagator_var = PropagatorVarId {
            propagator: self.propagator_id,
            variable: local_id,
        };

        self.state
            .notification_engine
            .watch_graph(graph, propagator_var, graph_events.events());
    }

    pub fn new_trailed_integer(&mut self, initial_value: i64) -> TrailedInteger {
        self.state.trailed_values.grow(initial_value)
    }

    /// A monitor which replays the values removed from `var` from now on.
    pub fn int_delta_monitor<Var: IntegerVariable>(&mut self, var: Var) -> IntDeltaMonitor<Var> {
        let domain = var.domain_id();
        self.state.assignments.track_delta(domain);

        let current_length = self.state.assignments.delta_length(domain);
        let processed = self.state.trailed_values.grow(current_length as i64);
        IntDeltaMonitor::new(var, processed, current_length)
    }

    /// A monitor which replays the changes to `graph` from now on.
    pub fn graph_delta_monitor(&mut self, graph: GraphId) -> GraphDeltaMonitor {
        let current_length = self.state.graphs.delta_length(graph);
        let processed = self.state.trailed_values.grow(current_length as i64);
        GraphDeltaMonitor::new(graph, processed, current_length)
    }
}

impl HasAssignments for PropagatorConstructorContext<'_> {
    fn assignments(&self) -> &Assignments {
        &self.state.assignments
    }

    fn graphs(&self) -> &GraphAssignments {
        &self.state.graphs
    }

    fn trailed_values(&self) -> &TrailedValues {
        &self.state.trailed_values
    }

    fn trailed_values_mut(&mut self) -> &mut TrailedValues {
        &mut self.state.trailed_values
    }
}
