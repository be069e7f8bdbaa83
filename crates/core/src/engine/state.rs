use log::debug;
use log::trace;
use thiserror::Error;

use super::notifications::NotificationEngine;
use super::propagator_queue::PropagatorQueue;
use super::variables::DomainId;
use super::variables::GraphId;
use super::variables::IntegerVariable;
use super::Assignments;
use super::DomainEvent;
use super::EmptyDomain;
use super::GraphAssignments;
use super::GraphDomain;
use super::GraphEvent;
use super::TrailedInteger;
use super::TrailedValues;
use super::VariableId;
use crate::basic_types::ConstraintOperationError;
use crate::basic_types::Inconsistency;
use crate::constraints::Constraint;
use crate::containers::KeyedVec;
use crate::cp_assert_eq_simple;
use crate::cp_assert_simple;
use crate::create_statistics_struct;
use crate::propagation::Domains;
use crate::propagation::EnqueueDecision;
use crate::propagation::Entailment;
use crate::propagation::NotificationContext;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::PropagatorId;
use crate::statistics::Statistic;
use crate::statistics::StatisticLogger;

create_statistics_struct!(
    /// Counters of the fixpoint loop.
    StateStatistics {
        num_propagator_calls: u64,
        num_conflicts: u64,
        num_notifications: u64,
    }
);

/// A propagation round stopped because a propagator found the current domains infeasible.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Contradiction {
    #[error("propagator {name} ({propagator}) emptied the domain of {variable}")]
    EmptyDomain {
        propagator: PropagatorId,
        name: String,
        variable: VariableId,
    },
    #[error("propagator {name} ({propagator}) detected a conflict: {reason}")]
    Conflict {
        propagator: PropagatorId,
        name: String,
        reason: String,
    },
}

impl Contradiction {
    fn new(propagator: PropagatorId, name: &str, inconsistency: Inconsistency) -> Self {
        match inconsistency {
            Inconsistency::EmptyDomain(EmptyDomain { variable }) => Contradiction::EmptyDomain {
                propagator,
                name: name.to_owned(),
                variable,
            },
            Inconsistency::Conflict(conflict) => Contradiction::Conflict {
                propagator,
                name: name.to_owned(),
                reason: conflict.description().to_owned(),
            },
        }
    }

    pub fn propagator(&self) -> PropagatorId {
        match self {
            Contradiction::EmptyDomain { propagator, .. }
            | Contradiction::Conflict { propagator, .. } => *propagator,
        }
    }
}

/// The fixpoint driver: owns the domain stores, the reversible memory and the propagators, and
/// runs enqueued propagators until none of them narrows a domain any more.
///
/// Checkpoints are numbered levels and are meant to be created at a fixpoint.
/// [`State::restore_to`] returns to a level, undoing every change made after the next checkpoint
/// was created; it also empties the queue and lets each propagator synchronise.
#[derive(Default)]
pub struct State {
    pub(crate) assignments: Assignments,
    pub(crate) graphs: GraphAssignments,
    pub(crate) trailed_values: TrailedValues,
    pub(crate) notification_engine: NotificationEngine,
    propagators: KeyedVec<PropagatorId, Box<dyn Propagator>>,
    passive_flags: KeyedVec<PropagatorId, TrailedInteger>,
    propagator_queue: PropagatorQueue,
    statistics: StateStatistics,
    domain_events: Vec<(DomainEvent, DomainId)>,
    graph_events: Vec<(GraphEvent, GraphId)>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("assignments", &self.assignments)
            .field("graphs", &self.graphs)
            .field("num_propagators", &self.propagators.len())
            .field("statistics", &self.statistics)
            .finish_non_exhaustive()
    }
}

impl State {
    pub fn new_variable(&mut self, lower_bound: i32, upper_bound: i32) -> DomainId {
        let domain = self.assignments.grow(lower_bound, upper_bound);
        self.notification_engine.grow_domains(domain);
        domain
    }

    pub fn new_sparse_variable(&mut self, values: &[i32]) -> DomainId {
        let domain = self.assignments.create_sparse(values);
        self.notification_engine.grow_domains(domain);
        domain
    }

    /// A graph over `num_nodes` nodes whose envelope is complete and whose kernel is empty.
    pub fn new_graph(&mut self, num_nodes: usize, directed: bool) -> GraphId {
        let graph = self.graphs.grow(num_nodes, directed);
        self.notification_engine.grow_graphs(graph);
        graph
    }

    pub fn new_graph_with_envelope(
        &mut self,
        num_nodes: usize,
        directed: bool,
        envelope_arcs: impl IntoIterator<Item = (usize, usize)>,
    ) -> GraphId {
        let graph = self
            .graphs
            .grow_with_envelope(num_nodes, directed, envelope_arcs);
        self.notification_engine.grow_graphs(graph);
        graph
    }

    pub fn lower_bound<Var: IntegerVariable>(&self, var: Var) -> i32 {
        var.lower_bound(&self.assignments)
    }

    pub fn upper_bound<Var: IntegerVariable>(&self, var: Var) -> i32 {
        var.upper_bound(&self.assignments)
    }

    pub fn contains<Var: IntegerVariable>(&self, var: Var, value: i32) -> bool {
        var.contains(&self.assignments, value)
    }

    pub fn graph(&self, graph: GraphId) -> &GraphDomain {
        self.graphs.graph(graph)
    }

    pub fn set_lower_bound<Var: IntegerVariable>(
        &mut self,
        var: Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        var.set_lower_bound(&mut self.assignments, value)
    }

    pub fn set_upper_bound<Var: IntegerVariable>(
        &mut self,
        var: Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        var.set_upper_bound(&mut self.assignments, value)
    }

    pub fn remove<Var: IntegerVariable>(
        &mut self,
        var: Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        var.remove(&mut self.assignments, value)
    }

    pub fn fix<Var: IntegerVariable>(&mut self, var: Var, value: i32) -> Result<bool, EmptyDomain> {
        var.fix(&mut self.assignments, value)
    }

    pub fn enforce_arc(
        &mut self,
        graph: GraphId,
        from: usize,
        to: usize,
    ) -> Result<bool, EmptyDomain> {
        self.graphs.enforce_arc(graph, from, to)
    }

    pub fn remove_arc(
        &mut self,
        graph: GraphId,
        from: usize,
        to: usize,
    ) -> Result<bool, EmptyDomain> {
        self.graphs.remove_arc(graph, from, to)
    }

    pub fn enforce_node(&mut self, graph: GraphId, node: usize) -> Result<bool, EmptyDomain> {
        self.graphs.enforce_node(graph, node)
    }

    pub fn remove_node(&mut self, graph: GraphId, node: usize) -> Result<bool, EmptyDomain> {
        self.graphs.remove_node(graph, node)
    }

    /// Creates the propagator and runs its full propagation once.
    ///
    /// When the initial propagation fails the domains are left as they were at the failure;
    /// restore to an earlier checkpoint to continue.
    pub fn add_propagator<Constructor: PropagatorConstructor>(
        &mut self,
        constructor: Constructor,
    ) -> Result<PropagatorId, ConstraintOperationError> {
        let propagator_id = PropagatorId(self.propagators.len() as u32);
        let propagator = constructor.create(PropagatorConstructorContext::new(propagator_id, self))?;

        let passive_flag = self.trailed_values.grow(0);
        let _ = self.passive_flags.push(passive_flag);
        let pushed_id = self.propagators.push(Box::new(propagator));
        cp_assert_eq_simple!(pushed_id, propagator_id);

        self.call_propagator(propagator_id, true).map_err(|contradiction| {
            debug!("posting failed: {contradiction}");
            ConstraintOperationError::InfeasiblePropagator
        })?;

        Ok(propagator_id)
    }

    /// Posts every propagator of `constraint`; see [`Constraint::post`].
    pub fn add_constraint(
        &mut self,
        constraint: impl Constraint,
    ) -> Result<(), ConstraintOperationError> {
        constraint.post(self)
    }

    pub fn num_propagators(&self) -> usize {
        self.propagators.len()
    }

    pub fn get_propagator<P: Propagator>(&self, propagator_id: PropagatorId) -> Option<&P> {
        self.propagators
            .get(propagator_id)
            .and_then(|propagator| propagator.downcast_ref::<P>())
    }

    pub fn is_passive(&self, propagator_id: PropagatorId) -> bool {
        self.trailed_values.read(self.passive_flags[propagator_id]) != 0
    }

    pub fn is_entailed(&mut self, propagator_id: PropagatorId) -> Entailment {
        let domains = Domains::new(&self.assignments, &self.graphs, &mut self.trailed_values);
        self.propagators[propagator_id].is_entailed(domains)
    }

    /// Calls enqueued propagators until the queue is empty or a propagator fails.
    pub fn propagate_to_fixed_point(&mut self) -> Result<(), Contradiction> {
        self.notify_propagators(None);

        while let Some(propagator_id) = self.propagator_queue.pop() {
            if let Err(contradiction) = self.call_propagator(propagator_id, false) {
                self.propagator_queue.clear();
                return Err(contradiction);
            }
        }

        Ok(())
    }

    /// Calls a single propagator, regardless of whether it is enqueued, and dispatches the events
    /// it caused.
    pub(crate) fn call_propagator(
        &mut self,
        propagator_id: PropagatorId,
        from_scratch: bool,
    ) -> Result<(), Contradiction> {
        if self.is_passive(propagator_id) {
            return Ok(());
        }
        self.statistics.num_propagator_calls += 1;

        let mut requested_repropagation = false;
        let context = PropagationContext::new(
            &mut self.trailed_values,
            &mut self.assignments,
            &mut self.graphs,
            propagator_id,
            self.passive_flags[propagator_id],
            &mut requested_repropagation,
        );
        let propagator = &mut self.propagators[propagator_id];
        trace!("calling {} ({propagator_id})", propagator.name());
        let result = if from_scratch {
            propagator.propagate_from_scratch(context)
        } else {
            propagator.propagate(context)
        };

        match result {
            Ok(()) => {
                self.notify_propagators(Some(propagator_id));
                if requested_repropagation && !self.is_passive(propagator_id) {
                    let priority = self.propagators[propagator_id].priority();
                    self.propagator_queue
                        .enqueue_propagator(propagator_id, priority);
                }
                Ok(())
            }
            Err(inconsistency) => {
                self.statistics.num_conflicts += 1;
                let contradiction = Contradiction::new(
                    propagator_id,
                    self.propagators[propagator_id].name(),
                    inconsistency,
                );
                debug!("{contradiction}");
                Err(contradiction)
            }
        }
    }

    /// Dispatches the pending events to the watchers. Propagators are notified of their own
    /// events but are not enqueued by them.
    pub(crate) fn notify_propagators(&mut self, source: Option<PropagatorId>) {
        let mut domain_events = std::mem::take(&mut self.domain_events);
        domain_events.extend(self.assignments.drain_domain_events());

        for &(event, domain) in domain_events.iter() {
            for watcher in self.notification_engine.domain_watchers(domain, event) {
                let propagator_id = watcher.propagator;
                if self.trailed_values.read(self.passive_flags[propagator_id]) != 0 {
                    continue;
                }
                self.statistics.num_notifications += 1;

                let context = NotificationContext::new(
                    &mut self.trailed_values,
                    &self.assignments,
                    &self.graphs,
                );
                let propagator = &mut self.propagators[propagator_id];
                let decision = propagator.notify(context, watcher.variable, event);

                if decision == EnqueueDecision::Enqueue && source != Some(propagator_id) {
                    self.propagator_queue
                        .enqueue_propagator(propagator_id, propagator.priority());
                }
            }
        }
        domain_events.clear();
        self.domain_events = domain_events;

        let mut graph_events = std::mem::take(&mut self.graph_events);
        graph_events.extend(self.graphs.drain_graph_events());

        for &(event, graph) in graph_events.iter() {
            for watcher in self.notification_engine.graph_watchers(graph, event) {
                let propagator_id = watcher.propagator;
                if self.trailed_values.read(self.passive_flags[propagator_id]) != 0 {
                    continue;
                }
                self.statistics.num_notifications += 1;

                let context = NotificationContext::new(
                    &mut self.trailed_values,
                    &self.assignments,
                    &self.graphs,
                );
                let propagator = &mut self.propagators[propagator_id];
                let decision = propagator.notify_graph(context, watcher.variable, event);

                if decision == EnqueueDecision::Enqueue && source != Some(propagator_id) {
                    self.propagator_queue
                        .enqueue_propagator(propagator_id, propagator.priority());
                }
            }
        }
        graph_events.clear();
        self.graph_events = graph_events;
    }

    /// Dispatches pending events and records a checkpoint in every store.
    pub fn new_checkpoint(&mut self) {
        self.notify_propagators(None);

        self.assignments.new_checkpoint();
        self.graphs.new_checkpoint();
        self.trailed_values.new_checkpoint();
    }

    pub fn get_checkpoint(&self) -> usize {
        self.assignments.get_checkpoint()
    }

    /// Returns to the level `checkpoint`, undoing every change made after checkpoint
    /// `checkpoint + 1` was created.
    pub fn restore_to(&mut self, checkpoint: usize) {
        cp_assert_simple!(checkpoint <= self.get_checkpoint());
        if checkpoint == self.get_checkpoint() {
            self.propagator_queue.clear();
            return;
        }

        self.assignments.synchronise(checkpoint);
        self.graphs.synchronise(checkpoint);
        self.trailed_values.synchronise(checkpoint);
        self.propagator_queue.clear();

        for propagator in self.propagators.iter_mut() {
            propagator.synchronise(Domains::new(
                &self.assignments,
                &self.graphs,
                &mut self.trailed_values,
            ));
        }
    }

    pub fn log_statistics(&self) {
        self.statistics.log(StatisticLogger::new(["engine"]));
        for (propagator_id, propagator) in self.propagators.keys().zip(self.propagators.iter()) {
            propagator.log_statistics(StatisticLogger::new([
                propagator.name().to_owned(),
                propagator_id.0.to_string(),
            ]));
        }
    }
}
