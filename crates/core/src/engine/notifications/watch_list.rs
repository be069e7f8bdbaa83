use enumset::EnumSet;

use super::DomainEvent;
use super::GraphEvent;
use crate::containers::KeyedVec;
use crate::engine::variables::DomainId;
use crate::engine::variables::GraphId;
use crate::propagation::PropagatorVarId;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Watcher<Event: enumset::EnumSetType> {
    pub(crate) propagator_var: PropagatorVarId,
    pub(crate) events: EnumSet<Event>,
}

/// The watch lists of all variables.
#[derive(Clone, Debug, Default)]
pub(crate) struct NotificationEngine {
    domain_watchers: KeyedVec<DomainId, Vec<Watcher<DomainEvent>>>,
    graph_watchers: KeyedVec<GraphId, Vec<Watcher<GraphEvent>>>,
}

impl NotificationEngine {
    pub(crate) fn grow_domains(&mut self, domain: DomainId) {
        self.domain_watchers.accomodate(domain, Vec::new());
    }

    pub(crate) fn grow_graphs(&mut self, graph: GraphId) {
        self.graph_watchers.accomodate(graph, Vec::new());
    }

    pub(crate) fn watch_domain(
        &mut self,
        domain: DomainId,
        propagator_var: PropagatorVarId,
        events: EnumSet<DomainEvent>,
    ) {
        self.domain_watchers.accomodate(domain, Vec::new());
        let watchers = &mut self.domain_watchers[domain];

        // Registering the same local id twice merges the conditions.
        match watchers
            .iter_mut()
            .find(|watcher| watcher.propagator_var == propagator_var)
        {
            Some(watcher) => watcher.events |= events,
            None => watchers.push(Watcher {
                propagator_var,
                events,
            }),
        }
    }

    pub(crate) fn watch_graph(
        &mut self,
        graph: GraphId,
        propagator_var: PropagatorVarId,
        events: EnumSet<GraphEvent>,
    ) {
        self.graph_watchers.accomodate(graph, Vec::new());
        let watchers = &mut self.graph_watchers[graph];

        match watchers
            .iter_mut()
            .find(|watcher| watcher.propagator_var == propagator_var)
        {
            Some(watcher) => watcher.events |= events,
            None => watchers.push(Watcher {
                propagator_var,
                events,
            }),
        }
    }

    /// The watchers which must be notified of `event` on `domain`, i.e. whose conditions
    /// intersect the events implied by it.
    pub(crate) fn domain_watchers(
        &self,
        domain: DomainId,
        event: DomainEvent,
    ) -> impl Iterator<Item = PropagatorVarId> + '_ {
        let implied = event.implied_events();
        self.domain_watchers
            .get(domain)
            .into_iter()
            .flatten()
            .filter(move |watcher| !watcher.events.is_disjoint(implied))
            .map(|watcher| watcher.propagator_var)
    }

    pub(crate) fn graph_watchers(
        &self,
        graph: GraphId,
        event: GraphEvent,
    ) -> impl Iterator<Item = PropagatorVarId> + '_ {
        self.graph_watchers
            .get(graph)
            .into_iter()
            .flatten()
            .filter(move |watcher| watcher.events.contains(event))
            .map(|watcher| watcher.propagator_var)
    }
}

/// Registers one propagator variable in the watch lists of the domains it views.
#[derive(Debug)]
pub struct Watchers<'a> {
    propagator_var: PropagatorVarId,
    notification_engine: &'a mut NotificationEngine,
}

impl<'a> Watchers<'a> {
    pub(crate) fn new(
        propagator_var: PropagatorVarId,
        notification_engine: &'a mut NotificationEngine,
    ) -> Self {
        Watchers {
            propagator_var,
            notification_engine,
        }
    }

    pub fn watch_all(&mut self, domain: DomainId, events: EnumSet<DomainEvent>) {
        self.notification_engine
            .watch_domain(domain, self.propagator_var, events);
    }
}
