use enumset::EnumSet;

use super::GraphEvent;
use crate::engine::graph_assignments::GraphDelta;
use crate::engine::variables::GraphId;
use crate::engine::variables::IntegerVariable;
use crate::engine::TrailedInteger;
use crate::propagation::HasAssignments;

/// Replays the values removed from an integer variable since the propagator last consumed them.
///
/// The protocol is [`freeze`](IntDeltaMonitor::freeze), then
/// [`for_each`](IntDeltaMonitor::for_each) any number of times, then
/// [`unfreeze`](IntDeltaMonitor::unfreeze). Values removed while frozen, including by the
/// callback itself, are replayed after the next freeze. The read position is a trailed integer,
/// so synchronising to an earlier checkpoint replays the changes that were undone and re-done.
#[derive(Clone, Debug)]
pub struct IntDeltaMonitor<Var> {
    variable: Var,
    processed: TrailedInteger,
    frozen: usize,
}

impl<Var: IntegerVariable> IntDeltaMonitor<Var> {
    pub(crate) fn new(variable: Var, processed: TrailedInteger, frozen: usize) -> Self {
        IntDeltaMonitor {
            variable,
            processed,
            frozen,
        }
    }

    pub fn freeze(&mut self, context: &impl HasAssignments) {
        self.frozen = context
            .assignments()
            .delta_length(self.variable.domain_id());
    }

    /// Calls `callback` with every value (of the view) removed between the last unfreeze and the
    /// freeze, stopping at the first error.
    pub fn for_each<Context: HasAssignments, E>(
        &self,
        context: &mut Context,
        mut callback: impl FnMut(&mut Context, i32) -> Result<(), E>,
    ) -> Result<(), E> {
        let domain = self.variable.domain_id();
        let start = context.trailed_values().read(self.processed) as usize;

        for index in start..self.frozen {
            let removed = context.assignments().delta_values(domain, index, index + 1)[0];
            callback(context, self.variable.map_from_domain(removed))?;
        }
        Ok(())
    }

    pub fn unfreeze(&mut self, context: &mut impl HasAssignments) {
        context
            .trailed_values_mut()
            .assign(self.processed, self.frozen as i64);
    }

    /// Marks every recorded change as consumed without replaying it.
    pub fn skip_to_end(&mut self, context: &mut impl HasAssignments) {
        self.freeze(context);
        self.unfreeze(context);
    }

    /// Whether values were removed since the last unfreeze.
    pub fn has_unprocessed(&self, context: &impl HasAssignments) -> bool {
        let processed = context.trailed_values().read(self.processed) as usize;
        context
            .assignments()
            .delta_length(self.variable.domain_id())
            > processed
    }
}

/// Replays the node and arc changes of a graph variable, with the same protocol as
/// [`IntDeltaMonitor`].
#[derive(Clone, Debug)]
pub struct GraphDeltaMonitor {
    graph: GraphId,
    processed: TrailedInteger,
    frozen: usize,
}

impl GraphDeltaMonitor {
    pub(crate) fn new(graph: GraphId, processed: TrailedInteger, frozen: usize) -> Self {
        GraphDeltaMonitor {
            graph,
            processed,
            frozen,
        }
    }

    pub fn freeze(&mut self, context: &impl HasAssignments) {
        self.frozen = context.graphs().delta_length(self.graph);
    }

    /// Calls `callback` with every change whose kind is in `events`.
    pub fn for_each<Context: HasAssignments, E>(
        &self,
        context: &mut Context,
        events: EnumSet<GraphEvent>,
        mut callback: impl FnMut(&mut Context, GraphDelta) -> Result<(), E>,
    ) -> Result<(), E> {
        let start = context.trailed_values().read(self.processed) as usize;

        for index in start..self.frozen {
            let delta = context.graphs().delta_entry(self.graph, index);
            if events.contains(delta.event()) {
                callback(context, delta)?;
            }
        }
        Ok(())
    }

    pub fn unfreeze(&mut self, context: &mut impl HasAssignments) {
        context
            .trailed_values_mut()
            .assign(self.processed, self.frozen as i64);
    }

    pub fn skip_to_end(&mut self, context: &mut impl HasAssignments) {
        self.freeze(context);
        self.unfreeze(context);
    }

    pub fn has_unprocessed(&self, context: &impl HasAssignments) -> bool {
        let processed = context.trailed_values().read(self.processed) as usize;
        context.graphs().delta_length(self.graph) > processed
    }
}
