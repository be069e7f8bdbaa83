use log::debug;

use super::Domains;
use super::HasAssignments;
use super::ReadDomains;
use crate::engine::variables::GraphId;
use crate::engine::variables::IntegerVariable;
use crate::engine::Assignments;
use crate::engine::EmptyDomain;
use crate::engine::GraphAssignments;
use crate::engine::TrailedInteger;
use crate::engine::TrailedValues;
use crate::propagation::PropagatorId;

/// The context given to [`Propagator::notify`](crate::propagation::Propagator::notify): the
/// domains can be read and trailed integers can be updated, but nothing can be narrowed.
#[derive(Debug)]
pub struct NotificationContext<'a> {
    pub(crate) trailed_values: &'a mut TrailedValues,
    pub(crate) assignments: &'a Assignments,
    pub(crate) graphs: &'a GraphAssignments,
}

impl<'a> NotificationContext<'a> {
    pub(crate) fn new(
        trailed_values: &'a mut TrailedValues,
        assignments: &'a Assignments,
        graphs: &'a GraphAssignments,
    ) -> Self {
        Self {
            trailed_values,
            assignments,
            graphs,
        }
    }

    pub fn domains(&mut self) -> Domains<'_> {
        Domains::new(self.assignments, self.graphs, self.trailed_values)
    }

    pub fn assign(&mut self, trailed_integer: TrailedInteger, value: i64) {
        self.trailed_values.assign(trailed_integer, value);
    }

    pub fn add_assign(&mut self, trailed_integer: TrailedInteger, addition: i64) {
        self.trailed_values.add_assign(trailed_integer, addition);
    }
}

impl HasAssignments for NotificationContext<'_> {
    fn assignments(&self) -> &Assignments {
        self.assignments
    }

    fn graphs(&self) -> &GraphAssignments {
        self.graphs
    }

    fn trailed_values(&self) -> &TrailedValues {
        self.trailed_values
    }

    fn trailed_values_mut(&mut self) -> &mut TrailedValues {
        self.trailed_values
    }
}

/// The context given to a propagator while it propagates.
///
/// Every narrowing returns whether the domain changed, or [`EmptyDomain`] when it would leave the
/// variable without values; in the latter case the domain is left untouched and the propagator
/// should return immediately (usually with `?`).
#[derive(Debug)]
pub struct PropagationContext<'a> {
    pub(crate) trailed_values: &'a mut TrailedValues,
    pub(crate) assignments: &'a mut Assignments,
    pub(crate) graphs: &'a mut GraphAssignments,
    pub(crate) propagator_id: PropagatorId,
    passive_flag: TrailedInteger,
    requested_repropagation: &'a mut bool,
}

impl HasAssignments for PropagationContext<'_> {
    fn assignments(&self) -> &Assignments {
        self.assignments
    }

    fn graphs(&self) -> &GraphAssignments {
        self.graphs
    }

    fn trailed_values(&self) -> &TrailedValues {
        self.trailed_values
    }

    fn trailed_values_mut(&mut self) -> &mut TrailedValues {
        self.trailed_values
    }
}

impl<'a> PropagationContext<'a> {
    pub(crate) fn new(
        trailed_values: &'a mut TrailedValues,
        assignments: &'a mut Assignments,
        graphs: &'a mut GraphAssignments,
        propagator_id: PropagatorId,
        passive_flag: TrailedInteger,
        requested_repropagation: &'a mut bool,
    ) -> Self {
        PropagationContext {
            trailed_values,
            assignments,
            graphs,
            propagator_id,
            passive_flag,
            requested_repropagation,
        }
    }

    pub fn domains(&mut self) -> Domains<'_> {
        Domains::new(self.assignments, self.graphs, self.trailed_values)
    }

    pub fn reborrow(&mut self) -> PropagationContext<'_> {
        PropagationContext {
            trailed_values: self.trailed_values,
            assignments: self.assignments,
            graphs: self.graphs,
            propagator_id: self.propagator_id,
            passive_flag: self.passive_flag,
            requested_repropagation: self.requested_repropagation,
        }
    }

    pub fn set_lower_bound<Var: IntegerVariable>(
        &mut self,
        var: &Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        var.set_lower_bound(self.assignments, value)
    }

    pub fn set_upper_bound<Var: IntegerVariable>(
        &mut self,
        var: &Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        var.set_upper_bound(self.assignments, value)
    }

    pub fn remove<Var: IntegerVariable>(
        &mut self,
        var: &Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        var.remove(self.assignments, value)
    }

    /// Instantiates the variable to `value`.
    pub fn fix<Var: IntegerVariable>(
        &mut self,
        var: &Var,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        var.fix(self.assignments, value)
    }

    /// Removes every value in `[from, to]`, moving a bound when the interval covers it.
    pub fn remove_range<Var: IntegerVariable>(
        &mut self,
        var: &Var,
        from: i32,
        to: i32,
    ) -> Result<bool, EmptyDomain> {
        let lower_bound = self.lower_bound(var);
        let upper_bound = self.upper_bound(var);
        if from > to || to < lower_bound || from > upper_bound {
            return Ok(false);
        }

        if from <= lower_bound && to >= upper_bound {
            return Err(EmptyDomain::integer(var.domain_id()));
        }
        if from <= lower_bound {
            return self.set_lower_bound(var, to.saturating_add(1));
        }
        if to >= upper_bound {
            return self.set_upper_bound(var, from.saturating_sub(1));
        }

        let inner_values = self
            .iterate_domain(var)
            .filter(|value| (from..=to).contains(value))
            .collect::<Vec<_>>();
        let mut changed = false;
        for value in inner_values {
            changed |= self.remove(var, value)?;
        }
        Ok(changed)
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

    pub fn assign(&mut self, trailed_integer: TrailedInteger, value: i64) {
        self.trailed_values.assign(trailed_integer, value);
    }

    pub fn add_assign(&mut self, trailed_integer: TrailedInteger, addition: i64) {
        self.trailed_values.add_assign(trailed_integer, addition);
    }

    /// Marks the propagator as entailed until the driver synchronises to an earlier checkpoint;
    /// a passive propagator is neither notified nor called.
    pub fn set_passive(&mut self) {
        if self.trailed_values.read(self.passive_flag) == 0 {
            debug!("propagator {} became passive", self.propagator_id);
        }
        self.trailed_values.assign(self.passive_flag, 1);
    }

    /// Asks to be called again even though the propagator caused the pending events itself.
    pub fn request_repropagation(&mut self) {
        *self.requested_repropagation = true;
    }
}
