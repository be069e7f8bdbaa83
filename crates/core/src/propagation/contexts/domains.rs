use super::HasAssignments;
use crate::engine::Assignments;
use crate::engine::GraphAssignments;
use crate::engine::TrailedValues;

/// A read view of the stores, given to propagators outside of propagation (entailment checks,
/// synchronisation).
#[derive(Debug)]
pub struct Domains<'a> {
    pub(crate) assignments: &'a Assignments,
    pub(crate) graphs: &'a GraphAssignments,
    pub(crate) trailed_values: &'a mut TrailedValues,
}

impl<'a> Domains<'a> {
    pub(crate) fn new(
        assignments: &'a Assignments,
        graphs: &'a GraphAssignments,
        trailed_values: &'a mut TrailedValues,
    ) -> Self {
        Domains {
            assignments,
            graphs,
            trailed_values,
        }
    }

    pub fn reborrow(&mut self) -> Domains<'_> {
        Domains {
            assignments: self.assignments,
            graphs: self.graphs,
            trailed_values: self.trailed_values,
        }
    }
}

impl HasAssignments for Domains<'_> {
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
