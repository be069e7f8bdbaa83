mod domains;
mod propagation_context;

pub use domains::Domains;
pub use propagation_context::NotificationContext;
pub use propagation_context::PropagationContext;

use crate::engine::variables::GraphId;
use crate::engine::variables::IntegerVariable;
use crate::engine::Assignments;
use crate::engine::GraphAssignments;
use crate::engine::GraphDomain;
use crate::engine::TrailedInteger;
use crate::engine::TrailedValues;

/// Access to the stores, implemented by every context handed to propagators.
pub trait HasAssignments {
    fn assignments(&self) -> &Assignments;

    fn graphs(&self) -> &GraphAssignments;

    fn trailed_values(&self) -> &TrailedValues;

    fn trailed_values_mut(&mut self) -> &mut TrailedValues;
}

/// Read-only queries on variables and trailed integers.
pub trait ReadDomains: HasAssignments {
    fn lower_bound<Var: IntegerVariable>(&self, var: &Var) -> i32 {
        var.lower_bound(self.assignments())
    }

    fn upper_bound<Var: IntegerVariable>(&self, var: &Var) -> i32 {
        var.upper_bound(self.assignments())
    }

    fn contains<Var: IntegerVariable>(&self, var: &Var, value: i32) -> bool {
        var.contains(self.assignments(), value)
    }

    fn is_fixed<Var: IntegerVariable>(&self, var: &Var) -> bool {
        self.lower_bound(var) == self.upper_bound(var)
    }

    fn fixed_value<Var: IntegerVariable>(&self, var: &Var) -> Option<i32> {
        self.is_fixed(var).then(|| self.lower_bound(var))
    }

    fn iterate_domain<Var: IntegerVariable>(&self, var: &Var) -> impl Iterator<Item = i32> {
        var.iterate_domain(self.assignments())
    }

    fn domain_size<Var: IntegerVariable>(&self, var: &Var) -> usize {
        var.domain_size(self.assignments())
    }

    /// Whether some value strictly between the bounds is missing from the domain.
    fn has_holes<Var: IntegerVariable>(&self, var: &Var) -> bool {
        let width = self.upper_bound(var) as i64 - self.lower_bound(var) as i64 + 1;
        self.domain_size(var) as i64 != width
    }

    fn read(&self, trailed_integer: TrailedInteger) -> i64 {
        self.trailed_values().read(trailed_integer)
    }

    fn graph(&self, graph: GraphId) -> &GraphDomain {
        self.graphs().graph(graph)
    }
}

impl<T: HasAssignments> ReadDomains for T {}
