//! The reversible domain stores and the fixpoint driver.
mod assignments;
mod graph_assignments;
pub(crate) mod notifications;
pub(crate) mod propagator_queue;
mod state;
#[cfg(test)]
pub(crate) mod test_solver;
mod trailed;
pub mod variables;

pub use assignments::Assignments;
pub use assignments::EmptyDomain;
pub use assignments::VariableId;
pub use graph_assignments::GraphAssignments;
pub use graph_assignments::GraphDelta;
pub use graph_assignments::GraphDomain;
pub use graph_assignments::Membership;
pub use notifications::DomainEvent;
pub use notifications::DomainEvents;
pub use notifications::GraphDeltaMonitor;
pub use notifications::GraphEvent;
pub use notifications::GraphEvents;
pub use notifications::IntDeltaMonitor;
pub use state::Contradiction;
pub use state::State;
pub use trailed::TrailedInteger;
pub use trailed::TrailedValues;
