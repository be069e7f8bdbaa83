use downcast_rs::impl_downcast;
use downcast_rs::Downcast;

use super::Domains;
use super::LocalId;
use super::NotificationContext;
use super::PropagationContext;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
#[cfg(doc)]
use crate::engine::variables::IntegerVariable;
use crate::engine::DomainEvent;
use crate::engine::GraphEvent;
use crate::statistics::StatisticLogger;

// Allows the driver and tests to go from `Box<dyn Propagator>` back to the concrete type.
impl_downcast!(Propagator);

/// A filtering algorithm for one constraint.
///
/// Propagators are called by the driver after they are enqueued by [`Propagator::notify`]. Every
/// narrowing goes through the [`PropagationContext`], which fails fast with the offending
/// variable. State that must survive backtracking is stored in trailed integers; other fields are
/// scratch space and must be rebuilt on every call or in [`Propagator::synchronise`].
pub trait Propagator: Downcast {
    /// The name of the propagator, used in logging and errors.
    fn name(&self) -> &str;

    /// Filters the domains without relying on state gathered in earlier calls, (re)initialising
    /// every derived reversible structure. It is called once when the propagator is posted.
    fn propagate_from_scratch(&mut self, context: PropagationContext) -> PropagationStatusCP;

    /// Filters the domains using the incremental state collected through the notifications since
    /// the last call.
    fn propagate(&mut self, context: PropagationContext) -> PropagationStatusCP {
        self.propagate_from_scratch(context)
    }

    /// Called for every event on a registered integer variable, including events caused by the
    /// propagator itself. The event is the one on the underlying domain; translate it with
    /// [`IntegerVariable::unpack_event`] when the registered variable is a view.
    ///
    /// The propagator is only enqueued when it returns [`EnqueueDecision::Enqueue`] and the
    /// event was not caused by itself.
    fn notify(
        &mut self,
        _context: NotificationContext,
        _local_id: LocalId,
        _event: DomainEvent,
    ) -> EnqueueDecision {
        EnqueueDecision::Enqueue
    }

    /// The counterpart of [`Propagator::notify`] for graph variables.
    fn notify_graph(
        &mut self,
        _context: NotificationContext,
        _local_id: LocalId,
        _event: GraphEvent,
    ) -> EnqueueDecision {
        EnqueueDecision::Enqueue
    }

    /// Called after the driver synchronised to an earlier checkpoint.
    fn synchronise(&mut self, _domains: Domains) {}

    /// A hint for the order in which enqueued propagators are called.
    fn priority(&self) -> Priority {
        Priority::VeryLow
    }

    /// Whether the constraint is satisfied by every, no, or some assignments of the current
    /// domains. Has no side effects.
    fn is_entailed(&self, _domains: Domains) -> Entailment {
        Entailment::Undefined
    }

    /// A cheap check for a conflict, without filtering.
    fn detect_inconsistency(&self, _domains: Domains) -> Option<PropagatorConflict> {
        None
    }

    /// Logs the statistics of the propagator, if it keeps any.
    fn log_statistics(&self, _statistic_logger: StatisticLogger) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueDecision {
    Enqueue,
    Skip,
}

/// The truth of a constraint under the current domains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Entailment {
    /// Every assignment of the current domains satisfies the constraint.
    True,
    /// No assignment of the current domains satisfies the constraint.
    False,
    Undefined,
}

/// The priority of a propagator; lower values are called first.
#[derive(Default, Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    /// Unary and binary propagators.
    High = 0,
    /// Ternary propagators.
    Medium = 1,
    /// Linear-time propagators.
    Low = 2,
    /// Quadratic and worse.
    #[default]
    VeryLow = 3,
}
