//! Event dispatch from the domain stores to the propagators which watch them, and the delta
//! monitors through which propagators replay individual changes.
mod delta_monitor;
mod domain_events;
mod graph_events;
mod watch_list;

pub use delta_monitor::GraphDeltaMonitor;
pub use delta_monitor::IntDeltaMonitor;
pub use domain_events::DomainEvent;
pub use domain_events::DomainEvents;
pub use graph_events::GraphEvent;
pub use graph_events::GraphEvents;
pub(crate) use watch_list::NotificationEngine;
pub use watch_list::Watchers;
