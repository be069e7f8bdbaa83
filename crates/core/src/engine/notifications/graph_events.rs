use enumset::enum_set;
use enumset::EnumSet;
use enumset::EnumSetType;

/// The kind of a change to the kernel or envelope of a graph variable.
#[derive(Debug, EnumSetType, Hash)]
pub enum GraphEvent {
    /// An arc entered the kernel.
    ArcEnforced,
    /// An arc left the envelope.
    ArcRemoved,
    /// A node entered the kernel.
    NodeEnforced,
    /// A node left the envelope.
    NodeRemoved,
}

/// The propagation conditions of a propagator on one graph variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GraphEvents {
    events: EnumSet<GraphEvent>,
}

impl GraphEvents {
    pub const ARCS: GraphEvents =
        GraphEvents::new(enum_set!(GraphEvent::ArcEnforced | GraphEvent::ArcRemoved));
    pub const NODES: GraphEvents =
        GraphEvents::new(enum_set!(GraphEvent::NodeEnforced | GraphEvent::NodeRemoved));
    pub const ARC_ENFORCED: GraphEvents = GraphEvents::new(enum_set!(GraphEvent::ArcEnforced));
    pub const ANY_GRAPH: GraphEvents = GraphEvents::new(enum_set!(
        GraphEvent::ArcEnforced
            | GraphEvent::ArcRemoved
            | GraphEvent::NodeEnforced
            | GraphEvent::NodeRemoved
    ));

    pub const fn new(events: EnumSet<GraphEvent>) -> GraphEvents {
        GraphEvents { events }
    }

    pub fn events(&self) -> EnumSet<GraphEvent> {
        self.events
    }
}
