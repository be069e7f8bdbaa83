use enumset::enum_set;
use enumset::EnumSet;
use enumset::EnumSetType;

/// The kind of a narrowing of an integer domain.
///
/// Every successful narrowing emits exactly one event: the dominant kind of change, where
/// [`DomainEvent::Assign`] dominates the bound events, which in turn dominate
/// [`DomainEvent::Removal`].
#[derive(Debug, EnumSetType, Hash)]
pub enum DomainEvent {
    /// The domain became a single value.
    Assign,
    /// The lower bound increased.
    LowerBound,
    /// The upper bound decreased.
    UpperBound,
    /// A value strictly between the bounds was removed.
    Removal,
}

impl DomainEvent {
    /// The kinds of change that this event implies; a watcher registered for any of them is
    /// woken.
    pub fn implied_events(self) -> EnumSet<DomainEvent> {
        match self {
            DomainEvent::Assign => EnumSet::all(),
            DomainEvent::LowerBound => DomainEvent::LowerBound | DomainEvent::Removal,
            DomainEvent::UpperBound => DomainEvent::UpperBound | DomainEvent::Removal,
            DomainEvent::Removal => enum_set!(DomainEvent::Removal),
        }
    }
}

/// The propagation conditions of a propagator on one integer variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DomainEvents {
    events: EnumSet<DomainEvent>,
}

impl DomainEvents {
    /// Tightening of either bound (including instantiation).
    pub const BOUNDS: DomainEvents =
        DomainEvents::new(enum_set!(DomainEvent::LowerBound | DomainEvent::UpperBound));
    /// Any change to the domain.
    pub const ANY_INT: DomainEvents = DomainEvents::new(enum_set!(
        DomainEvent::Assign | DomainEvent::LowerBound | DomainEvent::UpperBound | DomainEvent::Removal
    ));
    pub const REMOVAL: DomainEvents = DomainEvents::new(enum_set!(DomainEvent::Removal));
    pub const LOWER_BOUND: DomainEvents = DomainEvents::new(enum_set!(DomainEvent::LowerBound));
    pub const UPPER_BOUND: DomainEvents = DomainEvents::new(enum_set!(DomainEvent::UpperBound));
    /// Only instantiation.
    pub const ASSIGN: DomainEvents = DomainEvents::new(enum_set!(DomainEvent::Assign));
    pub const ASSIGN_AND_REMOVAL: DomainEvents =
        DomainEvents::new(enum_set!(DomainEvent::Assign | DomainEvent::Removal));

    pub const fn new(events: EnumSet<DomainEvent>) -> DomainEvents {
        DomainEvents { events }
    }

    pub fn events(&self) -> EnumSet<DomainEvent> {
        self.events
    }
}
