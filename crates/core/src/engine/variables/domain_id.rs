use enumset::EnumSet;

use super::AffineView;
use super::IntegerVariable;
use super::TransformableVariable;
use crate::containers::StorageKey;
use crate::engine::notifications::DomainEvent;
use crate::engine::notifications::Watchers;
use crate::engine::Assignments;
use crate::engine::EmptyDomain;

/// Identifies an integer domain in the [`Assignments`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainId {
    pub id: u32,
}

impl DomainId {
    pub const fn new(id: u32) -> Self {
        DomainId { id }
    }
}

impl IntegerVariable for DomainId {
    type AffineView = AffineView<Self>;

    fn lower_bound(&self, assignments: &Assignments) -> i32 {
        assignments.get_lower_bound(*self)
    }

    fn upper_bound(&self, assignments: &Assignments) -> i32 {
        assignments.get_upper_bound(*self)
    }

    fn contains(&self, assignments: &Assignments, value: i32) -> bool {
        assignments.is_value_in_domain(*self, value)
    }

    fn iterate_domain(&self, assignments: &Assignments) -> impl Iterator<Item = i32> {
        assignments.get_domain_iterator(*self)
    }

    fn domain_size(&self, assignments: &Assignments) -> usize {
        assignments.domain_size(*self)
    }

    fn set_lower_bound(
        &self,
        assignments: &mut Assignments,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        assignments.tighten_lower_bound(*self, value)
    }

    fn set_upper_bound(
        &self,
        assignments: &mut Assignments,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        assignments.tighten_upper_bound(*self, value)
    }

    fn remove(&self, assignments: &mut Assignments, value: i32) -> Result<bool, EmptyDomain> {
        assignments.remove_value_from_domain(*self, value)
    }

    fn fix(&self, assignments: &mut Assignments, value: i32) -> Result<bool, EmptyDomain> {
        assignments.make_assignment(*self, value)
    }

    fn watch_all(&self, watchers: &mut Watchers<'_>, events: EnumSet<DomainEvent>) {
        watchers.watch_all(*self, events);
    }

    fn unpack_event(&self, event: DomainEvent) -> DomainEvent {
        event
    }

    fn domain_id(&self) -> DomainId {
        *self
    }

    fn map_from_domain(&self, value: i32) -> i32 {
        value
    }
}

impl TransformableVariable<AffineView<DomainId>> for DomainId {
    fn scaled(&self, scale: i32) -> AffineView<DomainId> {
        AffineView::new(*self, scale, 0)
    }

    fn offset(&self, offset: i32) -> AffineView<DomainId> {
        AffineView::new(*self, 1, offset)
    }
}

impl StorageKey for DomainId {
    fn index(&self) -> usize {
        self.id as usize
    }

    fn create_from_index(index: usize) -> Self {
        DomainId { id: index as u32 }
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.id)
    }
}

impl std::fmt::Debug for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.id)
    }
}
