use std::fmt::Debug;

use enumset::EnumSet;

use super::DomainId;
use super::TransformableVariable;
use crate::engine::notifications::DomainEvent;
use crate::engine::notifications::Watchers;
use crate::engine::Assignments;
use crate::engine::EmptyDomain;

/// The interface propagators use to read and narrow an integer variable.
///
/// Narrowing operations are monotonic, return `Ok(false)` without side effects when nothing
/// changes, and return [`EmptyDomain`] without modifying the domain when the narrowing would leave
/// it without values.
pub trait IntegerVariable: Clone + Debug + 'static + TransformableVariable<Self::AffineView> {
    type AffineView: IntegerVariable;

    fn lower_bound(&self, assignments: &Assignments) -> i32;

    fn upper_bound(&self, assignments: &Assignments) -> i32;

    fn contains(&self, assignments: &Assignments, value: i32) -> bool;

    /// Iterates the domain in increasing order.
    fn iterate_domain(&self, assignments: &Assignments) -> impl Iterator<Item = i32>;

    /// The number of values in the domain, in constant time.
    fn domain_size(&self, assignments: &Assignments) -> usize;

    fn set_lower_bound(
        &self,
        assignments: &mut Assignments,
        value: i32,
    ) -> Result<bool, EmptyDomain>;

    fn set_upper_bound(
        &self,
        assignments: &mut Assignments,
        value: i32,
    ) -> Result<bool, EmptyDomain>;

    fn remove(&self, assignments: &mut Assignments, value: i32) -> Result<bool, EmptyDomain>;

    fn fix(&self, assignments: &mut Assignments, value: i32) -> Result<bool, EmptyDomain>;

    /// Registers the watchers for the given events, translated to the underlying domain.
    fn watch_all(&self, watchers: &mut Watchers<'_>, events: EnumSet<DomainEvent>);

    /// Translates an event on the underlying domain to an event on this view.
    fn unpack_event(&self, event: DomainEvent) -> DomainEvent;

    /// The domain this variable is a view of.
    fn domain_id(&self) -> DomainId;

    /// Maps a value of the underlying domain to the corresponding value of this view.
    fn map_from_domain(&self, value: i32) -> i32;
}
