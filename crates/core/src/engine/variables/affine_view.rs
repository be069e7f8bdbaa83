use enumset::EnumSet;
use itertools::Either;

use super::DomainId;
use super::IntegerVariable;
use super::TransformableVariable;
use crate::engine::notifications::DomainEvent;
use crate::engine::notifications::Watchers;
use crate::engine::Assignments;
use crate::engine::EmptyDomain;
use crate::math::num_ext::clamp_to_i32;
use crate::math::num_ext::NumExt;

/// Models the view `scale * inner + offset`, with a non-zero scale.
///
/// Views with a negative scale swap the roles of the bounds: raising the lower bound of the view
/// lowers the upper bound of the inner variable.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct AffineView<Inner> {
    inner: Inner,
    scale: i32,
    offset: i32,
}

impl<Inner> AffineView<Inner> {
    pub fn new(inner: Inner, scale: i32, offset: i32) -> Self {
        assert_ne!(scale, 0, "a view with scale zero is not invertible");
        AffineView {
            inner,
            scale,
            offset,
        }
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    fn invert(&self, value: i32, rounding: Rounding) -> i32 {
        let translated = value as i64 - self.offset as i64;
        let scale = self.scale as i64;

        clamp_to_i32(match rounding {
            Rounding::Up => <i64 as NumExt>::div_ceil(translated, scale),
            Rounding::Down => <i64 as NumExt>::div_floor(translated, scale),
        })
    }

    fn invert_exact(&self, value: i32) -> Option<i32> {
        let translated = value as i64 - self.offset as i64;
        (translated % self.scale as i64 == 0).then(|| clamp_to_i32(translated / self.scale as i64))
    }

    fn map(&self, value: i32) -> i32 {
        clamp_to_i32(self.scale as i64 * value as i64 + self.offset as i64)
    }
}

#[derive(Clone, Copy, Debug)]
enum Rounding {
    Up,
    Down,
}

impl<View: IntegerVariable> IntegerVariable for AffineView<View> {
    type AffineView = Self;

    fn lower_bound(&self, assignments: &Assignments) -> i32 {
        if self.scale < 0 {
            self.map(self.inner.upper_bound(assignments))
        } else {
            self.map(self.inner.lower_bound(assignments))
        }
    }

    fn upper_bound(&self, assignments: &Assignments) -> i32 {
        if self.scale < 0 {
            self.map(self.inner.lower_bound(assignments))
        } else {
            self.map(self.inner.upper_bound(assignments))
        }
    }

    fn contains(&self, assignments: &Assignments, value: i32) -> bool {
        self.invert_exact(value)
            .is_some_and(|inverted| self.inner.contains(assignments, inverted))
    }

    fn iterate_domain(&self, assignments: &Assignments) -> impl Iterator<Item = i32> {
        let mapped = self
            .inner
            .iterate_domain(assignments)
            .map(|value| self.map(value));

        if self.scale > 0 {
            Either::Left(mapped)
        } else {
            let mut values = mapped.collect::<Vec<_>>();
            values.reverse();
            Either::Right(values.into_iter())
        }
    }

    fn domain_size(&self, assignments: &Assignments) -> usize {
        self.inner.domain_size(assignments)
    }

    fn set_lower_bound(
        &self,
        assignments: &mut Assignments,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        if self.scale >= 0 {
            self.inner
                .set_lower_bound(assignments, self.invert(value, Rounding::Up))
        } else {
            self.inner
                .set_upper_bound(assignments, self.invert(value, Rounding::Down))
        }
    }

    fn set_upper_bound(
        &self,
        assignments: &mut Assignments,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        if self.scale >= 0 {
            self.inner
                .set_upper_bound(assignments, self.invert(value, Rounding::Down))
        } else {
            self.inner
                .set_lower_bound(assignments, self.invert(value, Rounding::Up))
        }
    }

    fn remove(&self, assignments: &mut Assignments, value: i32) -> Result<bool, EmptyDomain> {
        match self.invert_exact(value) {
            Some(inverted) => self.inner.remove(assignments, inverted),
            None => Ok(false),
        }
    }

    fn fix(&self, assignments: &mut Assignments, value: i32) -> Result<bool, EmptyDomain> {
        match self.invert_exact(value) {
            Some(inverted) => self.inner.fix(assignments, inverted),
            None => Err(EmptyDomain::integer(self.domain_id())),
        }
    }

    fn watch_all(&self, watchers: &mut Watchers<'_>, mut events: EnumSet<DomainEvent>) {
        let bounds = DomainEvent::LowerBound | DomainEvent::UpperBound;
        if self.scale < 0 && events.intersection(bounds).len() == 1 {
            events ^= bounds;
        }
        self.inner.watch_all(watchers, events);
    }

    fn unpack_event(&self, event: DomainEvent) -> DomainEvent {
        if self.scale < 0 {
            match self.inner.unpack_event(event) {
                DomainEvent::LowerBound => DomainEvent::UpperBound,
                DomainEvent::UpperBound => DomainEvent::LowerBound,
                event => event,
            }
        } else {
            self.inner.unpack_event(event)
        }
    }

    fn domain_id(&self) -> DomainId {
        self.inner.domain_id()
    }

    fn map_from_domain(&self, value: i32) -> i32 {
        self.map(self.inner.map_from_domain(value))
    }
}

impl<View> TransformableVariable<AffineView<View>> for AffineView<View>
where
    View: IntegerVariable,
{
    fn scaled(&self, scale: i32) -> AffineView<View> {
        let mut result = self.clone();
        result.scale *= scale;
        result.offset *= scale;
        result
    }

    fn offset(&self, offset: i32) -> AffineView<View> {
        let mut result = self.clone();
        result.offset += offset;
        result
    }
}
