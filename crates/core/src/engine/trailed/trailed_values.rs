use super::TrailedChange;
use super::TrailedInteger;
use crate::basic_types::Trail;
use crate::containers::KeyedVec;

/// The reversible memory of the propagators: integer cells whose writes are undone when
/// synchronising to an earlier checkpoint.
///
/// Every write records the previous value at most once per change, so undoing costs O(1) per
/// write.
#[derive(Default, Debug, Clone)]
pub struct TrailedValues {
    trail: Trail<TrailedChange>,
    values: KeyedVec<TrailedInteger, i64>,
}

impl TrailedValues {
    /// Allocates a new cell holding `initial_value`.
    pub fn grow(&mut self, initial_value: i64) -> TrailedInteger {
        self.values.push(initial_value)
    }

    pub fn new_checkpoint(&mut self) {
        self.trail.new_checkpoint()
    }

    pub fn get_checkpoint(&self) -> usize {
        self.trail.get_checkpoint()
    }

    pub fn read(&self, trailed_integer: TrailedInteger) -> i64 {
        self.values[trailed_integer]
    }

    /// Restores every cell to the value it had when `new_checkpoint` was created.
    pub fn synchronise(&mut self, new_checkpoint: usize) {
        self.trail
            .synchronise(new_checkpoint)
            .for_each(|change| self.values[change.reference] = change.old_value)
    }

    pub fn assign(&mut self, trailed_integer: TrailedInteger, value: i64) {
        let old_value = self.values[trailed_integer];
        if old_value == value {
            return;
        }

        self.trail.push(TrailedChange {
            old_value,
            reference: trailed_integer,
        });
        self.values[trailed_integer] = value;
    }

    pub fn add_assign(&mut self, trailed_integer: TrailedInteger, addition: i64) {
        self.assign(trailed_integer, self.values[trailed_integer] + addition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_undone_per_checkpoint() {
        let mut trailed_values = TrailedValues::default();
        let cell = trailed_values.grow(3);

        trailed_values.new_checkpoint();
        trailed_values.add_assign(cell, 4);
        assert_eq!(7, trailed_values.read(cell));

        trailed_values.new_checkpoint();
        trailed_values.assign(cell, -1);
        trailed_values.add_assign(cell, 10);
        assert_eq!(9, trailed_values.read(cell));

        trailed_values.synchronise(1);
        assert_eq!(7, trailed_values.read(cell));

        trailed_values.synchronise(0);
        assert_eq!(3, trailed_values.read(cell));
    }

    #[test]
    fn unchanged_writes_are_not_recorded() {
        let mut trailed_values = TrailedValues::default();
        let cell = trailed_values.grow(5);

        trailed_values.new_checkpoint();
        trailed_values.assign(cell, 5);
        trailed_values.add_assign(cell, 0);

        assert!(trailed_values.trail.is_empty());
    }

    #[test]
    fn cells_allocated_after_a_checkpoint_keep_their_initial_value() {
        let mut trailed_values = TrailedValues::default();
        trailed_values.new_checkpoint();
        let cell = trailed_values.grow(42);

        trailed_values.synchronise(0);

        assert_eq!(42, trailed_values.read(cell));
    }
}
