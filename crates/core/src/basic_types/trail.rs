use std::iter::Rev;
use std::ops::Deref;
use std::vec::Drain;

use crate::cp_assert_simple;

/// A stack of undo entries partitioned by checkpoints.
///
/// Synchronising to an earlier checkpoint hands back the entries which were pushed after it, most
/// recent first, so the owner can undo them.
#[derive(Clone, Debug)]
pub(crate) struct Trail<T> {
    current_checkpoint: usize,
    /// At index i is the length of the trail when checkpoint i + 1 was created
    checkpoint_starts: Vec<usize>,
    entries: Vec<T>,
}

// Implemented by hand to avoid a `T: Default` bound.
impl<T> Default for Trail<T> {
    fn default() -> Self {
        Trail {
            current_checkpoint: 0,
            checkpoint_starts: Vec::new(),
            entries: Vec::new(),
        }
    }
}

impl<T> Trail<T> {
    pub(crate) fn new_checkpoint(&mut self) {
        self.current_checkpoint += 1;
        self.checkpoint_starts.push(self.entries.len());
    }

    pub(crate) fn get_checkpoint(&self) -> usize {
        self.current_checkpoint
    }

    /// Removes every entry pushed after `new_checkpoint` was created.
    pub(crate) fn synchronise(&mut self, new_checkpoint: usize) -> Rev<Drain<'_, T>> {
        cp_assert_simple!(
            new_checkpoint < self.current_checkpoint,
            "can only synchronise to an earlier checkpoint"
        );

        let retained_length = self.checkpoint_starts[new_checkpoint];

        self.current_checkpoint = new_checkpoint;
        self.checkpoint_starts.truncate(new_checkpoint);
        self.entries.drain(retained_length..).rev()
    }

    pub(crate) fn push(&mut self, entry: T) {
        self.entries.push(entry)
    }
}

impl<T> Deref for Trail<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_readable_in_push_order() {
        let mut trail = Trail::default();
        trail.push('a');
        trail.push('b');

        assert_eq!(&['a', 'b'], trail.deref());
    }

    #[test]
    fn synchronising_keeps_entries_from_before_the_checkpoint() {
        let mut trail = Trail::default();
        trail.push(10);
        trail.new_checkpoint();
        trail.push(20);
        trail.new_checkpoint();
        trail.push(30);

        let _ = trail.synchronise(1);

        assert_eq!(&[10, 20], trail.deref());
        assert_eq!(1, trail.get_checkpoint());
    }

    #[test]
    fn undone_entries_are_handed_back_most_recent_first() {
        let mut trail = Trail::default();
        trail.new_checkpoint();
        trail.push(1);
        trail.push(2);
        trail.new_checkpoint();
        trail.push(3);

        let undone = trail.synchronise(0).collect::<Vec<_>>();

        assert_eq!(vec![3, 2, 1], undone);
        assert!(trail.is_empty());
    }

    #[test]
    fn empty_checkpoints_can_be_skipped() {
        let mut trail: Trail<u8> = Trail::default();
        trail.new_checkpoint();
        trail.new_checkpoint();
        trail.new_checkpoint();

        assert_eq!(0, trail.synchronise(1).count());
        assert_eq!(1, trail.get_checkpoint());
    }
}
