use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::VecDeque;

use crate::containers::KeyedVec;
use crate::cp_assert_moderate;
use crate::propagation::Priority;
use crate::propagation::PropagatorId;

/// A FIFO queue per priority level; a propagator is in the queue at most once.
#[derive(Debug, Clone)]
pub(crate) struct PropagatorQueue {
    queues: Vec<VecDeque<PropagatorId>>,
    is_enqueued: KeyedVec<PropagatorId, bool>,
    num_enqueued: usize,
    present_priorities: BinaryHeap<Reverse<u8>>,
}

impl Default for PropagatorQueue {
    fn default() -> Self {
        PropagatorQueue {
            queues: vec![VecDeque::new(); Priority::VeryLow as usize + 1],
            is_enqueued: KeyedVec::default(),
            num_enqueued: 0,
            present_priorities: BinaryHeap::new(),
        }
    }
}

impl PropagatorQueue {
    pub(crate) fn is_empty(&self) -> bool {
        self.num_enqueued == 0
    }

    pub(crate) fn enqueue_propagator(&mut self, propagator_id: PropagatorId, priority: Priority) {
        if self.is_propagator_enqueued(propagator_id) {
            return;
        }

        self.is_enqueued.accomodate(propagator_id, false);
        self.is_enqueued[propagator_id] = true;
        self.num_enqueued += 1;

        let level = priority as usize;
        if self.queues[level].is_empty() {
            self.present_priorities.push(Reverse(priority as u8));
        }
        self.queues[level].push_back(propagator_id);
    }

    pub(crate) fn pop(&mut self) -> Option<PropagatorId> {
        let Reverse(top_priority) = self.present_priorities.peek().copied()?;
        let level = top_priority as usize;
        cp_assert_moderate!(!self.queues[level].is_empty());

        let propagator_id = self.queues[level].pop_front()?;
        self.is_enqueued[propagator_id] = false;
        self.num_enqueued -= 1;

        if self.queues[level].is_empty() {
            let _ = self.present_priorities.pop();
        }

        Some(propagator_id)
    }

    pub(crate) fn clear(&mut self) {
        for queue in self.queues.iter_mut() {
            queue.clear();
        }
        for is_enqueued in self.is_enqueued.iter_mut() {
            *is_enqueued = false;
        }
        self.present_priorities.clear();
        self.num_enqueued = 0;
    }

    pub(crate) fn is_propagator_enqueued(&self, propagator_id: PropagatorId) -> bool {
        self.is_enqueued
            .get(propagator_id)
            .copied()
            .unwrap_or_default()
    }
}
