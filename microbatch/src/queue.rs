//! Per-priority intake queues.
//!
//! Ids wait here between submission and dispatch. There is one FIFO per priority,
//! and every entry carries a global sequence number assigned at enqueue time.
//! The dispatcher removes entries with [`SharedIntake::drain`], which takes from the
//! highest-priority non-empty queue first, so a batch can mix requests and
//! priorities when a higher queue runs dry mid-fill.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::types::{ItemId, Priority, RequestId};

/// An id waiting to be placed in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeEntry {
    pub request_id: RequestId,
    pub id: ItemId,
    pub priority: Priority,
    /// Index of the id within its request's submission
    pub position: usize,
    /// Global enqueue order, unique across all queues
    pub seq: u64,
}

/// Queue depth by priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total: usize,
}

/// The three intake queues. Not synchronized; see [`SharedIntake`].
#[derive(Debug, Default)]
pub struct IntakeQueues {
    high: VecDeque<IntakeEntry>,
    medium: VecDeque<IntakeEntry>,
    low: VecDeque<IntakeEntry>,
    next_seq: u64,
}

impl IntakeQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, priority: Priority) -> &VecDeque<IntakeEntry> {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }

    fn queue_mut(&mut self, priority: Priority) -> &mut VecDeque<IntakeEntry> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Medium => &mut self.medium,
            Priority::Low => &mut self.low,
        }
    }

    /// Append `ids` to the tail of the queue for `priority`, in order.
    ///
    /// Returns the number of entries added.
    pub fn enqueue(&mut self, request_id: RequestId, priority: Priority, ids: &[ItemId]) -> usize {
        for (position, &id) in ids.iter().enumerate() {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.queue_mut(priority).push_back(IntakeEntry {
                request_id,
                id,
                priority,
                position,
                seq,
            });
        }
        ids.len()
    }

    /// Remove and return up to `n` entries, in the order [`select_next_batch`] picks them.
    pub fn drain(&mut self, n: usize) -> Vec<IntakeEntry> {
        let selected = select_next_batch(self, n);
        for entry in &selected {
            let popped = self.queue_mut(entry.priority).pop_front();
            debug_assert_eq!(popped.map(|e| e.seq), Some(entry.seq));
        }
        selected
    }

    pub fn depth(&self) -> QueueDepth {
        let (high, medium, low) = (self.high.len(), self.medium.len(), self.low.len());
        QueueDepth {
            high,
            medium,
            low,
            total: high + medium + low,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.medium.is_empty() && self.low.is_empty()
    }

    /// Drop every queued entry. Sequence numbers keep increasing afterwards.
    pub fn clear(&mut self) {
        self.high.clear();
        self.medium.clear();
        self.low.clear();
    }
}

/// Pick the entries the next drain of `n` would take, without removing them.
///
/// Takes from the front of the highest-priority non-empty queue until `n` entries
/// are collected or every queue is exhausted.
pub fn select_next_batch(queues: &IntakeQueues, n: usize) -> Vec<IntakeEntry> {
    let mut selected = Vec::with_capacity(n);
    for priority in Priority::DESCENDING {
        let remaining = n - selected.len();
        if remaining == 0 {
            break;
        }
        selected.extend(queues.queue(priority).iter().take(remaining).copied());
    }
    selected
}

/// Intake queues shared between submission and the dispatcher.
///
/// `enqueue` and `drain` serialize on one mutex. Every enqueue also wakes an idle
/// dispatcher.
#[derive(Debug, Default)]
pub struct SharedIntake {
    queues: Mutex<IntakeQueues>,
    notify: Notify,
}

impl SharedIntake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, request_id: RequestId, priority: Priority, ids: &[ItemId]) -> usize {
        let added = self.queues.lock().enqueue(request_id, priority, ids);
        self.notify.notify_one();
        added
    }

    pub fn drain(&self, n: usize) -> Vec<IntakeEntry> {
        self.queues.lock().drain(n)
    }

    pub fn depth(&self) -> QueueDepth {
        self.queues.lock().depth()
    }

    pub fn clear(&self) {
        self.queues.lock().clear();
    }

    /// Resolves after the next enqueue (or immediately if one happened since the
    /// last wake-up was consumed).
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn queues() -> IntakeQueues {
        IntakeQueues::new()
    }

    fn ids_of(entries: &[IntakeEntry]) -> Vec<ItemId> {
        entries.iter().map(|e| e.id).collect()
    }

    #[rstest]
    fn test_enqueue_preserves_order_and_positions(mut queues: IntakeQueues) {
        let request = RequestId::new();
        assert_eq!(queues.enqueue(request, Priority::Low, &[10, 20, 30]), 3);

        let drained = queues.drain(3);
        assert_eq!(ids_of(&drained), vec![10, 20, 30]);
        assert_eq!(
            drained.iter().map(|e| e.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(drained.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[rstest]
    fn test_drain_prefers_higher_priority(mut queues: IntakeQueues) {
        queues.enqueue(RequestId::new(), Priority::Low, &[1, 2]);
        queues.enqueue(RequestId::new(), Priority::Medium, &[3, 4]);
        queues.enqueue(RequestId::new(), Priority::High, &[5]);

        assert_eq!(ids_of(&queues.drain(3)), vec![5, 3, 4]);
        assert_eq!(ids_of(&queues.drain(3)), vec![1, 2]);
        assert!(queues.drain(3).is_empty());
    }

    #[rstest]
    fn test_coalesces_trailing_high_with_medium(mut queues: IntakeQueues) {
        let medium = RequestId::new();
        let high = RequestId::new();
        queues.enqueue(medium, Priority::Medium, &[4, 5]);
        queues.enqueue(high, Priority::High, &[6, 7, 8, 9]);

        assert_eq!(ids_of(&queues.drain(3)), vec![6, 7, 8]);

        let mixed = queues.drain(3);
        assert_eq!(ids_of(&mixed), vec![9, 4, 5]);
        assert_eq!(mixed[0].request_id, high);
        assert_eq!(mixed[1].request_id, medium);
    }

    #[rstest]
    fn test_select_does_not_mutate(mut queues: IntakeQueues) {
        queues.enqueue(RequestId::new(), Priority::High, &[1, 2, 3, 4]);

        let first = select_next_batch(&queues, 3);
        let second = select_next_batch(&queues, 3);
        assert_eq!(first, second);
        assert_eq!(queues.depth().total, 4);

        assert_eq!(queues.drain(3), first);
        assert_eq!(queues.depth().total, 1);
    }

    #[rstest]
    #[case(0, vec![])]
    #[case(1, vec![7])]
    #[case(5, vec![7, 8, 1, 2, 3])]
    #[case(10, vec![7, 8, 1, 2, 3])]
    fn test_select_respects_limit(mut queues: IntakeQueues, #[case] n: usize, #[case] expected: Vec<ItemId>) {
        queues.enqueue(RequestId::new(), Priority::Low, &[1, 2, 3]);
        queues.enqueue(RequestId::new(), Priority::High, &[7, 8]);
        assert_eq!(ids_of(&select_next_batch(&queues, n)), expected);
    }

    /// For any interleaving of submissions, a lower-priority entry is never drained
    /// while a higher-priority one is still queued.
    #[rstest]
    fn test_no_lower_priority_drained_while_higher_waits(mut queues: IntakeQueues) {
        let plan: [(Priority, &[ItemId]); 6] = [
            (Priority::Low, &[1, 2, 3, 4]),
            (Priority::High, &[5]),
            (Priority::Medium, &[6, 7]),
            (Priority::High, &[8, 9, 10, 11]),
            (Priority::Low, &[12]),
            (Priority::Medium, &[13, 14, 15]),
        ];
        for (priority, ids) in plan {
            queues.enqueue(RequestId::new(), priority, ids);
        }

        let mut drained_priorities = Vec::new();
        loop {
            let batch = queues.drain(3);
            if batch.is_empty() {
                break;
            }
            assert!(batch.len() == 3 || queues.is_empty());
            drained_priorities.extend(batch.iter().map(|e| e.priority));
        }

        assert_eq!(drained_priorities.len(), 15);
        assert!(drained_priorities.windows(2).all(|w| w[0] >= w[1]));
    }

    #[rstest]
    fn test_clear_keeps_sequence_monotonic(mut queues: IntakeQueues) {
        queues.enqueue(RequestId::new(), Priority::High, &[1, 2]);
        let before = select_next_batch(&queues, 2);
        queues.clear();
        assert!(queues.is_empty());

        queues.enqueue(RequestId::new(), Priority::High, &[3]);
        let after = queues.drain(1);
        assert!(after[0].seq > before[1].seq);
    }

    #[rstest]
    fn test_depth_counts_each_priority(mut queues: IntakeQueues) {
        queues.enqueue(RequestId::new(), Priority::High, &[1]);
        queues.enqueue(RequestId::new(), Priority::Medium, &[2, 3]);
        queues.enqueue(RequestId::new(), Priority::Low, &[4, 5, 6]);
        assert_eq!(
            queues.depth(),
            QueueDepth {
                high: 1,
                medium: 2,
                low: 3,
                total: 6
            }
        );
    }

    #[tokio::test]
    async fn test_shared_enqueue_wakes_waiter() {
        let intake = std::sync::Arc::new(SharedIntake::new());

        let waiter = {
            let intake = intake.clone();
            tokio::spawn(async move {
                intake.notified().await;
                intake.drain(3)
            })
        };

        tokio::task::yield_now().await;
        intake.enqueue(RequestId::new(), Priority::Medium, &[42]);

        let drained = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert_eq!(ids_of(&drained), vec![42]);
    }
}
