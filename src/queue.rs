//! Bounded thread-safe FIFO for outbound frames.
//!
//! The queue decouples callers of `send_message` from the send worker: pushes
//! never block, the overflow policy resolves capacity conflicts, and a
//! dedicated [`QueueItem::Stop`] sentinel wakes a blocked `pop` during
//! shutdown. The sentinel bypasses the capacity check so a full queue can
//! never throttle shutdown.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::config::OverflowPolicy;

/// An element held by the outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// An outbound frame body awaiting transmission
    Frame(String),
    /// Shutdown sentinel; unblocks a pending pop and stops the send worker
    Stop,
}

/// What happened to a pushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The frame was enqueued
    Enqueued,
    /// The frame was enqueued after evicting the oldest queued frame
    DroppedOldest,
    /// The queue was full and the frame was refused
    Rejected,
}

/// Bounded FIFO of outbound frames shared between the session facade, the
/// receive dispatcher and the send worker.
#[derive(Debug)]
pub struct OutboundQueue {
    items: Mutex<VecDeque<QueueItem>>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            notify: Notify::new(),
            capacity,
            policy,
        }
    }

    /// Enqueue a frame without blocking, applying the overflow policy at
    /// capacity.
    pub fn push(&self, frame: String) -> PushOutcome {
        let outcome = {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        items.pop_front();
                        items.push_back(QueueItem::Frame(frame));
                        PushOutcome::DroppedOldest
                    }
                    OverflowPolicy::DropNewest => PushOutcome::Rejected,
                }
            } else {
                items.push_back(QueueItem::Frame(frame));
                PushOutcome::Enqueued
            }
        };

        if outcome != PushOutcome::Rejected {
            self.notify.notify_one();
        }
        outcome
    }

    /// Put a parked frame back at the head of the queue.
    ///
    /// Used by the send worker after a park-while-disconnected cycle so the
    /// frame keeps its place in line. Returns `false` if the queue refilled
    /// to capacity in the meantime; the frame (being the oldest in flight)
    /// is then discarded under either overflow policy.
    pub fn requeue(&self, frame: String) -> bool {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return false;
        }
        items.push_front(QueueItem::Frame(frame));
        drop(items);
        self.notify.notify_one();
        true
    }

    /// Enqueue the shutdown sentinel, ignoring the capacity bound.
    pub fn push_stop(&self) {
        self.items.lock().push_back(QueueItem::Stop);
        self.notify.notify_one();
    }

    /// Dequeue the next item, waiting up to `wait` for one to arrive.
    ///
    /// Returns `None` when the queue stayed empty for the full wait.
    pub async fn pop(&self, wait: Duration) -> Option<QueueItem> {
        if let Some(item) = self.try_pop() {
            return Some(item);
        }
        match timeout(wait, self.notify.notified()).await {
            Ok(()) => self.try_pop(),
            Err(_) => None,
        }
    }

    fn try_pop(&self) -> Option<QueueItem> {
        self.items.lock().pop_front()
    }

    /// Exact number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Discard everything still queued, returning how many frames were lost.
    ///
    /// Sentinels are not counted; only frames represent caller data.
    pub fn drain(&self) -> usize {
        let mut items = self.items.lock();
        let discarded = items
            .iter()
            .filter(|item| matches!(item, QueueItem::Frame(_)))
            .count();
        items.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(queue: &OutboundQueue) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = queue.try_pop() {
            if let QueueItem::Frame(frame) = item {
                out.push(frame);
            }
        }
        out
    }

    #[tokio::test]
    async fn pop_returns_frames_in_fifo_order() {
        let queue = OutboundQueue::new(10, OverflowPolicy::DropOldest);
        queue.push("a".to_owned());
        queue.push("b".to_owned());

        assert_eq!(
            queue.pop(Duration::from_millis(10)).await,
            Some(QueueItem::Frame("a".to_owned()))
        );
        assert_eq!(
            queue.pop(Duration::from_millis(10)).await,
            Some(QueueItem::Frame("b".to_owned()))
        );
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let queue = OutboundQueue::new(10, OverflowPolicy::DropOldest);

        assert_eq!(queue.pop(Duration::from_millis(20)).await, None);
    }

    #[tokio::test]
    async fn pop_wakes_on_concurrent_push() {
        let queue = std::sync::Arc::new(OutboundQueue::new(10, OverflowPolicy::DropOldest));
        let popper = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push("late".to_owned());

        let item = popper.await.unwrap();
        assert_eq!(item, Some(QueueItem::Frame("late".to_owned())));
    }

    #[test]
    fn drop_oldest_keeps_the_most_recent_frames() {
        let queue = OutboundQueue::new(3, OverflowPolicy::DropOldest);
        for frame in ["A", "B", "C", "D", "E"] {
            queue.push(frame.to_owned());
        }

        assert_eq!(frames(&queue), vec!["C", "D", "E"]);
    }

    #[test]
    fn drop_newest_keeps_the_earliest_frames() {
        let queue = OutboundQueue::new(3, OverflowPolicy::DropNewest);
        let mut outcomes = Vec::new();
        for frame in ["A", "B", "C", "D", "E"] {
            outcomes.push(queue.push(frame.to_owned()));
        }

        assert_eq!(outcomes[3], PushOutcome::Rejected);
        assert_eq!(outcomes[4], PushOutcome::Rejected);
        assert_eq!(frames(&queue), vec!["A", "B", "C"]);
    }

    #[test]
    fn push_reports_the_eviction() {
        let queue = OutboundQueue::new(1, OverflowPolicy::DropOldest);

        assert_eq!(queue.push("a".to_owned()), PushOutcome::Enqueued);
        assert_eq!(queue.push("b".to_owned()), PushOutcome::DroppedOldest);
        assert_eq!(frames(&queue), vec!["b"]);
    }

    #[tokio::test]
    async fn stop_sentinel_bypasses_capacity_and_wakes_pop() {
        let queue = std::sync::Arc::new(OutboundQueue::new(1, OverflowPolicy::DropNewest));
        queue.push("full".to_owned());

        let popper = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move {
                let first = queue.pop(Duration::from_secs(5)).await;
                let second = queue.pop(Duration::from_secs(5)).await;
                (first, second)
            })
        };

        queue.push_stop();
        let (first, second) = popper.await.unwrap();

        assert_eq!(first, Some(QueueItem::Frame("full".to_owned())));
        assert_eq!(second, Some(QueueItem::Stop));
    }

    #[test]
    fn requeue_restores_head_position() {
        let queue = OutboundQueue::new(3, OverflowPolicy::DropOldest);
        queue.push("b".to_owned());
        queue.push("c".to_owned());

        assert!(queue.requeue("a".to_owned()));
        assert_eq!(frames(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn requeue_discards_when_full() {
        let queue = OutboundQueue::new(2, OverflowPolicy::DropOldest);
        queue.push("x".to_owned());
        queue.push("y".to_owned());

        assert!(!queue.requeue("parked".to_owned()));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drain_counts_only_frames() {
        let queue = OutboundQueue::new(10, OverflowPolicy::DropOldest);
        queue.push("a".to_owned());
        queue.push("b".to_owned());
        queue.push_stop();

        assert_eq!(queue.drain(), 2);
        assert!(queue.is_empty());
    }
}
