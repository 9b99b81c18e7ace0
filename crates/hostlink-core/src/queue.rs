//! Pending outbound queue and concurrency budget.

use crate::error::ChannelError;
use crossbeam_queue::SegQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Envelope waiting for a successful write.
#[derive(Debug, Clone)]
pub struct Pending<T> {
    pub envelope: T,
    pub enqueued_at: Instant,
    /// Failed write attempts so far.
    pub attempts: u32,
}

/// Queue statistics counters.
#[derive(Debug, Default)]
pub struct QueueStats {
    pub pending_count: AtomicUsize,
    pub in_flight_count: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub sent_count: AtomicU64,
    pub failed_count: AtomicU64,
    pub requeued_count: AtomicU64,
    pub dropped_count: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    pub pending: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub sent: u64,
    pub failed: u64,
    pub requeued: u64,
    pub dropped: u64,
}

/// Unbounded FIFO of envelopes plus the permits bounding in-flight sends.
///
/// Entries leave the queue only through `pop`; a failed write puts the
/// entry back at the tail with `requeue`. There is no retry limit and no
/// expiry.
pub struct PendingQueue<T> {
    entries: SegQueue<Pending<T>>,
    semaphore: Arc<Semaphore>,
    budget: usize,
    stats: Arc<QueueStats>,
}

impl<T> PendingQueue<T> {
    pub fn new(budget: usize) -> Self {
        Self {
            entries: SegQueue::new(),
            semaphore: Arc::new(Semaphore::new(budget)),
            budget,
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Append an envelope. Never blocks, never fails.
    pub fn push(&self, envelope: T) {
        self.stats.pending_count.fetch_add(1, Ordering::Relaxed);
        self.entries.push(Pending {
            envelope,
            enqueued_at: Instant::now(),
            attempts: 0,
        });
    }

    /// Put a failed entry back at the tail.
    pub fn requeue(&self, mut pending: Pending<T>) {
        pending.attempts = pending.attempts.saturating_add(1);
        self.stats.pending_count.fetch_add(1, Ordering::Relaxed);
        self.entries.push(pending);
        self.stats.requeued_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pop(&self) -> Option<Pending<T>> {
        let pending = self.entries.pop()?;
        self.stats.pending_count.fetch_sub(1, Ordering::Relaxed);
        Some(pending)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Wait for a concurrency permit.
    ///
    /// Fails only after `close`, which happens on shutdown.
    pub async fn acquire_slot(&self) -> Result<SendSlot, ChannelError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ChannelError::Shutdown)?;

        let in_flight = self.stats.in_flight_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats
            .peak_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        Ok(SendSlot {
            _permit: permit,
            stats: self.stats.clone(),
        })
    }

    pub fn mark_sent(&self) {
        self.stats.sent_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_failed(&self) {
        self.stats.failed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// An envelope that will never be retried (it could not be serialized).
    pub fn mark_dropped(&self) {
        self.stats.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Stop handing out permits. Pending entries are left for the drop.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            pending: self.stats.pending_count.load(Ordering::Relaxed),
            in_flight: self.stats.in_flight_count.load(Ordering::SeqCst),
            peak_in_flight: self.stats.peak_in_flight.load(Ordering::SeqCst),
            sent: self.stats.sent_count.load(Ordering::Relaxed),
            failed: self.stats.failed_count.load(Ordering::Relaxed),
            requeued: self.stats.requeued_count.load(Ordering::Relaxed),
            dropped: self.stats.dropped_count.load(Ordering::Relaxed),
        }
    }
}

/// One in-flight send attempt. Dropping it returns the permit, whatever
/// the outcome of the attempt.
pub struct SendSlot {
    _permit: OwnedSemaphorePermit,
    stats: Arc<QueueStats>,
}

impl Drop for SendSlot {
    fn drop(&mut self) {
        self.stats.in_flight_count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn pops_in_push_order() {
        let queue = PendingQueue::new(5);
        for seq in 0..4 {
            queue.push(seq);
        }

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|pending| pending.envelope)
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn requeue_goes_to_the_back() {
        let queue = PendingQueue::new(5);
        queue.push("a");
        queue.push("b");

        let failed = queue.pop().unwrap();
        queue.push("c");
        queue.requeue(failed);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|pending| (pending.envelope, pending.attempts))
            .collect();
        assert_eq!(order, vec![("b", 0), ("c", 0), ("a", 1)]);

        let stats = queue.stats();
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn slots_release_on_drop() {
        let queue = PendingQueue::<()>::new(2);
        let first = queue.acquire_slot().await.unwrap();
        let second = queue.acquire_slot().await.unwrap();
        assert_eq!(queue.stats().in_flight, 2);

        let blocked = tokio::time::timeout(Duration::from_millis(20), queue.acquire_slot()).await;
        assert!(blocked.is_err(), "third slot must wait for a release");

        drop(first);
        let third = queue.acquire_slot().await.unwrap();
        assert_eq!(queue.stats().in_flight, 2);
        assert_eq!(queue.stats().peak_in_flight, 2);

        drop(second);
        drop(third);
        assert_eq!(queue.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn closed_queue_refuses_slots() {
        let queue = PendingQueue::<()>::new(1);
        queue.close();
        assert!(matches!(
            queue.acquire_slot().await,
            Err(ChannelError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn concurrent_producers_lose_nothing() {
        let queue = Arc::new(PendingQueue::new(5));
        let mut producers = Vec::new();
        for producer in 0..8u32 {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                for seq in 0..250u32 {
                    queue.push((producer, seq));
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        let mut last_seen = [None::<u32>; 8];
        let mut total = 0;
        while let Some(pending) = queue.pop() {
            let (producer, seq) = pending.envelope;
            let slot = &mut last_seen[producer as usize];
            assert!(slot.is_none_or(|last| last < seq), "per-producer order kept");
            *slot = Some(seq);
            total += 1;
        }
        assert_eq!(total, 2_000);
    }
}
