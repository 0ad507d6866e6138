//! FIFO intake queue shared by submitters and worker slots.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

use reelcut_models::JobId;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct IntakeState {
    items: VecDeque<JobId>,
    closed: bool,
}

/// Unbounded multi-producer, multi-consumer FIFO of job IDs.
#[derive(Debug, Default)]
pub struct IntakeQueue {
    state: Mutex<IntakeState>,
    notify: Notify,
}

impl IntakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job ID. Fails once the queue is closed.
    pub fn push(&self, id: JobId) -> StoreResult<()> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(StoreError::Closed);
            }
            state.items.push_back(id);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next job ID. Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<JobId> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(id) = state.items.pop_front() {
                    let more = !state.items.is_empty();
                    drop(state);
                    if more {
                        // Pass the wakeup on so another idle slot sees the rest.
                        self.notify.notify_one();
                    }
                    return Some(id);
                }
            }

            notified.await;
        }
    }

    /// Remove a queued ID without dispatching it.
    pub fn remove(&self, id: &JobId) -> bool {
        let mut state = self.state.lock();
        let before = state.items.len();
        state.items.retain(|queued| queued != id);
        state.items.len() != before
    }

    /// Stop accepting work and wake every waiting consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = IntakeQueue::new();
        let ids: Vec<JobId> = (0..3).map(|_| JobId::new()).collect();
        for id in &ids {
            queue.push(id.clone()).unwrap();
        }
        for id in &ids {
            assert_eq!(queue.pop().await.as_ref(), Some(id));
        }
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(IntakeQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let id = JobId::new();
        queue.push(id.clone()).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(id));
    }

    #[tokio::test]
    async fn test_remove_and_close() {
        let queue = Arc::new(IntakeQueue::new());
        let a = JobId::new();
        let b = JobId::new();
        queue.push(a.clone()).unwrap();
        queue.push(b.clone()).unwrap();
        assert!(queue.remove(&a));
        assert!(!queue.remove(&a));
        assert_eq!(queue.pop().await, Some(b));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.pop().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        for w in waiters {
            let got = tokio::time::timeout(Duration::from_secs(1), w).await.unwrap().unwrap();
            assert_eq!(got, None);
        }
        assert!(matches!(queue.push(JobId::new()), Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn test_many_consumers_each_item_once() {
        let queue = Arc::new(IntakeQueue::new());
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut got = Vec::new();
                    while let Some(id) = queue.pop().await {
                        got.push(id);
                    }
                    got
                })
            })
            .collect();

        let ids: Vec<JobId> = (0..40).map(|_| JobId::new()).collect();
        for id in &ids {
            queue.push(id.clone()).unwrap();
        }
        while !queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        queue.close();

        let mut all = Vec::new();
        for c in consumers {
            all.extend(c.await.unwrap());
        }
        all.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(all, expected);
    }
}
