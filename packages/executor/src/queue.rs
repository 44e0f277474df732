//! Bounded multi-consumer job queue.
//!
//! Admission is non-blocking: `try_push` fails immediately at capacity so
//! callers can shed load instead of waiting. Workers block on `pop` until an
//! item arrives or the queue is closed.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct JobQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> JobQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueues the item, or hands it back when the queue is full or closed.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed || inner.items.len() >= self.capacity {
                return Err(item);
            }
            inner.items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Waits for the next item in FIFO order. Returns `None` once the queue
    /// is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Closes the queue; queued items still drain, waiting consumers wake up.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
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
    async fn push_then_pop_is_fifo() {
        let queue = JobQueue::new(3);
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        queue.try_push(3).unwrap();

        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, Some(3));
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let queue = JobQueue::new(1);
        queue.try_push("a").unwrap();

        assert_eq!(queue.try_push("b"), Err("b"));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = Arc::new(JobQueue::new(1));

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.try_push(7).unwrap();

        assert_eq!(waiter.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = Arc::new(JobQueue::new(2));
        queue.try_push(1).unwrap();
        queue.close();

        assert_eq!(queue.try_push(2), Err(2));
        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumers() {
        let queue = Arc::new(JobQueue::<u8>::new(1));

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        assert_eq!(waiter.await.unwrap(), None);
    }
}
