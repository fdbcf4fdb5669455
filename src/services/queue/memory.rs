//! In-process queue used by tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::QueueTransport;
use crate::types::QueueMessage;

pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<QueueMessage>>>,
    notify: Notify,
    poll_interval: Duration,
    fail_enqueue: AtomicBool,
}

impl InMemoryQueue {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            poll_interval,
            fail_enqueue: AtomicBool::new(false),
        }
    }

    /// Make every following `enqueue` fail
    pub fn set_fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    pub fn queued(&self, queue_name: &str) -> usize {
        self.queues.lock().get(queue_name).map_or(0, VecDeque::len)
    }

    fn pop(&self, queue_name: &str) -> Option<QueueMessage> {
        self.queues.lock().get_mut(queue_name)?.pop_front()
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn enqueue(&self, message: &QueueMessage, queue_name: &str) -> Result<()> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            bail!("queue '{}' unavailable", queue_name);
        }

        self.queues
            .lock()
            .entry(queue_name.to_string())
            .or_default()
            .push_back(message.clone());
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueMessage>> {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            if let Some(message) = self.pop(queue_name) {
                return Ok(Some(message));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified()).await.is_err() {
                return Ok(self.pop(queue_name));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BulkApplicationsPayload, JobPayload, JobRecord};
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    fn message(n: u128) -> QueueMessage {
        let payload = JobPayload::BulkApplications(BulkApplicationsPayload::default());
        let job = JobRecord::new(Uuid::from_u128(n), &payload).unwrap();
        QueueMessage::new(&job, "q")
    }

    #[tokio::test]
    async fn test_fifo_per_queue() {
        let queue = InMemoryQueue::new(Duration::from_millis(10));
        assert_ok!(queue.enqueue(&message(1), "q").await);
        assert_ok!(queue.enqueue(&message(2), "q").await);
        assert_ok!(queue.enqueue(&message(3), "other").await);

        assert_eq!(queue.dequeue("q").await.unwrap().unwrap().id, Uuid::from_u128(1));
        assert_eq!(queue.dequeue("q").await.unwrap().unwrap().id, Uuid::from_u128(2));
        assert_eq!(queue.queued("other"), 1);
    }

    #[tokio::test]
    async fn test_message_is_popped_once() {
        let queue = InMemoryQueue::new(Duration::from_millis(10));
        queue.enqueue(&message(1), "q").await.unwrap();

        assert!(queue.dequeue("q").await.unwrap().is_some());
        assert!(queue.dequeue("q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_times_out_with_none() {
        let queue = InMemoryQueue::new(Duration::from_millis(20));
        let started = std::time::Instant::now();

        assert!(queue.dequeue("empty").await.unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = std::sync::Arc::new(InMemoryQueue::new(Duration::from_secs(5)));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue("q").await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(&message(7), "q").await.unwrap();

        let got = consumer.await.unwrap().unwrap();
        assert_eq!(got.unwrap().id, Uuid::from_u128(7));
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_reported() {
        let queue = InMemoryQueue::new(Duration::from_millis(10));
        queue.set_fail_enqueue(true);
        assert_err!(queue.enqueue(&message(1), "q").await);
        assert_eq!(queue.queued("q"), 0);
    }
}
