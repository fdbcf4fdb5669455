//! Job queue transport
//!
//! FIFO per queue name, pop-once delivery: a dequeued message is gone even
//! if the consumer dies before finishing it. `dequeue` waits at most one
//! poll interval so callers get a chance to check for cancellation.

pub mod jetstream;
#[cfg(test)]
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::QueueMessage;

pub use jetstream::JetStreamQueue;

/// Queue carrying bulk-applications jobs
pub const BULK_APPLICATIONS_QUEUE: &str = "bulk_applications";

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Push to the tail of `queue_name`. Fails if the broker did not accept it.
    async fn enqueue(&self, message: &QueueMessage, queue_name: &str) -> Result<()>;

    /// Pop the head of `queue_name`, or `None` when nothing arrived within
    /// the poll interval.
    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueMessage>>;
}
