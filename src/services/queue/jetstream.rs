//! JetStream-backed queue transport
//!
//! ## Stream
//! - `AGRO_JOBS` - work-queue retention, one subject per queue
//!   (`agro.queue.<name>`) and one durable pull consumer per queue.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_nats::jetstream::{self, consumer::PullConsumer, Context as JsContext};
use async_nats::Client;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::QueueTransport;
use crate::types::QueueMessage;

const STREAM_NAME: &str = "AGRO_JOBS";
const SUBJECT_PREFIX: &str = "agro.queue";

fn subject_for(queue_name: &str) -> String {
    format!("{}.{}", SUBJECT_PREFIX, queue_name)
}

/// Durable names may not contain `.`
fn consumer_name_for(queue_name: &str) -> String {
    format!("agro_{}_workers", queue_name.replace('.', "_"))
}

pub struct JetStreamQueue {
    js: JsContext,
    poll_interval: Duration,
    consumers: Mutex<HashMap<String, PullConsumer>>,
}

impl JetStreamQueue {
    /// Connect to JetStream and make sure the job stream exists
    pub async fn new(client: Client, poll_interval: Duration) -> Result<Self> {
        let js = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: STREAM_NAME.to_string(),
            subjects: vec![format!("{}.>", SUBJECT_PREFIX)],
            max_bytes: 256 * 1024 * 1024,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };
        js.get_or_create_stream(stream_config).await?;
        info!("JetStream job stream '{}' ready", STREAM_NAME);

        Ok(Self {
            js,
            poll_interval,
            consumers: Mutex::new(HashMap::new()),
        })
    }

    async fn consumer(&self, queue_name: &str) -> Result<PullConsumer> {
        if let Some(consumer) = self.consumers.lock().get(queue_name) {
            return Ok(consumer.clone());
        }

        let name = consumer_name_for(queue_name);
        let stream = self.js.get_stream(STREAM_NAME).await?;
        let consumer_config = jetstream::consumer::pull::Config {
            durable_name: Some(name.clone()),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            filter_subject: subject_for(queue_name),
            ..Default::default()
        };
        let consumer: PullConsumer = stream.get_or_create_consumer(&name, consumer_config).await?;
        info!("JetStream consumer '{}' ready", name);

        self.consumers
            .lock()
            .insert(queue_name.to_string(), consumer.clone());
        Ok(consumer)
    }
}

#[async_trait]
impl QueueTransport for JetStreamQueue {
    async fn enqueue(&self, message: &QueueMessage, queue_name: &str) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.js
            .publish(subject_for(queue_name), payload.into())
            .await?
            .await?;

        debug!("Enqueued job {} on '{}'", message.id, queue_name);
        Ok(())
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueMessage>> {
        let consumer = self.consumer(queue_name).await?;

        let mut batch = consumer
            .batch()
            .max_messages(1)
            .expires(self.poll_interval)
            .messages()
            .await
            .map_err(|e| anyhow!("failed to pull from '{}': {}", queue_name, e))?;

        let msg = match batch.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return Err(anyhow!("failed to receive from '{}': {}", queue_name, e)),
            None => return Ok(None),
        };

        // Pop-once: ack before the job is looked at
        if let Err(e) = msg.ack().await {
            error!("Failed to ack message on '{}': {:?}", queue_name, e);
        }

        let message: QueueMessage = serde_json::from_slice(&msg.payload)?;
        Ok(Some(message))
    }
}
