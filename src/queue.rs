//! Message queue access for conversion jobs.
//!
//! The worker talks to its queues through [`QueueClient`]. The production
//! implementation, [`RedisQueue`], keeps each queue as a Redis list of JSON
//! envelopes. Receiving moves a message into a companion processing list so
//! that it is only gone for good once [`QueueClient::delete`] acknowledges it.

use crate::error::QueueError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Suffix of the list holding received but not yet deleted messages.
const PROCESSING_SUFFIX: &str = ":processing";

/// Queue wire envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub sent_at: DateTime<Utc>,
}

impl QueueMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body: body.into(),
            attributes: HashMap::new(),
            sent_at: Utc::now(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A message handed out by [`QueueClient::receive_one`].
///
/// The receipt is opaque to the caller and must be passed back unchanged to
/// delete the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub receipt: String,
    pub message: QueueMessage,
}

/// Receive/delete/send operations against named queues.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Takes at most one message from `queue`.
    ///
    /// # Arguments
    /// * `queue` - Name of the queue to read from
    ///
    /// # Returns
    /// The message and its receipt, or `Ok(None)` when the queue is empty.
    async fn receive_one(&self, queue: &str) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Acknowledges a received message so it is never delivered again.
    async fn delete(&self, queue: &str, message: &ReceivedMessage) -> Result<(), QueueError>;

    /// Appends a message to `queue`.
    async fn send_message(&self, queue: &str, message: QueueMessage) -> Result<(), QueueError>;
}

/// Redis-backed queue.
///
/// Queues are lists used LPUSH-in / RPOP-out. A received message is moved
/// atomically to `{queue}:processing` and its raw JSON doubles as receipt.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    /// Seconds to block waiting for a message; 0 returns immediately.
    wait_secs: u64,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager, wait_secs: u64) -> Self {
        Self { conn, wait_secs }
    }

    fn processing_key(queue: &str) -> String {
        format!("{}{}", queue, PROCESSING_SUFFIX)
    }

    /// Submits a conversion job. Used by producers and for local testing.
    ///
    /// # Arguments
    /// * `queue` - Input queue of the worker
    /// * `action` - Conversion token, e.g. `ToText`
    /// * `file_url` - Where the worker fetches the PDF from
    /// * `task_id` - Correlation id echoed on the notification
    pub async fn enqueue_job(
        &self,
        queue: &str,
        action: &str,
        file_url: &str,
        task_id: &str,
    ) -> Result<(), QueueError> {
        let message = QueueMessage::new("")
            .with_attribute(crate::job::ATTR_ACTION, action)
            .with_attribute(crate::job::ATTR_FILE_URL, file_url)
            .with_attribute(crate::job::ATTR_TASK_ID, task_id);

        self.send_message(queue, message).await
    }

    /// Number of messages waiting in `queue`.
    pub async fn queue_length(&self, queue: &str) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(queue).await?;
        Ok(len)
    }

    /// Number of received messages not yet deleted.
    pub async fn in_flight(&self, queue: &str) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(Self::processing_key(queue)).await?;
        Ok(len)
    }

    /// Moves every message left in `{queue}:processing` back onto `queue`.
    ///
    /// Messages stay in the processing list when a previous run died between
    /// receive and delete. Call this before draining, while no other worker
    /// holds messages from the same queue.
    ///
    /// # Returns
    /// The number of messages put back.
    pub async fn requeue_in_flight(&self, queue: &str) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let processing = Self::processing_key(queue);

        let mut moved = 0;
        loop {
            let raw: Option<String> = conn.rpoplpush(&processing, queue).await?;
            if raw.is_none() {
                break;
            }
            moved += 1;
        }

        if moved > 0 {
            info!("Requeued in-flight messages: queue={}, count={}", queue, moved);
        }
        Ok(moved)
    }
}

#[async_trait]
impl QueueClient for RedisQueue {
    async fn receive_one(&self, queue: &str) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut conn = self.conn.clone();
        let processing = Self::processing_key(queue);

        let raw: Option<String> = if self.wait_secs == 0 {
            conn.rpoplpush(queue, &processing).await?
        } else {
            redis::cmd("BRPOPLPUSH")
                .arg(queue)
                .arg(&processing)
                .arg(self.wait_secs)
                .query_async(&mut conn)
                .await?
        };

        let Some(raw) = raw else {
            debug!("Queue {} is empty", queue);
            return Ok(None);
        };

        let message: QueueMessage = match serde_json::from_str(&raw) {
            Ok(message) => message,
            Err(e) => {
                // Never leave garbage in the processing list
                conn.lrem::<_, _, ()>(&processing, 1, &raw).await?;
                return Err(QueueError::Decode(e));
            }
        };

        debug!("Received message: id={}, queue={}", message.id, queue);
        Ok(Some(ReceivedMessage {
            receipt: raw,
            message,
        }))
    }

    async fn delete(&self, queue: &str, message: &ReceivedMessage) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let removed: usize = conn
            .lrem(Self::processing_key(queue), 1, &message.receipt)
            .await?;

        debug!(
            "Deleted message: id={}, queue={}, removed={}",
            message.message.id, queue, removed
        );
        Ok(())
    }

    async fn send_message(&self, queue: &str, message: QueueMessage) -> Result<(), QueueError> {
        let json = serde_json::to_string(&message).map_err(QueueError::Encode)?;

        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue, &json).await?;

        info!("Sent message: id={}, queue={}", message.id, queue);
        Ok(())
    }
}
