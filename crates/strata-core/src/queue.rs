//! Message queue abstraction for job dispatch.
//!
//! Workers pull JSON job descriptors from a shared queue. The trait models
//! the at-least-once contract of cloud queues: a received message stays
//! in flight until deleted, and a worker that dies without deleting leaves
//! the message for redelivery. The in-memory implementation covers tests
//! and local runs; it does not implement a redelivery timer.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// A received message with its deletion handle.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Handle used to delete the message after successful processing.
    pub handle: String,
    /// The message body (a JSON job descriptor).
    pub body: String,
}

/// A point-to-point message queue.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueues a message body.
    async fn send(&self, body: String) -> Result<()>;

    /// Receives one message, or `None` if the queue is empty.
    ///
    /// The message becomes in-flight and must be deleted once processed.
    async fn receive(&self) -> Result<Option<QueueMessage>>;

    /// Deletes an in-flight message.
    async fn delete(&self, handle: &str) -> Result<()>;
}

/// In-memory FIFO queue for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryMessageQueue {
    inner: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    next_handle: u64,
}

impl InMemoryMessageQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of messages waiting to be received.
    ///
    /// In-flight messages are not counted.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().map_or(0, |state| state.pending.len())
    }

    /// Returns the number of received-but-not-deleted messages.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().map_or(0, |state| state.in_flight.len())
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn send(&self, body: String) -> Result<()> {
        let mut state = self.inner.lock().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        state.next_handle += 1;
        let handle = format!("msg-{}", state.next_handle);
        state.pending.push_back(QueueMessage { handle, body });
        Ok(())
    }

    async fn receive(&self) -> Result<Option<QueueMessage>> {
        let mut state = self.inner.lock().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        let Some(message) = state.pending.pop_front() else {
            return Ok(None);
        };
        state
            .in_flight
            .insert(message.handle.clone(), message.clone());
        Ok(Some(message))
    }

    async fn delete(&self, handle: &str) -> Result<()> {
        let mut state = self.inner.lock().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        state.in_flight.remove(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_receive_delete_roundtrip() {
        let queue = InMemoryMessageQueue::new();
        queue.send("a".into()).await.expect("send");
        queue.send("b".into()).await.expect("send");
        assert_eq!(queue.pending_count(), 2);

        let first = queue.receive().await.expect("receive").expect("message");
        assert_eq!(first.body, "a", "FIFO order");
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.in_flight_count(), 1);

        queue.delete(&first.handle).await.expect("delete");
        assert_eq!(queue.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn receive_from_empty_queue_returns_none() {
        let queue = InMemoryMessageQueue::new();
        assert!(queue.receive().await.expect("receive").is_none());
    }
}
