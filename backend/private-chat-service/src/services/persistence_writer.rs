//! Background writer that records broadcast messages.
//!
//! The live path only enqueues; it never waits for the store. Write order
//! can therefore differ from broadcast order, which readers tolerate by
//! sorting on timestamp.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::metrics::PERSISTENCE_FAILURES;
use crate::models::Message;
use crate::repository::{AppendOutcome, MessageRepository, StoreError};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct PersistenceWriter {
    tx: UnboundedSender<Message>,
}

impl PersistenceWriter {
    /// Start the writer task. It runs until every `PersistenceWriter`
    /// clone is dropped and the queue is drained.
    pub fn spawn(repository: Arc<dyn MessageRepository>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = unbounded_channel();
        let handle = tokio::spawn(run(repository, rx));
        (Self { tx }, handle)
    }

    /// Queue a message for durable storage. Returns `false` only when the
    /// writer task has stopped.
    pub fn enqueue(&self, message: Message) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(err) => {
                error!(message_id = %err.0.message_id, "persistence writer is gone; message not stored");
                PERSISTENCE_FAILURES.inc();
                false
            }
        }
    }
}

fn is_transient(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Database(
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        )
    )
}

async fn run(repository: Arc<dyn MessageRepository>, mut rx: UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        store(repository.as_ref(), &message).await;
    }
    debug!("persistence writer stopped");
}

async fn store(repository: &dyn MessageRepository, message: &Message) {
    let mut attempt = 1;
    loop {
        match repository.append(message).await {
            Ok(AppendOutcome::Inserted) => {
                debug!(message_id = %message.message_id, "message stored");
                return;
            }
            Ok(AppendOutcome::Duplicate) => {
                debug!(message_id = %message.message_id, "message already stored");
                return;
            }
            Err(err) if is_transient(&err) && attempt < MAX_ATTEMPTS => {
                warn!(message_id = %message.message_id, attempt, error = %err, "retrying message append");
                tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                attempt += 1;
            }
            Err(err) => {
                error!(message_id = %message.message_id, error = %err, "failed to store message");
                PERSISTENCE_FAILURES.inc();
                return;
            }
        }
    }
}
