//! Buffer flushing.
//!
//! A queue whose interface names a `send.buffer` has its buffered sends
//! redirected to that buffer queue (see [`MessageQueue::send`]). Flushing
//! drains the buffer and replays every message into the real queue with the
//! buffer bypassed.

use crate::engine::MessageQueue;
use crate::error::QueueError;
use crate::message::{Envelope, QueueName, ReceiveOptions};
use crate::registry::ResolvedInterface;
use tracing::{debug, info, instrument, warn};

impl MessageQueue {
    /// Replay everything buffered for `queue` into `queue`.
    ///
    /// Returns the number of messages replayed; a queue without a buffer
    /// flushes nothing. Replay order is the buffer backend's receive order.
    ///
    /// Every drained message is handled before returning. Undecodable
    /// messages run the buffer's error pipeline, and a message whose replay
    /// fails goes back into the buffer. The first failure is returned after
    /// the whole batch has been handled.
    #[instrument(skip(self))]
    pub async fn flush(&self, queue: &str) -> Result<usize, QueueError> {
        let resolved = self.registry.resolve(queue)?;
        let Some(buffer) = resolved.config.send.buffer.as_deref() else {
            debug!(queue = %queue, "Queue has no buffer, nothing to flush");
            return Ok(0);
        };

        let buffered = self.registry.resolve(buffer)?;
        let buffer_name = QueueName::new(buffer)?;
        let backend = self.backends.require(&buffered.backend)?;

        let messages = backend
            .receive(Some(&buffer_name), &buffered.config, &ReceiveOptions::new())
            .await?;

        let mut replayed = 0;
        let mut first_error = None;
        for stored in messages {
            match self.replay(queue, &buffer_name, stored, &buffered).await {
                Ok(true) => replayed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        queue = %queue,
                        buffer = %buffer_name,
                        error = %e,
                        "Buffered message was not replayed"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(queue = %queue, buffer = %buffer_name, count = replayed, "Flushed buffered messages");
        match first_error {
            Some(e) => Err(e),
            None => Ok(replayed),
        }
    }

    async fn replay(
        &self,
        queue: &str,
        buffer: &QueueName,
        stored: Envelope,
        buffered: &ResolvedInterface,
    ) -> Result<bool, QueueError> {
        let Some(envelope) = self.decode_received(stored.clone(), buffered).await? else {
            return Ok(false);
        };

        if let Err(e) = self.send_unbuffered(queue, envelope.resend_copy()).await {
            self.store_encoded(buffer.as_str(), stored.resend_copy()).await?;
            return Err(e);
        }
        Ok(true)
    }
}

#[cfg(test)]
#[path = "buffering_tests.rs"]
mod tests;
