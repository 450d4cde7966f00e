//! Bounded webhook work queue.
//!
//! The webhook handler acknowledges immediately and hands the payload to a
//! single background worker over a bounded channel. A full queue drops the
//! payload with a warning rather than blocking the acknowledgment; the
//! provider's retry policy is the recovery path.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domains::approval::{WebhookEventRouter, WebhookPayload};

pub const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<WebhookPayload>,
}

impl EventQueue {
    pub fn bounded(depth: usize) -> (Self, mpsc::Receiver<WebhookPayload>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }

    /// Non-blocking enqueue; drops the payload when the queue is saturated.
    pub fn enqueue(&self, payload: WebhookPayload) {
        match self.tx.try_send(payload) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("webhook queue full, dropping payload");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("webhook worker stopped, dropping payload");
            }
        }
    }
}

/// Drain the queue until every sender is dropped.
pub fn spawn_event_worker(
    mut rx: mpsc::Receiver<WebhookPayload>,
    router: WebhookEventRouter,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("webhook event worker started");
        while let Some(payload) = rx.recv().await {
            router.process_payload(payload).await;
        }
        info!("webhook event worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_drops_when_full_without_blocking() {
        let (queue, mut rx) = EventQueue::bounded(1);
        queue.enqueue(WebhookPayload { entry: vec![] });
        queue.enqueue(WebhookPayload { entry: vec![] });

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }
}
