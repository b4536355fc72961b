//! Asynchronous delivery of raw bridge messages
//!
//! The platform's script-message callback runs outside the navigation flow.
//! It pushes raw JSON onto a bounded queue; a tokio task drains the queue and
//! hands each message to the session.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Producer side handed to the platform message callback
#[derive(Clone)]
pub struct BridgeSender {
    tx: mpsc::Sender<String>,
}

impl BridgeSender {
    /// Queue a message, waiting for room
    pub async fn send(&self, raw: impl Into<String>) -> bool {
        self.tx.send(raw.into()).await.is_ok()
    }

    /// Queue a message without waiting; dropped when the queue is full
    pub fn try_send(&self, raw: impl Into<String>) -> bool {
        match self.tx.try_send(raw.into()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Bridge queue full, dropping script message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Spawn the draining task. Must be called from inside a tokio runtime.
///
/// The task ends once every [`BridgeSender`] is dropped and yields the
/// number of messages it delivered.
pub fn spawn_listener<F>(capacity: usize, mut deliver: F) -> (BridgeSender, JoinHandle<usize>)
where
    F: FnMut(&str) + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));
    let task = tokio::spawn(async move {
        let mut delivered = 0;
        while let Some(raw) = rx.recv().await {
            deliver(&raw);
            delivered += 1;
        }
        log::debug!("Bridge listener stopped after {} message(s)", delivered);
        delivered
    });
    (BridgeSender { tx }, task)
}
