//! Handle to a live push connection.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{CourierError, CourierResult};

/// Handle to a client connection registered in a session channel slot.
///
/// Cloning the handle shares the same outbound queue and shutdown signal.
/// The connection task owns the receiving half of the queue and watches
/// [`closed`](Self::closed) to terminate.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Unique identifier for this connection.
    pub id: Arc<str>,
    /// Sender for outgoing frames.
    message_tx: mpsc::Sender<String>,
    /// Shutdown signal.
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    /// Creates a new connection handle.
    pub fn new(
        id: impl Into<Arc<str>>,
        message_tx: mpsc::Sender<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            message_tx,
            shutdown,
        }
    }

    /// Creates a handle with a fresh bounded queue of `buffer` frames.
    pub fn channel(id: impl Into<Arc<str>>, buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(id, tx, CancellationToken::new()), rx)
    }

    /// Queues a frame without waiting.
    ///
    /// A full queue means the consumer is too slow; the frame is dropped and
    /// reported as a transport failure.
    pub fn try_send(&self, frame: String) -> CourierResult<()> {
        if self.is_closed() {
            return Err(CourierError::transport("connection closed"));
        }
        self.message_tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                CourierError::transport(format!("send queue full on connection {}", self.id))
            }
            mpsc::error::TrySendError::Closed(_) => CourierError::transport("connection closed"),
        })
    }

    /// Queues a frame, waiting for room.
    pub async fn send(&self, frame: String) -> CourierResult<()> {
        self.message_tx
            .send(frame)
            .await
            .map_err(|_| CourierError::transport("connection closed"))
    }

    /// Signals the connection task to close.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.message_tx.is_closed()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Returns `true` if both handles refer to the same connection.
    pub fn same_as(&self, other: &ConnectionHandle) -> bool {
        self.message_tx.same_channel(&other.message_tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_send_full_queue() {
        let (handle, mut rx) = ConnectionHandle::channel("c1", 1);
        handle.try_send("a".into()).unwrap();
        assert!(matches!(
            handle.try_send("b".into()),
            Err(CourierError::Transport(_))
        ));
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_close_signal() {
        let (handle, _rx) = ConnectionHandle::channel("c1", 4);
        let clone = handle.clone();
        assert!(clone.same_as(&handle));
        handle.close();
        clone.closed().await;
        assert!(clone.is_closed());
        assert!(clone.try_send("x".into()).is_err());
    }
}
