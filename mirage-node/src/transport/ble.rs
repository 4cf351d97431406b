//! BLE transport: write a frame to the request characteristic, wait for the
//! reply frame on the response characteristic's notifications.
//!
//! The camera answers one request at a time, so there is a single reply slot
//! instead of id-based correlation. A background task owns the notification
//! stream and reassembles frames from notification chunks.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::{Stream, StreamExt};
use mirage_proto::{FrameAssembler, FramingError, frame};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{Outgoing, Transport, TransportKind};
use crate::TransportError;

/// Write access to the camera's request characteristic
#[async_trait::async_trait]
pub trait GattWriter: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;
}

type Reply = Result<Vec<u8>, FramingError>;

enum Slot {
    Idle,
    Waiting(oneshot::Sender<Reply>),
    Closed,
}

type SharedSlot = Arc<Mutex<Slot>>;

fn lock(slot: &SharedSlot) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct BleTransport<W> {
    writer: W,
    slot: SharedSlot,
    pump: JoinHandle<()>,
}

impl<W: GattWriter> BleTransport<W> {
    /// `notifications` yields the raw values delivered on the response
    /// characteristic. Must be called inside a tokio runtime.
    pub fn new<S>(writer: W, notifications: S) -> Self
    where
        S: Stream<Item = Vec<u8>> + Send + 'static,
    {
        let slot: SharedSlot = Arc::new(Mutex::new(Slot::Idle));
        let pump = tokio::spawn(pump(notifications, slot.clone()));
        Self { writer, slot, pump }
    }

    /// True once the notification stream has ended
    pub fn is_closed(&self) -> bool {
        matches!(*lock(&self.slot), Slot::Closed)
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl<W> Drop for BleTransport<W> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump<S>(notifications: S, slot: SharedSlot)
where
    S: Stream<Item = Vec<u8>> + Send,
{
    let mut notifications = std::pin::pin!(notifications);
    let mut assembler = FrameAssembler::new();

    while let Some(chunk) = notifications.next().await {
        tracing::trace!(bytes = chunk.len(), "notification");
        let reply = match assembler.push(&chunk) {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => continue,
            Err(e) => Err(e),
        };

        let waiter = match std::mem::replace(&mut *lock(&slot), Slot::Idle) {
            Slot::Waiting(tx) => Some(tx),
            _ => None,
        };
        match waiter {
            // The receiver is gone when its send timed out
            Some(tx) => {
                if tx.send(reply).is_err() {
                    tracing::warn!("reply arrived after its request gave up; discarded");
                }
            }
            None => tracing::warn!("notification with no request waiting; discarded"),
        }
    }

    tracing::debug!(pending = assembler.pending(), "notification stream ended");
    *lock(&slot) = Slot::Closed;
}

#[async_trait::async_trait]
impl<W: GattWriter> Transport for BleTransport<W> {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    async fn send(&self, outgoing: Outgoing) -> Result<Vec<u8>, TransportError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = lock(&self.slot);
            let busy = match &*slot {
                Slot::Closed => return Err(TransportError::NotificationsClosed),
                Slot::Waiting(other) => !other.is_closed(),
                Slot::Idle => false,
            };
            if busy {
                return Err(TransportError::Busy);
            }
            *slot = Slot::Waiting(tx);
        }

        let frame = frame::encode(&outgoing.body);
        tracing::debug!(payload = outgoing.body.len(), frame = frame.len(), "writing request");
        if let Err(e) = self.writer.write(&frame).await {
            let mut slot = lock(&self.slot);
            if matches!(*slot, Slot::Waiting(_)) {
                *slot = Slot::Idle;
            }
            return Err(e);
        }

        let raw = rx.await.map_err(|_| TransportError::NotificationsClosed)??;
        Ok(frame::decode(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    /// Records writes and answers each with a scripted notification
    struct Echo {
        writes: Mutex<Vec<Vec<u8>>>,
        replies: Mutex<Vec<Vec<Vec<u8>>>>,
        notify: mpsc::UnboundedSender<Vec<u8>>,
    }

    #[async_trait::async_trait]
    impl GattWriter for Echo {
        async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
            self.writes.lock().unwrap().push(data.to_vec());
            let chunks = self.replies.lock().unwrap().remove(0);
            for chunk in chunks {
                self.notify.unbounded_send(chunk).unwrap();
            }
            Ok(())
        }
    }

    fn transport(replies: Vec<Vec<Vec<u8>>>) -> (BleTransport<Echo>, mpsc::UnboundedSender<Vec<u8>>) {
        let (notify, notifications) = mpsc::unbounded();
        let writer = Echo {
            writes: Mutex::new(Vec::new()),
            replies: Mutex::new(replies),
            notify: notify.clone(),
        };
        (BleTransport::new(writer, notifications), notify)
    }

    #[tokio::test]
    async fn writes_framed_and_returns_decoded_reply() {
        let (ble, _notify) = transport(vec![vec![frame::encode(b"pong\x00\x00")]]);

        let reply = ble.send(Outgoing::new(b"ping\x00\x01".to_vec())).await.unwrap();
        assert_eq!(reply, b"pong\x00\x00");
        assert_eq!(ble.writer().writes.lock().unwrap()[0], frame::encode(b"ping\x00\x01"));
    }

    #[tokio::test]
    async fn reply_split_across_notifications() {
        let encoded = frame::encode(b"a longer reply");
        let (head, tail) = encoded.split_at(5);
        let (ble, _notify) = transport(vec![vec![head.to_vec(), tail.to_vec()]]);

        assert_eq!(ble.send(Outgoing::new(vec![1])).await.unwrap(), b"a longer reply");
    }

    #[tokio::test]
    async fn orphan_notification_is_discarded() {
        let (ble, notify) = transport(vec![vec![frame::encode(b"mine")]]);

        notify.unbounded_send(frame::encode(b"stray")).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(ble.send(Outgoing::new(vec![1])).await.unwrap(), b"mine");
    }

    #[tokio::test]
    async fn stream_end_closes_the_transport() {
        let (ble, notify) = transport(vec![]);
        notify.close_channel();

        while !ble.is_closed() {
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            ble.send(Outgoing::new(vec![1])).await,
            Err(TransportError::NotificationsClosed)
        ));
    }

    #[tokio::test]
    async fn bare_terminator_is_an_empty_reply() {
        let (ble, _notify) = transport(vec![vec![vec![0x00, 0x00]]]);
        assert_eq!(ble.send(Outgoing::new(vec![1])).await.unwrap(), Vec::<u8>::new());
    }
}
