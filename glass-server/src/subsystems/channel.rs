//! Bounded event channel between the DHCP request path and the writer
//!
//! Producers never wait: `enqueue` either hands the event over immediately or
//! drops it with a warning. A single `EventReceiver` drains in FIFO order
//! until it sees the shutdown sentinel.

use glass_core::TransactionBundle;
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Request received, before the server acts on it.
    Pre,
    /// Response computed, before it is sent.
    Post,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Pre => "pre",
            Stage::Post => "post",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
enum Envelope {
    Event(Stage, Box<TransactionBundle>),
    Shutdown,
}

/// Producer half. Cheap to clone, safe to use from many threads.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Envelope>,
}

/// Consumer half. Exactly one exists per channel.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Envelope>,
}

/// `capacity` must be at least 1.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx }, EventReceiver { rx })
}

impl EventSender {
    /// Hand an event to the writer. Returns `false` if it was dropped.
    pub fn enqueue(&self, stage: Stage, bundle: TransactionBundle) -> bool {
        match self.tx.try_send(Envelope::Event(stage, Box::new(bundle))) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(stage = %stage, "Not logging transaction in looking glass: queue is full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(stage = %stage, "Not logging transaction in looking glass: writer has stopped");
                false
            }
        }
    }

    /// Free slots left in the queue.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Queue the sentinel, waiting for a free slot. `false` if the writer is gone.
    pub(crate) async fn send_shutdown(&self) -> bool {
        self.tx.send(Envelope::Shutdown).await.is_ok()
    }

    /// Queue the sentinel only if there is room right now.
    pub(crate) fn try_send_shutdown(&self) -> bool {
        self.tx.try_send(Envelope::Shutdown).is_ok()
    }
}

impl EventReceiver {
    /// Next event, or `None` once the sentinel is dequeued or every sender is gone.
    pub async fn next(&mut self) -> Option<(Stage, TransactionBundle)> {
        match self.rx.recv().await? {
            Envelope::Event(stage, bundle) => Some((stage, *bundle)),
            Envelope::Shutdown => {
                self.rx.close();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glass_core::{ClientServerMessage, DhcpOption, MessageType};

    fn bundle(xid: u8) -> TransactionBundle {
        let request = ClientServerMessage::new(MessageType::Solicit, [0, 0, xid])
            .with_option(DhcpOption::client_id(vec![0, 3, 0, 1, 1, 2, 3, 4, 5, xid]));
        TransactionBundle::new("dhcp-1", request, vec![])
    }

    #[test]
    fn test_enqueue_beyond_capacity_returns_false() {
        let (sender, _receiver) = event_channel(2);

        assert!(sender.enqueue(Stage::Pre, bundle(1)));
        assert!(sender.enqueue(Stage::Pre, bundle(2)));
        assert!(!sender.enqueue(Stage::Pre, bundle(3)));
        assert!(!sender.enqueue(Stage::Post, bundle(4)));

        assert_eq!(sender.available(), 0);
        assert_eq!(sender.max_capacity(), 2);
    }

    #[test]
    fn test_enqueue_after_receiver_dropped_returns_false() {
        let (sender, receiver) = event_channel(4);
        drop(receiver);
        assert!(!sender.enqueue(Stage::Pre, bundle(1)));
    }

    #[tokio::test]
    async fn test_fifo_order_and_sentinel() {
        let (sender, mut receiver) = event_channel(8);

        assert!(sender.enqueue(Stage::Pre, bundle(1)));
        assert!(sender.enqueue(Stage::Post, bundle(1)));
        assert!(sender.enqueue(Stage::Pre, bundle(2)));
        assert!(sender.send_shutdown().await);

        let (stage, first) = receiver.next().await.unwrap();
        assert_eq!((stage, first.request.transaction_id), (Stage::Pre, [0, 0, 1]));
        let (stage, _) = receiver.next().await.unwrap();
        assert_eq!(stage, Stage::Post);
        let (_, third) = receiver.next().await.unwrap();
        assert_eq!(third.request.transaction_id, [0, 0, 2]);

        assert!(receiver.next().await.is_none());
        assert!(!sender.enqueue(Stage::Pre, bundle(3)));
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let (sender, mut receiver) = event_channel(64);

        let handles: Vec<_> = (0..4u8)
            .map(|n| {
                let sender = sender.clone();
                std::thread::spawn(move || {
                    (0..8u8).filter(|i| sender.enqueue(Stage::Pre, bundle(n * 8 + i))).count()
                })
            })
            .collect();
        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 32);

        assert!(sender.try_send_shutdown());
        let mut received = 0;
        while receiver.next().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 32);
    }
}
