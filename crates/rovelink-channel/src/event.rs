use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::qos::QosSample;
use crate::state::Status;

/// Notifications a channel delivers to its observers, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The status changed. `reason` explains disconnects and failures.
    StatusChanged {
        status: Status,
        peer: Option<SocketAddr>,
        reason: Option<String>,
    },
    /// An application payload arrived.
    MessageReceived(Bytes),
    /// A new peer completed a handshake.
    PeerAddressChanged(SocketAddr),
    /// A round-trip measurement completed.
    QosUpdate(QosSample),
}

/// Registered observer queues.
#[derive(Debug, Default)]
pub(crate) struct Observers {
    subscribers: Vec<mpsc::UnboundedSender<ChannelEvent>>,
}

impl Observers {
    pub(crate) fn add(&mut self, tx: mpsc::UnboundedSender<ChannelEvent>) {
        self.subscribers.push(tx);
    }

    /// Deliver to every live observer, dropping those whose receiver is gone.
    pub(crate) fn emit(&mut self, event: &ChannelEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_order_to_all() {
        let mut observers = Observers::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        observers.add(tx_a);
        observers.add(tx_b);

        observers.emit(&ChannelEvent::MessageReceived(Bytes::from_static(b"1")));
        observers.emit(&ChannelEvent::MessageReceived(Bytes::from_static(b"2")));

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(
                rx.try_recv().unwrap(),
                ChannelEvent::MessageReceived(Bytes::from_static(b"1"))
            );
            assert_eq!(
                rx.try_recv().unwrap(),
                ChannelEvent::MessageReceived(Bytes::from_static(b"2"))
            );
        }
    }

    #[test]
    fn dropped_observer_is_pruned() {
        let mut observers = Observers::default();
        let (tx, rx) = mpsc::unbounded_channel();
        observers.add(tx);
        drop(rx);

        observers.emit(&ChannelEvent::PeerAddressChanged(
            "127.0.0.1:1".parse().unwrap(),
        ));
        assert_eq!(observers.len(), 0);
    }
}
