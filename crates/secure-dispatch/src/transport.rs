use crate::Message;
use tracing::warn;

/// Events emitted by the dispatcher for the network layer.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// A tagged message ready to be put on the wire.
    Deliver(Message),
}

/// Accepts tagged messages for delivery.
///
/// Delivery is fire-and-forget; failures are reported back later through
/// `ChatSession::on_send_message_error`.
pub trait TransportSink: Send + Sync {
    fn deliver(&self, message: Message);
}

impl TransportSink for crossbeam_channel::Sender<DispatchEvent> {
    fn deliver(&self, message: Message) {
        let id = message.id.clone();
        if self.send(DispatchEvent::Deliver(message)).is_err() {
            warn!(message_id = %id, "transport receiver dropped, message discarded");
        }
    }
}

/// Channel-backed transport for embedding the dispatcher behind a queue.
pub struct ChannelTransport {
    event_tx: crossbeam_channel::Sender<DispatchEvent>,
}

impl ChannelTransport {
    pub fn new(event_tx: crossbeam_channel::Sender<DispatchEvent>) -> Self {
        Self { event_tx }
    }

    /// Creates a transport together with the receiving end of its channel.
    pub fn unbounded() -> (Self, crossbeam_channel::Receiver<DispatchEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }
}

impl TransportSink for ChannelTransport {
    fn deliver(&self, message: Message) {
        self.event_tx.deliver(message);
    }
}
