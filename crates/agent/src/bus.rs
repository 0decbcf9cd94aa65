use grocerbot_core::config::AgentConfig;
use grocerbot_core::{InboundMessage, OutboundMessage};
use tokio::sync::mpsc;

/// Chat events in, replies out.
pub struct MessageBus {
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    pub inbound_rx: mpsc::Receiver<InboundMessage>,
    pub outbound_tx: mpsc::Sender<OutboundMessage>,
    pub outbound_rx: mpsc::Receiver<OutboundMessage>,
}

impl MessageBus {
    pub fn new(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size.max(1));
        Self {
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.bus_capacity)
    }

    #[allow(clippy::type_complexity)]
    pub fn split(
        self,
    ) -> (
        (mpsc::Sender<InboundMessage>, mpsc::Receiver<InboundMessage>),
        (mpsc::Sender<OutboundMessage>, mpsc::Receiver<OutboundMessage>),
    ) {
        (
            (self.inbound_tx, self.inbound_rx),
            (self.outbound_tx, self.outbound_rx),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let config = AgentConfig {
            bus_capacity: 0,
            ..Default::default()
        };
        let ((inbound_tx, mut inbound_rx), _) = MessageBus::from_config(&config).split();
        inbound_tx.send(InboundMessage::cli("/status")).await.unwrap();
        assert_eq!(inbound_rx.recv().await.unwrap().content, "/status");
    }
}
