use grocerbot_core::{InboundMessage, InlineButton, OutboundMessage};
use tokio::sync::mpsc;
use tracing::warn;

/// Sends replies back to the chat a command came from.
#[derive(Clone)]
pub struct Replier {
    outbound_tx: mpsc::Sender<OutboundMessage>,
    channel: String,
    chat_id: String,
}

impl Replier {
    pub fn new(outbound_tx: mpsc::Sender<OutboundMessage>, channel: &str, chat_id: &str) -> Self {
        Self {
            outbound_tx,
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    pub fn for_message(outbound_tx: mpsc::Sender<OutboundMessage>, msg: &InboundMessage) -> Self {
        Self::new(outbound_tx, &msg.channel, &msg.chat_id)
    }

    pub async fn say(&self, text: &str) {
        self.send(OutboundMessage::new(&self.channel, &self.chat_id, text))
            .await;
    }

    pub async fn ask(&self, text: &str, buttons: Vec<InlineButton>) {
        self.send(OutboundMessage::new(&self.channel, &self.chat_id, text).with_buttons(buttons))
            .await;
    }

    async fn send(&self, msg: OutboundMessage) {
        // A closed outbound bus means shutdown; the reply has nowhere to go.
        if let Err(e) = self.outbound_tx.send(msg).await {
            warn!(chat_id = %self.chat_id, error = %e, "Reply dropped");
        }
    }
}
