use grocerbot_core::{Config, OutboundMessage, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub struct ChannelManager {
    config: Config,
}

impl ChannelManager {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn start_outbound_dispatcher(&self, mut outbound_rx: mpsc::Receiver<OutboundMessage>) {
        info!("Outbound dispatcher started");

        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = self.dispatch_outbound_msg(&msg).await {
                error!(error = %e, channel = %msg.channel, "Failed to dispatch outbound message");
            }
        }

        info!("Outbound dispatcher stopped");
    }

    pub async fn dispatch_outbound_msg(&self, msg: &OutboundMessage) -> Result<()> {
        match msg.channel.as_str() {
            "telegram" => {
                #[cfg(feature = "telegram")]
                {
                    crate::telegram::send_message(
                        &self.config,
                        &msg.chat_id,
                        &msg.content,
                        &msg.buttons,
                    )
                    .await?;
                }
            }
            "cli" => println!("{}", render_for_terminal(msg)),
            _ => {
                warn!(channel = %msg.channel, "Unknown channel for outbound message");
            }
        }
        Ok(())
    }

    /// (name, active, detail) per channel.
    pub fn get_status(&self) -> Vec<(String, bool, String)> {
        let telegram = &self.config.channels.telegram;
        let configured = !telegram.token.is_empty();
        let detail = if !configured {
            "token not set".to_string()
        } else if telegram.allow_from.is_empty() {
            "configured, open to everyone".to_string()
        } else {
            format!("configured, {} allowed senders", telegram.allow_from.len())
        };
        vec![("telegram".to_string(), telegram.enabled && configured, detail)]
    }
}

/// Buttons become `[text] -> data` hints; typing the data presses the button.
fn render_for_terminal(msg: &OutboundMessage) -> String {
    let mut out = msg.content.clone();
    for button in &msg.buttons {
        out.push_str(&format!("\n  [{}] -> {}", button.text, button.data));
    }
    out
}
