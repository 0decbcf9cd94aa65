use grocerbot_agent::{CartDecision, Dispatcher, MessageBus};
use grocerbot_channels::ChannelManager;
use grocerbot_core::InboundMessage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::{build_agent, load};

/// Terminal session. Button payloads can be typed as plain lines.
fn to_inbound(line: &str) -> InboundMessage {
    let line = line.trim();
    match CartDecision::from_callback(line) {
        Some(_) => InboundMessage::callback("cli", "default", line),
        None => InboundMessage::cli(line),
    }
}

pub async fn run() -> anyhow::Result<()> {
    let (paths, config) = load()?;
    let agent = build_agent(&paths, &config);
    let ((inbound_tx, inbound_rx), (outbound_tx, outbound_rx)) =
        MessageBus::from_config(&config.agent).split();
    let dispatcher = Dispatcher::new(agent, outbound_tx);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let channel_manager = ChannelManager::new(config.clone());
    let outbound_handle = tokio::spawn(async move {
        channel_manager.start_outbound_dispatcher(outbound_rx).await;
    });
    let dispatcher_handle = tokio::spawn(dispatcher.run_loop(inbound_rx, shutdown_tx.subscribe()));

    println!("grocerbot chat. Send /start for help, Ctrl+D to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, draining tasks...");
                let _ = shutdown_tx.send(());
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if inbound_tx.send(to_inbound(&line)).await.is_err() {
                    warn!("Dispatcher stopped, leaving chat");
                    break;
                }
            }
        }
    }

    // On EOF closing the bus stops the dispatcher; the running task still finishes.
    drop(inbound_tx);
    match dispatcher_handle.await {
        Ok(Some(mut agent)) => agent.shutdown().await,
        Ok(None) => warn!("Queue worker lost, browser may still be running"),
        Err(e) => warn!(error = %e, "Dispatcher ended abnormally"),
    }
    let _ = outbound_handle.await;
    info!("Chat ended");
    Ok(())
}
