use std::time::Duration;

use grocerbot_agent::{Dispatcher, MessageBus};
use grocerbot_channels::ChannelManager;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[cfg(feature = "telegram")]
use grocerbot_channels::telegram::TelegramChannel;
#[cfg(feature = "telegram")]
use std::sync::Arc;

use super::{build_agent, load};

pub async fn run() -> anyhow::Result<()> {
    let (paths, config) = load()?;

    if config.channels.telegram.token.is_empty() {
        anyhow::bail!(
            "Telegram bot token is not set. Set BOT_TOKEN or channels.telegram.token in {}",
            paths.config_file().display()
        );
    }
    if config.shop.phone_number.is_empty() {
        warn!("Phone number is not set, login will fail until PHONE_NUMBER is provided");
    }

    let agent = build_agent(&paths, &config);
    let ((inbound_tx, inbound_rx), (outbound_tx, outbound_rx)) =
        MessageBus::from_config(&config.agent).split();
    let dispatcher = Dispatcher::new(agent, outbound_tx);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let channel_manager = ChannelManager::new(config.clone());
    let outbound_handle = tokio::spawn(async move {
        channel_manager.start_outbound_dispatcher(outbound_rx).await;
    });

    #[cfg(feature = "telegram")]
    let telegram_handle = {
        let telegram = Arc::new(TelegramChannel::new(config.clone(), inbound_tx.clone()));
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            telegram.run_loop(shutdown_rx).await;
        })
    };
    #[cfg(not(feature = "telegram"))]
    warn!("Built without the telegram feature, no chat channel is running");

    let dispatcher_shutdown_rx = shutdown_tx.subscribe();
    let dispatcher_handle = tokio::spawn(dispatcher.run_loop(inbound_rx, dispatcher_shutdown_rx));

    info!("grocerbot started, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining tasks...");

    let _ = shutdown_tx.send(());
    drop(inbound_tx);

    #[cfg(feature = "telegram")]
    {
        if let Err(e) = telegram_handle.await {
            warn!(error = %e, "Telegram task ended abnormally");
        }
    }

    match dispatcher_handle.await {
        Ok(Some(mut agent)) => agent.shutdown().await,
        Ok(None) => warn!("Queue worker lost, browser may still be running"),
        Err(e) => warn!(error = %e, "Dispatcher ended abnormally"),
    }

    // Give pending replies a moment to go out.
    if tokio::time::timeout(Duration::from_secs(5), outbound_handle).await.is_err() {
        warn!("Outbound dispatcher did not finish in time");
    }

    info!("grocerbot stopped");
    Ok(())
}
