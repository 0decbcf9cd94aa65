use futures::FutureExt;
use grocerbot_browser::ShopDriver;
use grocerbot_core::{InboundMessage, OutboundMessage, SessionState};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::agent::OrderAgent;
use crate::command::{Command, HELP_TEXT};
use crate::queue::{task, QueueStatus, TaskHandle, TaskOutcome, TaskQueue};
use crate::reply::Replier;

/// Turns inbound chat events into queued tasks. Status and help are
/// answered directly, without waiting behind the queue.
pub struct Dispatcher<D: ShopDriver> {
    queue: TaskQueue<OrderAgent<D>>,
    state_rx: watch::Receiver<SessionState>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
}

impl<D: ShopDriver> Dispatcher<D> {
    pub fn new(agent: OrderAgent<D>, outbound_tx: mpsc::Sender<OutboundMessage>) -> Self {
        let state_rx = agent.session().subscribe();
        Self {
            queue: TaskQueue::new(agent),
            state_rx,
            outbound_tx,
        }
    }

    pub fn status(&self) -> (SessionState, QueueStatus) {
        (*self.state_rx.borrow(), self.queue.status())
    }

    pub fn status_text(&self) -> String {
        let (state, queue) = self.status();
        format!(
            "Current state: {}\nTasks in queue: {}\nTask running: {}",
            state,
            queue.length,
            if queue.running { "yes" } else { "no" }
        )
    }

    /// Handles one inbound event. Returns the task handle when the event was
    /// queued.
    pub async fn dispatch(&self, msg: InboundMessage) -> Option<TaskHandle> {
        let command = Command::parse(&msg)?;
        let reply = Replier::for_message(self.outbound_tx.clone(), &msg);
        debug!(session = %msg.session_key(), command = ?command, "Inbound command");

        if !command.is_queued() {
            let text = match &command {
                Command::Status => self.status_text(),
                Command::Unknown(name) if msg.callback_data.is_some() => {
                    format!("Unknown action: {}", name)
                }
                Command::Unknown(name) => format!("Unknown command /{}. Send /start for help.", name),
                _ => HELP_TEXT.to_string(),
            };
            reply.say(&text).await;
            return None;
        }

        let description = command.description();
        // Acknowledge first so the reply precedes the task's own progress.
        reply
            .say(&format!(
                "Task added to queue: {}. Will be executed in queue order.",
                description
            ))
            .await;
        let handle = self.queue.enqueue(
            description,
            task(move |agent: &mut OrderAgent<D>| {
                async move { agent.run(&command, &reply).await }.boxed()
            }),
        );
        Some(handle)
    }

    /// Dispatches until shutdown or until the inbound bus closes, then
    /// drains the queue and hands the agent back.
    pub async fn run_loop(
        self,
        mut inbound_rx: mpsc::Receiver<InboundMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Option<OrderAgent<D>> {
        info!("Dispatcher started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                msg = inbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    let reply = Replier::for_message(self.outbound_tx.clone(), &msg);
                    if let Some(handle) = self.dispatch(msg).await {
                        tokio::spawn(report_outcome(handle, reply));
                    }
                }
            }
        }
        let (state, queue) = self.status();
        info!(state = %state, waiting = queue.length, running = queue.running, "Dispatcher stopping, draining queue");
        self.queue.drain().await
    }
}

/// Handlers report their own errors; only abnormal endings are surfaced here.
async fn report_outcome(handle: TaskHandle, reply: Replier) {
    let seq = handle.seq;
    let description = handle.description.clone();
    match handle.outcome().await {
        TaskOutcome::Succeeded | TaskOutcome::Failed(_) => {}
        TaskOutcome::Panicked(message) => {
            warn!(seq, task = %description, panic = %message, "Reporting crashed task");
            reply
                .say(&format!("Sorry, something went wrong: {}.", description))
                .await;
        }
        TaskOutcome::Discarded => {
            reply
                .say(&format!("Task cancelled because the bot is stopping: {}.", description))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentResolver;
    use crate::session::ShopSession;
    use crate::testing::{milk, MockDriver, Script, ScriptedProvider};
    use grocerbot_core::Catalog;
    use std::sync::Arc;

    fn dispatcher(script: Script) -> (
        Dispatcher<MockDriver>,
        Arc<MockDriver>,
        mpsc::Receiver<OutboundMessage>,
    ) {
        let driver = Arc::new(MockDriver::new(script));
        let resolver = IntentResolver::new(
            Arc::new(ScriptedProvider::new(vec![])),
            String::new(),
            Arc::new(Catalog::default()),
        );
        let agent = OrderAgent::new(ShopSession::new(driver.clone()), resolver);
        let (tx, rx) = mpsc::channel(256);
        (Dispatcher::new(agent, tx), driver, rx)
    }

    fn contents(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<String> {
        let mut out = vec![];
        while let Ok(msg) = rx.try_recv() {
            out.push(msg.content);
        }
        out
    }

    #[tokio::test]
    async fn test_code_entry_scenario() {
        let (dispatcher, driver, mut rx) = dispatcher(Script {
            auth_answers: vec![false, true].into(),
            cart_has_items: true,
            cart_items: vec![milk()],
            ..Default::default()
        });

        let handle = dispatcher.dispatch(InboundMessage::cli("/neworder")).await.unwrap();
        assert_eq!(handle.outcome().await, TaskOutcome::Succeeded);
        assert_eq!(dispatcher.status().0, SessionState::AwaitingCode);

        let handle = dispatcher.dispatch(InboundMessage::cli("12a4")).await.unwrap();
        assert!(matches!(handle.outcome().await, TaskOutcome::Failed(_)));
        assert_eq!(dispatcher.status().0, SessionState::AwaitingCode);

        let handle = dispatcher.dispatch(InboundMessage::cli("1234")).await.unwrap();
        assert_eq!(handle.outcome().await, TaskOutcome::Succeeded);
        assert_eq!(dispatcher.status().0, SessionState::Active);
        assert_eq!(driver.count("cart_has_items"), 1);
        assert_eq!(driver.count("read_cart_items"), 1);

        let sent = contents(&mut rx);
        assert!(sent.contains(&"Invalid code format. Please enter exactly 4 digits.".to_string()));
        assert!(sent.last().unwrap().starts_with("Your cart is not empty."));
    }

    #[tokio::test]
    async fn test_ack_precedes_progress() {
        let (dispatcher, _driver, mut rx) = dispatcher(Script::default());
        let handle = dispatcher.dispatch(InboundMessage::cli("/close")).await.unwrap();
        handle.outcome().await;
        assert_eq!(
            contents(&mut rx),
            vec![
                "Task added to queue: Closing browser session. Will be executed in queue order.",
                "No active browser session",
            ]
        );
    }

    #[tokio::test]
    async fn test_status_is_answered_without_queueing() {
        let (dispatcher, driver, mut rx) = dispatcher(Script::default());
        assert!(dispatcher.dispatch(InboundMessage::cli("/status")).await.is_none());
        assert_eq!(
            contents(&mut rx),
            vec!["Current state: INACTIVE\nTasks in queue: 0\nTask running: no"]
        );
        assert!(dispatcher.dispatch(InboundMessage::cli("/bogus")).await.is_none());
        assert!(dispatcher.dispatch(InboundMessage::cli("  ")).await.is_none());
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_button_press_is_queued() {
        let (dispatcher, _driver, mut rx) = dispatcher(Script::default());
        let press = InboundMessage::callback("cli", "default", "continue_with_cart");
        let handle = dispatcher.dispatch(press).await.unwrap();
        assert_eq!(handle.description, "Continuing with current items");
        assert_eq!(handle.outcome().await, TaskOutcome::Succeeded);
        assert_eq!(contents(&mut rx).last().unwrap(), "Continuing with items in cart.");
    }

    #[tokio::test]
    async fn test_run_loop_drains_on_shutdown() {
        let (dispatcher, driver, mut rx) = dispatcher(Script {
            auth_answers: vec![true].into(),
            ..Default::default()
        });
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let running = tokio::spawn(dispatcher.run_loop(inbound_rx, shutdown_rx));

        inbound_tx.send(InboundMessage::cli("/neworder")).await.unwrap();
        // Wait for the order to land before stopping.
        loop {
            let msg = rx.recv().await.unwrap();
            if msg.content == "Cart is empty. Ready to process orders." {
                break;
            }
        }
        shutdown_tx.send(()).unwrap();

        let mut agent = running.await.unwrap().unwrap();
        assert_eq!(agent.session().state(), SessionState::Active);
        agent.shutdown().await;
        assert_eq!(agent.session().state(), SessionState::Inactive);
        assert_eq!(driver.count("close"), 1);
    }
}
