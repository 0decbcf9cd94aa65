use grocerbot_browser::ShopDriver;
use grocerbot_core::{Error, Result, SessionState};
use tracing::{debug, info};

use crate::command::Command;
use crate::intent::IntentResolver;
use crate::reconcile::{decision_buttons, format_cart_summary, CartDecision, CartStatus};
use crate::reply::Replier;
use crate::session::ShopSession;

/// Everything a queued task may touch. Owned by the queue worker.
pub struct OrderAgent<D: ShopDriver> {
    session: ShopSession<D>,
    resolver: IntentResolver,
}

impl<D: ShopDriver> OrderAgent<D> {
    pub fn new(session: ShopSession<D>, resolver: IntentResolver) -> Self {
        Self { session, resolver }
    }

    pub fn session(&self) -> &ShopSession<D> {
        &self.session
    }

    /// Runs one command and tells the user how it went. The error is still
    /// returned so the queue records the failure.
    pub async fn run(&mut self, command: &Command, reply: &Replier) -> Result<()> {
        self.session.normalize().await;
        let result = self.handle(command, reply).await;
        if let Err(e) = &result {
            reply.say(&failure_message(command, e)).await;
        }
        result
    }

    async fn handle(&mut self, command: &Command, reply: &Replier) -> Result<()> {
        match command {
            Command::NewOrder => self.new_order(reply).await,
            Command::Close => self.close(reply).await,
            Command::CartItems => self.cart_items(reply).await,
            Command::CartDecision(decision) => self.decide(*decision, reply).await,
            Command::Text(text) => self.text(text, reply).await,
            Command::Status | Command::Start | Command::Unknown(_) => {
                debug!(command = ?command, "Not a queued command, ignoring");
                Ok(())
            }
        }
    }

    async fn new_order(&mut self, reply: &Replier) -> Result<()> {
        reply.say("Processing new order request...").await;
        match self.session.begin_order(reply).await? {
            SessionState::Active => {
                reply.say("Using existing logged-in browser session").await;
                self.reconcile(reply).await
            }
            _ => {
                reply
                    .say("Successfully navigated to login page and entered phone. Please enter the verification code (4 digits).")
                    .await;
                Ok(())
            }
        }
    }

    /// Shows the cart and asks for a decision when it is not empty.
    async fn reconcile(&mut self, reply: &Replier) -> Result<()> {
        match self.session.check_cart().await? {
            CartStatus::HasItems(items) => {
                reply.say(&format_cart_summary(&items)).await;
                reply
                    .ask(
                        "Your cart is not empty. Do you want to clean it or continue with existing items?",
                        decision_buttons(),
                    )
                    .await;
            }
            CartStatus::Empty => reply.say("Cart is empty. Ready to process orders.").await,
        }
        Ok(())
    }

    async fn close(&mut self, reply: &Replier) -> Result<()> {
        if self.session.close().await {
            reply.say("Browser session closed").await;
        } else {
            reply.say("No active browser session").await;
        }
        Ok(())
    }

    async fn cart_items(&mut self, reply: &Replier) -> Result<()> {
        reply.say("Checking your shopping cart...").await;
        if !self.session.is_active() {
            reply
                .say("Browser session is not active. Please use /neworder first.")
                .await;
            return Ok(());
        }
        if !self.session.verify_login().await? {
            reply
                .say("You need to be logged in to view cart items. Please use /neworder first.")
                .await;
            return Ok(());
        }
        self.reconcile(reply).await
    }

    async fn decide(&mut self, decision: CartDecision, reply: &Replier) -> Result<()> {
        match decision {
            CartDecision::Continue => {
                reply.say("Continuing with items in cart.").await;
                Ok(())
            }
            CartDecision::Clean => {
                if !self.session.is_active() {
                    reply.say("Browser session not active").await;
                    return Ok(());
                }
                reply.say("Cleaning your cart...").await;
                self.session.clean_cart().await?;
                reply
                    .say("Cart has been cleaned successfully. You can now proceed with your order.")
                    .await;
                Ok(())
            }
        }
    }

    async fn text(&mut self, text: &str, reply: &Replier) -> Result<()> {
        match self.session.state() {
            SessionState::AwaitingCode => {
                self.session.submit_code(text, reply).await?;
                reply.say("Successfully logged in!").await;
                self.reconcile(reply).await
            }
            SessionState::Active => {
                reply.say("Processing your request with AI...").await;
                let resolution = self
                    .resolver
                    .resolve(text, self.session.cart_items())
                    .await?;
                for message in resolution.messages() {
                    reply.say(&message).await;
                }
                Ok(())
            }
            SessionState::Inactive | SessionState::Initializing => {
                reply.say("No active order. Use /neworder to start.").await;
                Ok(())
            }
        }
    }

    /// Closes the browser on the way out.
    pub async fn shutdown(&mut self) {
        if self.session.close().await {
            info!("Browser session closed on shutdown");
        }
    }
}

/// What the user sees when a command fails.
pub fn failure_message(command: &Command, err: &Error) -> String {
    match (command, err) {
        (_, Error::AuthFormat(_)) => "Invalid code format. Please enter exactly 4 digits.".to_string(),
        (_, Error::AuthFailure(msg)) => msg.clone(),
        (_, Error::Session(msg)) => format!(
            "The browser session was closed: {}. Use /neworder to start again.",
            msg
        ),
        (_, Error::ModelUnavailable(_)) => {
            "Sorry, I encountered an error while processing your request with the AI model."
                .to_string()
        }
        (_, Error::MalformedIntent { raw, .. }) => format!(
            "I received a response but couldn't format it properly: {}",
            raw
        ),
        (Command::CartDecision(CartDecision::Clean), Error::CartOperation(_)) => {
            "Failed to clean cart. Please try again or continue with items in cart.".to_string()
        }
        (_, Error::CartOperation(_)) => "Failed to check cart status".to_string(),
        (_, Error::Config(msg)) => format!("Configuration problem: {}", msg),
        (Command::NewOrder, _) => {
            "Sorry, I encountered an error while processing your order request.".to_string()
        }
        (_, other) => format!("Sorry, something went wrong: {}", other),
    }
}
