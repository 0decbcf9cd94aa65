//! Order coordination: one browser session shared by every chat request.
//!
//! Inbound events become [`Command`]s. Session-touching commands run one at a
//! time on the [`TaskQueue`] worker, which owns the [`OrderAgent`] and with it
//! the [`ShopSession`]. Free text is turned into cart intents by the
//! [`IntentResolver`].

pub mod agent;
pub mod bus;
pub mod command;
pub mod intent;
pub mod queue;
pub mod reconcile;
pub mod reply;
pub mod runtime;
pub mod session;

#[cfg(test)]
mod testing;

pub use agent::OrderAgent;
pub use bus::MessageBus;
pub use command::Command;
pub use intent::{Intent, IntentResolver, Resolution};
pub use queue::{QueueStatus, TaskHandle, TaskOutcome, TaskQueue};
pub use reconcile::{CartDecision, CartStatus};
pub use reply::Replier;
pub use runtime::Dispatcher;
pub use session::ShopSession;
