pub mod config;
pub mod error;
pub mod message;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use message::{InboundMessage, InlineButton, OutboundMessage};
pub use paths::Paths;
pub use types::{CartItem, Catalog, Product, SessionState};
