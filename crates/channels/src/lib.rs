pub mod manager;

#[cfg(feature = "telegram")]
pub mod telegram;

pub use manager::ChannelManager;
