pub mod client;
pub mod ollama;

use async_trait::async_trait;
use grocerbot_core::Result;

/// Text-in/text-out language model.
///
/// One blocking request per call. Implementations must not retry: a network
/// failure or non-2xx answer surfaces as `Error::ModelUnavailable`.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub use ollama::OllamaProvider;
