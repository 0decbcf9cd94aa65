use async_trait::async_trait;
use grocerbot_core::config::OllamaConfig;
use grocerbot_core::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::client::build_http_client;
use crate::Provider;

const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";

pub struct OllamaProvider {
    client: Client,
    api_base: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    eval_count: Option<u64>,
}

impl OllamaProvider {
    pub fn new(api_base: Option<&str>, model: &str, timeout: Duration, proxy: Option<&str>) -> Self {
        let resolved_base = api_base
            .unwrap_or(DEFAULT_OLLAMA_BASE)
            .trim_end_matches('/')
            .to_string();
        let client = build_http_client(proxy, &resolved_base, timeout);
        Self {
            client,
            api_base: resolved_base,
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &OllamaConfig) -> Self {
        Self::new(
            Some(&config.api_base),
            &config.model,
            Duration::from_secs(config.timeout_secs),
            config.proxy.as_deref(),
        )
    }

    /// Config may store "ollama/gemma3" but the API expects "gemma3".
    fn normalize_model(model: &str) -> &str {
        model.strip_prefix("ollama/").unwrap_or(model)
    }

    fn extract_text(raw_body: &str) -> Result<String> {
        let resp: GenerateResponse = serde_json::from_str(raw_body).map_err(|e| {
            Error::ModelUnavailable(format!("Failed to parse Ollama response: {}", e))
        })?;
        if let Some(count) = resp.eval_count {
            debug!(eval_count = count, "Ollama generation stats");
        }
        resp.response
            .ok_or_else(|| Error::ModelUnavailable("Invalid response format from Ollama".to_string()))
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.api_base);
        let model = Self::normalize_model(&self.model);
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
        };

        info!(url = %url, model = %model, prompt_len = prompt.len(), "Calling Ollama API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ModelUnavailable(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Ollama API error");
            return Err(Error::ModelUnavailable(format!(
                "Ollama API responded with status {}",
                status
            )));
        }

        let text = Self::extract_text(&raw_body)?;
        debug!(response_len = text.len(), "Ollama response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response on a random local port.
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_normalize_model() {
        assert_eq!(OllamaProvider::normalize_model("ollama/gemma3:1b"), "gemma3:1b");
        assert_eq!(OllamaProvider::normalize_model("gemma3:1b"), "gemma3:1b");
    }

    #[test]
    fn test_extract_text() {
        let text = OllamaProvider::extract_text(r#"{"model":"m","response":"{\"add\":[]}","done":true}"#).unwrap();
        assert_eq!(text, r#"{"add":[]}"#);

        let err = OllamaProvider::extract_text(r#"{"done":true}"#).unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_generate_success() {
        let base = one_shot_server("200 OK", r#"{"response":"hello","done":true}"#).await;
        let provider = OllamaProvider::new(Some(&base), "m", Duration::from_secs(5), None);
        assert_eq!(provider.generate("hi").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_generate_non_2xx_is_model_unavailable() {
        let base = one_shot_server("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let provider = OllamaProvider::new(Some(&base), "m", Duration::from_secs(5), None);
        let err = provider.generate("hi").await.unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }
}
