use grocerbot_core::{Config, Error, InboundMessage, InlineButton, Result};
use reqwest::Client;
use reqwest::Proxy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    message: Option<Message>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

fn build_client(config: &Config, timeout: Duration) -> Client {
    let mut builder = Client::builder().timeout(timeout);
    if let Some(proxy) = config.channels.telegram.proxy.as_deref() {
        match Proxy::all(proxy) {
            Ok(p) => builder = builder.proxy(p),
            Err(e) => warn!(error = %e, proxy = %proxy, "Invalid Telegram proxy, ignoring"),
        }
    }
    builder.build().unwrap_or_else(|_| Client::new())
}

fn api_url(config: &Config, method: &str) -> String {
    format!(
        "{}/bot{}/{}",
        TELEGRAM_API_BASE, config.channels.telegram.token, method
    )
}

/// Strips the `@botname` suffix Telegram appends to commands in group chats.
pub fn normalize_command(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return trimmed.to_string();
    }
    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, Some(rest)),
        None => (trimmed, None),
    };
    let command = head.split('@').next().unwrap_or(head);
    match rest {
        Some(rest) => format!("{} {}", command, rest.trim()),
        None => command.to_string(),
    }
}

pub struct TelegramChannel {
    config: Config,
    client: Client,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

impl TelegramChannel {
    pub fn new(config: Config, inbound_tx: mpsc::Sender<InboundMessage>) -> Self {
        // Long polling holds the request for 30s.
        let client = build_client(&config, Duration::from_secs(60));
        if config.channels.telegram.proxy.is_some() {
            info!("Telegram proxy configured");
        }
        Self {
            config,
            client,
            inbound_tx,
        }
    }

    fn is_allowed(&self, user: &User) -> bool {
        let allow_from = &self.config.channels.telegram.allow_from;

        if allow_from.is_empty() {
            return true;
        }

        let user_id = user.id.to_string();
        let username = user.username.as_deref().unwrap_or("");

        allow_from.iter().any(|allowed| {
            if allowed.contains('|') {
                let parts: Vec<&str> = allowed.split('|').collect();
                parts.contains(&user_id.as_str()) || parts.contains(&username)
            } else {
                allowed == &user_id || allowed == username
            }
        })
    }

    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let mut params = vec![
            ("timeout", "30".to_string()),
            ("allowed_updates", r#"["message","callback_query"]"#.to_string()),
        ];
        if let Some(off) = offset {
            params.push(("offset", off.to_string()));
        }

        let response = self
            .client
            .get(api_url(&self.config, "getUpdates"))
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram request failed: {}", e)))?;

        let telegram_response: TelegramResponse<Vec<Update>> = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Failed to parse Telegram response: {}", e)))?;

        if !telegram_response.ok {
            return Err(Error::Channel(
                telegram_response
                    .description
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        Ok(telegram_response.result.unwrap_or_default())
    }

    pub async fn run_loop(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        if !self.config.channels.telegram.enabled {
            info!("Telegram channel disabled");
            return;
        }

        if self.config.channels.telegram.token.is_empty() {
            warn!("Telegram token not configured");
            return;
        }

        info!("Telegram channel started");
        let mut offset: Option<i64> = None;

        loop {
            tokio::select! {
                result = self.get_updates(offset) => {
                    match result {
                        Ok(updates) => {
                            for update in updates {
                                offset = Some(update.update_id + 1);
                                if let Err(e) = self.handle_update(update).await {
                                    error!(error = %e, "Failed to handle Telegram update");
                                }
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to get Telegram updates");
                            tokio::select! {
                                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                                _ = shutdown.recv() => {
                                    info!("Telegram channel shutting down");
                                    break;
                                }
                            }
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Telegram channel shutting down");
                    break;
                }
            }
        }
    }

    async fn handle_update(&self, update: Update) -> Result<()> {
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        if let Some(query) = update.callback_query {
            return self.handle_callback(query).await;
        }
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        let user = match &message.from {
            Some(u) => u,
            None => return Ok(()),
        };

        if !self.is_allowed(user) {
            debug!(user_id = user.id, "User not in allowlist, ignoring");
            return Ok(());
        }

        let content = match message.text.as_deref() {
            Some(text) if !text.trim().is_empty() => normalize_command(text),
            _ => return Ok(()),
        };

        let inbound = InboundMessage {
            channel: "telegram".to_string(),
            sender_id: user.id.to_string(),
            chat_id: message.chat.id.to_string(),
            content,
            callback_data: None,
            metadata: serde_json::json!({
                "message_id": message.message_id,
                "username": user.username,
            }),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };

        self.inbound_tx
            .send(inbound)
            .await
            .map_err(|e| Error::Channel(e.to_string()))?;

        Ok(())
    }

    async fn handle_callback(&self, query: CallbackQuery) -> Result<()> {
        // Stop the client-side spinner whatever happens next.
        if let Err(e) = answer_callback_query(&self.client, &self.config, &query.id).await {
            warn!(error = %e, "Failed to answer callback query");
        }

        if !self.is_allowed(&query.from) {
            debug!(user_id = query.from.id, "User not in allowlist, ignoring button");
            return Ok(());
        }

        let (Some(data), Some(message)) = (query.data, query.message) else {
            return Ok(());
        };

        let inbound = InboundMessage {
            channel: "telegram".to_string(),
            sender_id: query.from.id.to_string(),
            chat_id: message.chat.id.to_string(),
            content: String::new(),
            callback_data: Some(data),
            metadata: serde_json::json!({
                "callback_query_id": query.id,
                "message_id": message.message_id,
                "username": query.from.username,
            }),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };

        self.inbound_tx
            .send(inbound)
            .await
            .map_err(|e| Error::Channel(e.to_string()))?;

        Ok(())
    }
}

async fn answer_callback_query(client: &Client, config: &Config, query_id: &str) -> Result<()> {
    let response = client
        .post(api_url(config, "answerCallbackQuery"))
        .json(&serde_json::json!({ "callback_query_id": query_id }))
        .send()
        .await
        .map_err(|e| Error::Channel(format!("answerCallbackQuery failed: {}", e)))?;
    if !response.status().is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(Error::Channel(format!("Telegram API error: {}", text)));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct KeyboardButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

#[derive(Debug, Serialize)]
struct ReplyMarkup<'a> {
    inline_keyboard: Vec<Vec<KeyboardButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup<'a>>,
}

/// All buttons go on a single row.
fn build_send_request<'a>(
    chat_id: &'a str,
    text: &'a str,
    buttons: &'a [InlineButton],
) -> SendMessageRequest<'a> {
    let reply_markup = if buttons.is_empty() {
        None
    } else {
        Some(ReplyMarkup {
            inline_keyboard: vec![buttons
                .iter()
                .map(|b| KeyboardButton {
                    text: &b.text,
                    callback_data: &b.data,
                })
                .collect()],
        })
    };
    SendMessageRequest {
        chat_id,
        text,
        reply_markup,
    }
}

pub async fn send_message(
    config: &Config,
    chat_id: &str,
    text: &str,
    buttons: &[InlineButton],
) -> Result<()> {
    let client = build_client(config, Duration::from_secs(30));
    let request = build_send_request(chat_id, text, buttons);

    let response = client
        .post(api_url(config, "sendMessage"))
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::Channel(format!("Failed to send Telegram message: {}", e)))?;

    if !response.status().is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(Error::Channel(format!("Telegram API error: {}", text)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_with_allow_list(allow_from: Vec<&str>) -> TelegramChannel {
        let mut config = Config::default();
        config.channels.telegram.allow_from = allow_from.into_iter().map(String::from).collect();
        let (tx, _rx) = mpsc::channel(1);
        TelegramChannel::new(config, tx)
    }

    #[test]
    fn test_normalize_command() {
        assert_eq!(normalize_command("/neworder@grocer_bot"), "/neworder");
        assert_eq!(normalize_command("  /status  "), "/status");
        assert_eq!(normalize_command("/close@bot now"), "/close now");
        assert_eq!(normalize_command("молоко 2 литра"), "молоко 2 литра");
    }

    #[test]
    fn test_allow_list() {
        let user = User {
            id: 42,
            username: Some("alice".to_string()),
        };
        assert!(channel_with_allow_list(vec![]).is_allowed(&user));
        assert!(channel_with_allow_list(vec!["42"]).is_allowed(&user));
        assert!(channel_with_allow_list(vec!["7|alice"]).is_allowed(&user));
        assert!(!channel_with_allow_list(vec!["7", "bob"]).is_allowed(&user));
    }

    #[test]
    fn test_parse_callback_update() {
        let raw = r#"{
            "update_id": 10,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 42, "username": "alice"},
                "message": {"message_id": 5, "chat": {"id": 99}, "text": "Your cart is not empty."},
                "data": "clean_cart"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert!(update.message.is_none());
        let query = update.callback_query.unwrap();
        assert_eq!(query.data.as_deref(), Some("clean_cart"));
        assert_eq!(query.message.unwrap().chat.id, 99);
    }

    #[test]
    fn test_send_request_keyboard() {
        let buttons = vec![
            InlineButton::new("Clean cart", "clean_cart"),
            InlineButton::new("Continue with items", "continue_with_cart"),
        ];
        let value = serde_json::to_value(build_send_request("99", "hi", &buttons)).unwrap();
        assert_eq!(
            value["reply_markup"]["inline_keyboard"][0][1]["callback_data"],
            "continue_with_cart"
        );

        let plain = serde_json::to_value(build_send_request("99", "hi", &[])).unwrap();
        assert!(plain.get("reply_markup").is_none());
    }
}
