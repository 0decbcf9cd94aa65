use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Local inference on small hardware is slow; keep this generous.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_ollama_base() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "gemma3:1b-it-fp16".to_string()
}

fn default_model_timeout() -> u64 {
    300
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            api_base: default_ollama_base(),
            model: default_model(),
            timeout_secs: default_model_timeout(),
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub allow_from: Vec<String>,
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_cart_url")]
    pub cart_url: String,
    /// Phone number typed into the login form.
    #[serde(default)]
    pub phone_number: String,
    #[serde(default = "default_headed")]
    pub headed: bool,
    #[serde(default)]
    pub browser_path: Option<String>,
    /// Upper bound for every "wait for selector" on the shop pages.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://5ka.ru/".to_string()
}

fn default_cart_url() -> String {
    "https://5ka.ru/cart/".to_string()
}

fn default_headed() -> bool {
    true
}

fn default_wait_timeout() -> u64 {
    30
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            cart_url: default_cart_url(),
            phone_number: String::new(),
            headed: default_headed(),
            browser_path: None,
            wait_timeout_secs: default_wait_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub prompt_file: Option<String>,
    #[serde(default)]
    pub catalog_file: Option<String>,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

fn default_bus_capacity() -> usize {
    100
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            prompt_file: None,
            catalog_file: None,
            bus_capacity: default_bus_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub shop: ShopConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        let mut config = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `BOT_TOKEN` and `PHONE_NUMBER` take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var("BOT_TOKEN").ok(),
            std::env::var("PHONE_NUMBER").ok(),
        );
    }

    fn apply_overrides(&mut self, bot_token: Option<String>, phone: Option<String>) {
        if let Some(token) = bot_token.filter(|t| !t.trim().is_empty()) {
            self.channels.telegram.token = token.trim().to_string();
            self.channels.telegram.enabled = true;
        }
        if let Some(phone) = phone.filter(|p| !p.trim().is_empty()) {
            self.shop.phone_number = phone.trim().to_string();
        }
    }

    pub fn prompt_path(&self, paths: &Paths) -> PathBuf {
        self.agent
            .prompt_file
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.prompt_file())
    }

    pub fn catalog_path(&self, paths: &Paths) -> PathBuf {
        self.agent
            .catalog_file
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.catalog_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.providers.ollama.api_base, "http://localhost:11434");
        assert_eq!(cfg.providers.ollama.model, "gemma3:1b-it-fp16");
        assert_eq!(cfg.shop.cart_url, "https://5ka.ru/cart/");
        assert!(cfg.shop.headed);
        assert!(!cfg.channels.telegram.enabled);
    }

    #[test]
    fn test_camel_case_keys() {
        let raw = r#"{
  "shop": { "phoneNumber": "9990001122", "waitTimeoutSecs": 5 },
  "channels": { "telegram": { "enabled": true, "token": "t", "allowFrom": ["42"] } }
}"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.shop.phone_number, "9990001122");
        assert_eq!(cfg.shop.wait_timeout_secs, 5);
        assert_eq!(cfg.channels.telegram.allow_from, vec!["42".to_string()]);
    }

    #[test]
    fn test_overrides_enable_telegram() {
        let mut cfg = Config::default();
        cfg.apply_overrides(Some(" abc ".to_string()), Some("".to_string()));
        assert!(cfg.channels.telegram.enabled);
        assert_eq!(cfg.channels.telegram.token, "abc");
        assert!(cfg.shop.phone_number.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut cfg = Config::default();
        cfg.shop.headed = false;
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert!(!loaded.shop.headed);
    }
}
