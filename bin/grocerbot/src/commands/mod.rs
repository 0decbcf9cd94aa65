pub mod chat;
pub mod onboard;
pub mod resolve;
pub mod run;
pub mod status;

use std::sync::Arc;

use grocerbot_agent::intent::{load_catalog, load_prompt};
use grocerbot_agent::{IntentResolver, OrderAgent, ShopSession};
use grocerbot_browser::CdpShopDriver;
use grocerbot_core::{Config, Paths};
use grocerbot_providers::OllamaProvider;

/// Resolves the data directory and loads the config with env overrides.
pub(crate) fn load() -> anyhow::Result<(Paths, Config)> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    paths.ensure_dirs()?;
    Ok((paths, config))
}

pub(crate) fn build_resolver(paths: &Paths, config: &Config) -> IntentResolver {
    let catalog = load_catalog(&config.catalog_path(paths));
    let prompt = load_prompt(&config.prompt_path(paths));
    let provider = OllamaProvider::from_config(&config.providers.ollama);
    IntentResolver::new(Arc::new(provider), prompt, Arc::new(catalog))
}

/// One agent around the real browser.
pub(crate) fn build_agent(paths: &Paths, config: &Config) -> OrderAgent<CdpShopDriver> {
    let driver = CdpShopDriver::new(config.shop.clone(), paths);
    let session = ShopSession::new(Arc::new(driver));
    OrderAgent::new(session, build_resolver(paths, config))
}
