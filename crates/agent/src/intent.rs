//! Free text to cart intent.
//!
//! The model is asked for `{"add": [...], "remove": [...]}`. Its answer is
//! cut out of a fenced code block when there is one, validated against
//! [`Intent`], then matched against the catalog (additions) and the cached
//! cart (removals). Nothing here mutates the cart.

use grocerbot_core::{CartItem, Catalog, Error, Product, Result};
use grocerbot_providers::Provider;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

static FENCED_JSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(\{.*?\})\s*```").expect("valid regex"));

const PROMPT_PLACEHOLDER: &str = "Failed to load prompt. Please check prompt.txt file.";

/// Amount requested for an added item.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Count {
    Amount(f64),
    /// Smallest purchasable amount.
    Min,
}

impl TryFrom<Value> for Count {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match &value {
            Value::Number(n) => n
                .as_f64()
                .map(Count::Amount)
                .ok_or_else(|| format!("count {} is out of range", n)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("min") => Ok(Count::Min),
            Value::String(s) => s
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .map(Count::Amount)
                .map_err(|_| format!("count must be a number or \"MIN\", got {:?}", s)),
            other => Err(format!("count must be a number or \"MIN\", got {}", other)),
        }
    }
}

impl std::fmt::Display for Count {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Count::Amount(n) if n.fract() == 0.0 => write!(f, "{}", *n as i64),
            Count::Amount(n) => write!(f, "{}", n),
            Count::Min => write!(f, "MIN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddItem {
    pub name: String,
    #[serde(default)]
    pub count: Option<Count>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl AddItem {
    /// `• name` or `• name: count unit`.
    pub fn summary_line(&self) -> String {
        match self.count {
            Some(Count::Amount(_)) => {
                let count = self.count.map(|c| c.to_string()).unwrap_or_default();
                let unit = self.unit.as_deref().unwrap_or("").trim();
                format!("• {}: {} {}", self.name, count, unit)
                    .trim_end()
                    .to_string()
            }
            Some(Count::Min) | None => format!("• {}", self.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub add: Vec<AddItem>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl Intent {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// JSON inside the first fenced code block, or the whole answer when there
/// is no such block.
pub fn extract_json_block(raw: &str) -> &str {
    FENCED_JSON_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
}

pub fn parse_intent(raw: &str) -> Result<Intent> {
    let content = extract_json_block(raw).trim();
    serde_json::from_str::<Intent>(content).map_err(|e| Error::MalformedIntent {
        raw: raw.to_string(),
        reason: e.to_string(),
    })
}

fn tokens(phrase: &str) -> Vec<String> {
    phrase
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect()
}

/// Every whitespace token of `phrase` occurs, case-insensitively, as a
/// substring of `candidate`. A phrase with no tokens matches nothing.
pub fn phrase_matches(phrase: &str, candidate: &str) -> bool {
    let words = tokens(phrase);
    if words.is_empty() {
        return false;
    }
    let candidate = candidate.to_lowercase();
    words.iter().all(|word| candidate.contains(word.as_str()))
}

/// Products with at least one matching alias, in catalog order.
pub fn matching_products<'a>(phrase: &str, catalog: &'a Catalog) -> Vec<&'a Product> {
    catalog
        .products
        .iter()
        .filter(|product| product.aliases.iter().any(|alias| phrase_matches(phrase, alias)))
        .collect()
}

/// Specific products implied by the additions, first occurrence wins.
pub fn suggest_products(intent: &Intent, catalog: &Catalog) -> Vec<String> {
    let mut suggestions: Vec<String> = Vec::new();
    for item in &intent.add {
        for product in matching_products(&item.name, catalog) {
            for specific in &product.specific_products {
                if !suggestions.contains(specific) {
                    suggestions.push(specific.clone());
                }
            }
        }
    }
    suggestions
}

/// Cached cart items each removal phrase likely refers to, unique by name.
pub fn removal_candidates(intent: &Intent, cart: &[CartItem]) -> Vec<CartItem> {
    let mut candidates: Vec<CartItem> = Vec::new();
    for phrase in &intent.remove {
        for item in cart.iter().filter(|item| phrase_matches(phrase, &item.name)) {
            if !candidates.iter().any(|c| c.name == item.name) {
                candidates.push(item.clone());
            }
        }
    }
    candidates
}

pub fn format_intent_summary(intent: &Intent) -> String {
    let mut message = String::from("Here's what I understood:\n");
    if intent.is_empty() {
        message.push_str("\nNothing to add or remove.");
        return message;
    }
    if !intent.add.is_empty() {
        message.push_str("\n✅ Adding to cart:\n");
        for item in &intent.add {
            message.push_str(&item.summary_line());
            message.push('\n');
        }
    }
    if !intent.remove.is_empty() {
        message.push_str("\n❌ Removing from cart:\n");
        for name in &intent.remove {
            message.push_str(&format!("• {}\n", name));
        }
    }
    message.trim_end().to_string()
}

fn numbered(header: &str, lines: impl Iterator<Item = String>) -> String {
    let mut message = format!("{}\n", header);
    for (i, line) in lines.enumerate() {
        message.push_str(&format!("\n{}. {}", i + 1, line));
    }
    message
}

pub fn format_suggestions(suggestions: &[String]) -> String {
    numbered(
        "These specific products match your request:",
        suggestions.iter().cloned(),
    )
}

pub fn format_removal_candidates(candidates: &[CartItem]) -> String {
    if candidates.is_empty() {
        return "No matching items found in your cart.".to_string();
    }
    numbered(
        "These items in your cart match your removal request:",
        candidates.iter().map(|item| item.name.clone()),
    )
}

/// Outcome of resolving one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub intent: Intent,
    pub suggestions: Vec<String>,
    pub removal_candidates: Vec<CartItem>,
}

impl Resolution {
    /// Summary first, then suggestions and removal candidates as separate
    /// messages when present.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![format_intent_summary(&self.intent)];
        if !self.suggestions.is_empty() {
            messages.push(format_suggestions(&self.suggestions));
        }
        if !self.removal_candidates.is_empty() {
            messages.push(format_removal_candidates(&self.removal_candidates));
        }
        messages
    }
}

pub struct IntentResolver {
    provider: Arc<dyn Provider>,
    prompt: String,
    catalog: Arc<Catalog>,
}

impl IntentResolver {
    pub fn new(provider: Arc<dyn Provider>, prompt: String, catalog: Arc<Catalog>) -> Self {
        Self {
            provider,
            prompt,
            catalog,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// One model call, no retry.
    pub async fn resolve(&self, text: &str, cart: &[CartItem]) -> Result<Resolution> {
        let prompt = format!("{}\n{}", self.prompt, text);
        let raw = self.provider.generate(&prompt).await?;
        debug!(raw = %raw, "Model answer");

        let intent = parse_intent(&raw)?;
        let suggestions = suggest_products(&intent, &self.catalog);
        let removal_candidates = removal_candidates(&intent, cart);
        info!(
            add = intent.add.len(),
            remove = intent.remove.len(),
            suggestions = suggestions.len(),
            candidates = removal_candidates.len(),
            "Intent resolved"
        );
        Ok(Resolution {
            intent,
            suggestions,
            removal_candidates,
        })
    }
}

/// Reads the system prompt, falling back to a placeholder so the bot keeps
/// running.
pub fn load_prompt(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(prompt) => {
            info!(path = %path.display(), "Prompt loaded");
            prompt
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to load prompt");
            PROMPT_PLACEHOLDER.to_string()
        }
    }
}

/// Loads the catalog, or an empty one if the file is missing or broken.
pub fn load_catalog(path: &Path) -> Catalog {
    Catalog::load(path).unwrap_or_else(|e| {
        error!(path = %path.display(), error = %e, "Failed to load catalog");
        Catalog::default()
    })
}
