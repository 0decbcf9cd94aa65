//! Page-level helpers on top of the raw CDP client: locate, wait, hover,
//! click, type.

use serde_json::Value;
use std::time::{Duration, Instant};

use crate::cdp::CdpClient;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Grace period after `readyState == complete` for late XHRs to land.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    /// First `<button>` (optionally inside `scope`) whose text contains `text`.
    ButtonText { scope: Option<String>, text: String },
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }

    pub fn button(text: &str) -> Self {
        Locator::ButtonText {
            scope: None,
            text: text.to_string(),
        }
    }

    pub fn button_in(scope: &str, text: &str) -> Self {
        Locator::ButtonText {
            scope: Some(scope.to_string()),
            text: text.to_string(),
        }
    }

    /// JS expression evaluating to the element or `null`.
    pub fn to_js(&self) -> String {
        match self {
            Locator::Css(sel) => format!("document.querySelector({})", js_string(sel)),
            Locator::ButtonText { scope, text } => {
                let root = match scope {
                    Some(s) => format!("document.querySelector({})", js_string(s)),
                    None => "document".to_string(),
                };
                format!(
                    "(() => {{ const root = {root}; if (!root) return null; \
                     return Array.from(root.querySelectorAll('button')) \
                     .find(b => (b.textContent || '').includes({text})) || null; }})()",
                    root = root,
                    text = js_string(text)
                )
            }
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(sel) => write!(f, "{}", sel),
            Locator::ButtonText { scope: Some(s), text } => write!(f, "{} button:has-text({:?})", s, text),
            Locator::ButtonText { scope: None, text } => write!(f, "button:has-text({:?})", text),
        }
    }
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

pub struct ShopPage {
    cdp: CdpClient,
    wait_timeout: Duration,
}

impl ShopPage {
    pub fn new(cdp: CdpClient, wait_timeout: Duration) -> Self {
        Self { cdp, wait_timeout }
    }

    pub fn cdp(&self) -> &CdpClient {
        &self.cdp
    }

    pub fn is_closed(&self) -> bool {
        self.cdp.is_closed()
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value, String> {
        self.cdp.evaluate(expression).await
    }

    pub async fn goto(&self, url: &str) -> Result<(), String> {
        self.cdp.navigate(url).await?;
        self.wait_for_load().await
    }

    /// Rough equivalent of waiting for network idle.
    pub async fn wait_for_load(&self) -> Result<(), String> {
        let start = Instant::now();
        // Navigation swaps the document; give it a moment before polling.
        tokio::time::sleep(POLL_INTERVAL).await;
        loop {
            let state = self.cdp.evaluate("document.readyState").await?;
            if state.as_str() == Some("complete") {
                break;
            }
            if start.elapsed() > self.wait_timeout {
                return Err(format!(
                    "Timed out after {}s waiting for page load",
                    self.wait_timeout.as_secs()
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }

    /// Whether the element is present and rendered right now.
    pub async fn is_visible(&self, locator: &Locator) -> Result<bool, String> {
        let expr = format!(
            "(() => {{ const el = {}; if (!el) return false; \
             const r = el.getBoundingClientRect(); return r.width > 0 && r.height > 0; }})()",
            locator.to_js()
        );
        Ok(self.cdp.evaluate(&expr).await?.as_bool().unwrap_or(false))
    }

    pub async fn wait_for(&self, locator: &Locator) -> Result<(), String> {
        let start = Instant::now();
        loop {
            if self.is_visible(locator).await? {
                return Ok(());
            }
            if start.elapsed() > self.wait_timeout {
                return Err(format!(
                    "Timed out after {}s waiting for {}",
                    self.wait_timeout.as_secs(),
                    locator
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn center_of(&self, locator: &Locator) -> Result<(f64, f64), String> {
        let expr = format!(
            "(() => {{ const el = {}; if (!el) return null; el.scrollIntoView({{block: 'center'}}); \
             const r = el.getBoundingClientRect(); return [r.x + r.width / 2, r.y + r.height / 2]; }})()",
            locator.to_js()
        );
        let value = self.cdp.evaluate(&expr).await?;
        let coords = value
            .as_array()
            .and_then(|a| Some((a.first()?.as_f64()?, a.get(1)?.as_f64()?)))
            .ok_or_else(|| format!("Element not found: {}", locator))?;
        Ok(coords)
    }

    pub async fn hover(&self, locator: &Locator) -> Result<(), String> {
        self.wait_for(locator).await?;
        let (x, y) = self.center_of(locator).await?;
        self.cdp.dispatch_mouse_event("mouseMoved", x, y).await
    }

    pub async fn click(&self, locator: &Locator) -> Result<(), String> {
        self.wait_for(locator).await?;
        let expr = format!(
            "(() => {{ const el = {}; if (!el) return false; el.focus && el.focus(); el.click(); return true; }})()",
            locator.to_js()
        );
        match self.cdp.evaluate(&expr).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(format!("Element not found: {}", locator)),
        }
    }

    pub async fn fill(&self, locator: &Locator, text: &str) -> Result<(), String> {
        self.wait_for(locator).await?;
        let expr = format!(
            "(() => {{ const el = {}; if (!el) return false; el.focus(); \
             if ('value' in el) el.value = ''; return true; }})()",
            locator.to_js()
        );
        if self.cdp.evaluate(&expr).await?.as_bool() != Some(true) {
            return Err(format!("Element not found: {}", locator));
        }
        self.cdp.insert_text(text).await
    }

    pub async fn press_key(&self, key: &str, delay: Duration) -> Result<(), String> {
        self.cdp.dispatch_key_event("keyDown", key).await?;
        tokio::time::sleep(delay).await;
        self.cdp.dispatch_key_event("keyUp", key).await
    }

    pub async fn text_content(&self, locator: &Locator) -> Result<Option<String>, String> {
        let expr = format!(
            "(() => {{ const el = {}; return el ? el.textContent : null; }})()",
            locator.to_js()
        );
        Ok(self.cdp.evaluate(&expr).await?.as_str().map(|s| s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_locator_escapes_quotes() {
        let loc = Locator::css(r#"[data-qa="user-menu-button"]"#);
        assert_eq!(
            loc.to_js(),
            r#"document.querySelector("[data-qa=\"user-menu-button\"]")"#
        );
    }

    #[test]
    fn test_button_locator_scoped() {
        let js = Locator::button_in(".chakra-modal__footer", "Очистить").to_js();
        assert!(js.contains(r#"document.querySelector(".chakra-modal__footer")"#));
        assert!(js.contains(r#"includes("Очистить")"#));
        assert!(Locator::button("Очистить").to_js().contains("const root = document;"));
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::button("Очистить").to_string(), r#"button:has-text("Очистить")"#);
        assert_eq!(Locator::css("#code1").to_string(), "#code1");
    }
}
