//! CDP-backed driver for the shop's web front-end.

use async_trait::async_trait;
use grocerbot_core::config::ShopConfig;
use grocerbot_core::{CartItem, Error, Paths, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::auth_state;
use crate::cdp::CdpClient;
use crate::launcher::BrowserProcess;
use crate::page::{Locator, ShopPage};
use crate::ShopDriver;

const USER_MENU: &str = r#"[data-qa="user-menu-button"]"#;
const USER_MENU_LIST: &str = ".chakra-menu__menu-list";
const LOGIN_BUTTON: &str = r#"[data-qa="user-login-button"]"#;
const PHONE_INPUT: &str = "#kc-form-login #username";
const PHONE_SUBMIT: &str = "#fake_submit_button";
const CLEAR_TEXT: &str = "Очистить";
const CONFIRM_SCOPE: &str = ".chakra-modal__footer";
const LOGIN_LABEL: &str = "Войти";
const KEY_DELAY: Duration = Duration::from_millis(100);

/// Walks from each "remove item" button to its row and pulls out the name,
/// the raw price digits (currency sign excluded) and the quantity label.
const READ_CART_JS: &str = r#"(() => {
  const rows = [];
  const buttons = document.querySelectorAll('button[aria-label="удаление-товара-из-корзины"]');
  for (const button of buttons) {
    const container = button.parentElement && button.parentElement.parentElement;
    if (!container) continue;
    const info = container.firstElementChild;
    if (!info) continue;
    const nameEl = info.querySelector('p');
    const name = nameEl && nameEl.textContent ? nameEl.textContent.trim() : '';
    let priceDigits = '';
    const priceDiv = info.querySelector('div');
    if (priceDiv) {
      priceDigits = Array.from(priceDiv.querySelectorAll('p'))
        .filter(el => el.textContent && !el.textContent.includes('₽'))
        .map(el => el.textContent.trim())
        .join('');
    }
    let quantity = '';
    const qtyParent = button.parentElement.querySelector('div');
    if (qtyParent) {
      const qty = qtyParent.querySelector('p');
      if (qty && qty.textContent) quantity = qty.textContent.trim();
    }
    rows.push({ name, priceDigits, quantity });
  }
  return rows;
})()"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCartRow {
    #[serde(default)]
    name: String,
    #[serde(default)]
    price_digits: String,
    #[serde(default)]
    quantity: String,
}

/// The page renders rubles and kopecks as separate elements, e.g. "154" +
/// "79"; joined they read "15479" meaning 154.79.
pub fn parse_price_digits(raw: &str) -> f64 {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return 0.0;
    }
    let split = digits.len().saturating_sub(2);
    let (whole, fraction) = digits.split_at(split);
    let whole = if whole.is_empty() { "0" } else { whole };
    let fraction = format!("{:0>2}", fraction);
    format!("{}.{}", whole, fraction).parse().unwrap_or(0.0)
}

fn to_cart_item(row: RawCartRow) -> CartItem {
    let name = if row.name.is_empty() {
        "Unknown Product".to_string()
    } else {
        row.name
    };
    let quantity = if row.quantity.is_empty() {
        "1 шт".to_string()
    } else {
        row.quantity
    };
    CartItem::new(&name, parse_price_digits(&row.price_digits), &quantity)
}

pub struct CdpShopDriver {
    config: ShopConfig,
    auth_state_file: PathBuf,
    profile_dir: PathBuf,
}

impl CdpShopDriver {
    pub fn new(config: ShopConfig, paths: &Paths) -> Self {
        Self {
            config,
            auth_state_file: paths.auth_state_file(),
            profile_dir: paths.browser_profile_dir(),
        }
    }

    fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.config.wait_timeout_secs.max(1))
    }

    fn ensure_open(page: &ShopPage) -> Result<()> {
        if page.is_closed() {
            return Err(Error::Session("Browser page is closed".to_string()));
        }
        Ok(())
    }

    async fn check_login(&self, page: &ShopPage) -> std::result::Result<bool, String> {
        let menu = Locator::css(USER_MENU);
        page.hover(&menu).await?;
        let list = Locator::css(USER_MENU_LIST);
        page.wait_for(&list).await?;
        let text = page.text_content(&list).await?.unwrap_or_default();
        Ok(text.trim() != LOGIN_LABEL)
    }

    async fn run_login(&self, page: &ShopPage) -> std::result::Result<(), String> {
        page.hover(&Locator::css(USER_MENU)).await?;
        page.click(&Locator::css(LOGIN_BUTTON)).await?;
        page.wait_for_load().await?;
        page.fill(&Locator::css(PHONE_INPUT), &self.config.phone_number).await?;
        page.click(&Locator::css(PHONE_SUBMIT)).await?;
        page.wait_for(&Locator::css("#code1")).await
    }

    async fn type_code(&self, page: &ShopPage, code: &str) -> std::result::Result<(), String> {
        // Four separate inputs, #code1..#code4.
        for (i, digit) in code.chars().enumerate() {
            let input = Locator::Css(format!("#code{}", i + 1));
            page.click(&input).await?;
            page.press_key(&digit.to_string(), KEY_DELAY).await?;
        }
        page.wait_for_load().await
    }

    async fn run_clear(&self, page: &ShopPage) -> std::result::Result<(), String> {
        page.click(&Locator::button(CLEAR_TEXT)).await?;
        let confirm = Locator::button_in(CONFIRM_SCOPE, CLEAR_TEXT);
        page.click(&confirm).await?;
        page.wait_for_load().await
    }
}

#[async_trait]
impl ShopDriver for CdpShopDriver {
    type Browser = BrowserProcess;
    type Page = ShopPage;

    async fn launch(&self) -> Result<BrowserProcess> {
        BrowserProcess::launch(
            self.config.browser_path.as_deref(),
            &self.profile_dir,
            self.config.headed,
        )
        .await
        .map_err(Error::Browser)
    }

    async fn open_page(&self, browser: &BrowserProcess) -> Result<ShopPage> {
        let ws_url = browser.page_ws_url().await.map_err(Error::Browser)?;
        let cdp = CdpClient::connect(&ws_url).await.map_err(Error::Browser)?;
        for domain in ["Page", "Runtime", "DOM", "Network"] {
            cdp.enable_domain(domain).await.map_err(Error::Browser)?;
        }
        auth_state::restore(&cdp, &self.auth_state_file).await?;

        let page = ShopPage::new(cdp, self.wait_timeout());
        page.goto(&self.config.base_url).await.map_err(Error::Browser)?;
        info!(url = %self.config.base_url, "Shop page opened");
        Ok(page)
    }

    fn is_page_closed(&self, page: &ShopPage) -> bool {
        page.is_closed()
    }

    async fn is_authenticated(&self, page: &ShopPage) -> Result<bool> {
        Self::ensure_open(page)?;
        match self.check_login(page).await {
            Ok(logged_in) => Ok(logged_in),
            Err(e) => {
                // Missing menu usually means a logged-out layout.
                debug!(error = %e, "Login check failed, assuming not logged in");
                Self::ensure_open(page)?;
                Ok(false)
            }
        }
    }

    async fn begin_login(&self, page: &ShopPage) -> Result<()> {
        Self::ensure_open(page)?;
        if self.config.phone_number.trim().is_empty() {
            return Err(Error::Config("shop.phoneNumber is not configured".to_string()));
        }
        self.run_login(page).await.map_err(Error::Browser)
    }

    async fn submit_code(&self, page: &ShopPage, code: &str) -> Result<()> {
        Self::ensure_open(page)?;
        self.type_code(page, code).await.map_err(Error::Browser)?;
        info!("Verification code entered");
        auth_state::save(page.cdp(), &self.auth_state_file).await
    }

    async fn cart_has_items(&self, page: &ShopPage) -> Result<bool> {
        Self::ensure_open(page)?;
        page.goto(&self.config.cart_url).await.map_err(Error::Browser)?;
        match page.wait_for(&Locator::button(CLEAR_TEXT)).await {
            Ok(()) => Ok(true),
            Err(e) => {
                Self::ensure_open(page)?;
                debug!(error = %e, "Cart is empty or clear button not found");
                Ok(false)
            }
        }
    }

    async fn read_cart_items(&self, page: &ShopPage) -> Result<Vec<CartItem>> {
        Self::ensure_open(page)?;
        let value = page
            .evaluate(READ_CART_JS)
            .await
            .map_err(|e| Error::CartOperation(format!("Failed to read cart: {}", e)))?;
        let rows: Vec<RawCartRow> = serde_json::from_value(value)
            .map_err(|e| Error::CartOperation(format!("Unexpected cart layout: {}", e)))?;
        Ok(rows.into_iter().map(to_cart_item).collect())
    }

    async fn clear_cart(&self, page: &ShopPage) -> Result<bool> {
        Self::ensure_open(page)?;
        match self.run_clear(page).await {
            Ok(()) => Ok(true),
            Err(e) => {
                Self::ensure_open(page)?;
                error!(error = %e, "Error cleaning cart");
                Ok(false)
            }
        }
    }

    async fn close(&self, mut browser: BrowserProcess) {
        // The page connection is already gone; ask Chrome over a fresh one.
        match browser.page_ws_url().await {
            Ok(ws_url) => {
                if let Ok(cdp) = CdpClient::connect(&ws_url).await {
                    cdp.close_browser().await;
                }
            }
            Err(e) => warn!(error = %e, "Could not reach browser for graceful close"),
        }
        browser.kill().await;
        info!("Browser closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_digits() {
        assert_eq!(parse_price_digits("15479"), 154.79);
        assert_eq!(parse_price_digits("1 299 90"), 1299.90);
        assert_eq!(parse_price_digits("99"), 0.99);
        assert_eq!(parse_price_digits("5"), 0.05);
        assert_eq!(parse_price_digits(""), 0.0);
    }

    #[test]
    fn test_cart_row_defaults() {
        let item = to_cart_item(RawCartRow {
            name: String::new(),
            price_digits: "10000".to_string(),
            quantity: String::new(),
        });
        assert_eq!(item, CartItem::new("Unknown Product", 100.0, "1 шт"));
    }

    #[test]
    fn test_raw_rows_deserialize_from_page_json() {
        let value = serde_json::json!([
            {"name": "Молоко 2.5%", "priceDigits": "8999", "quantity": "2 шт"}
        ]);
        let rows: Vec<RawCartRow> = serde_json::from_value(value).unwrap();
        let items: Vec<CartItem> = rows.into_iter().map(to_cart_item).collect();
        assert_eq!(items, vec![CartItem::new("Молоко 2.5%", 89.99, "2 шт")]);
    }
}
