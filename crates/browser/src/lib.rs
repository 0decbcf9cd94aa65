//! Browser automation for the shop.
//!
//! - `ShopDriver`: the capability surface the order session depends on
//! - `CdpShopDriver`: drives a local Chrome over the DevTools protocol
//! - Authentication survives restarts as a cookie jar on disk

pub mod auth_state;
pub mod cdp;
pub mod launcher;
pub mod page;
pub mod shop;

use async_trait::async_trait;
use grocerbot_core::{CartItem, Result};

/// Browser-side operations on the shop.
///
/// Handles are owned by the caller; the driver only borrows them. Any method
/// may fail with a timeout from the underlying page waits.
#[async_trait]
pub trait ShopDriver: Send + Sync + 'static {
    type Browser: Send + Sync;
    type Page: Send + Sync;

    async fn launch(&self) -> Result<Self::Browser>;

    /// Open the shop front page, restoring the saved auth state if present.
    async fn open_page(&self, browser: &Self::Browser) -> Result<Self::Page>;

    fn is_page_closed(&self, page: &Self::Page) -> bool;

    async fn is_authenticated(&self, page: &Self::Page) -> Result<bool>;

    /// Navigate to the login form and submit the configured phone number.
    async fn begin_login(&self, page: &Self::Page) -> Result<()>;

    /// Type the SMS code. Persists the auth state on success.
    async fn submit_code(&self, page: &Self::Page, code: &str) -> Result<()>;

    async fn cart_has_items(&self, page: &Self::Page) -> Result<bool>;

    async fn read_cart_items(&self, page: &Self::Page) -> Result<Vec<CartItem>>;

    /// `Ok(false)` when the page did not confirm the clear.
    async fn clear_cart(&self, page: &Self::Page) -> Result<bool>;

    async fn close(&self, browser: Self::Browser);
}

pub use launcher::BrowserProcess;
pub use page::{Locator, ShopPage};
pub use shop::CdpShopDriver;
