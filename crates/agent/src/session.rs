//! The single shop session: browser and page handles, login state and the
//! cached cart.
//!
//! Invariants held between tasks:
//! - a page handle exists only while a browser handle exists
//! - `AwaitingCode` and `Active` always have an open page
//! - `Inactive` holds no handles
//!
//! Every failure that leaves the page unusable tears the whole session down
//! to `Inactive` before it is reported.

use grocerbot_browser::ShopDriver;
use grocerbot_core::{CartItem, Error, Result, SessionState};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::reconcile::CartStatus;
use crate::reply::Replier;

static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}$").expect("valid regex"));

pub fn is_valid_code(text: &str) -> bool {
    CODE_RE.is_match(text)
}

pub struct ShopSession<D: ShopDriver> {
    driver: Arc<D>,
    state: SessionState,
    browser: Option<D::Browser>,
    page: Option<D::Page>,
    cart_items: Vec<CartItem>,
    state_tx: watch::Sender<SessionState>,
}

impl<D: ShopDriver> ShopSession<D> {
    pub fn new(driver: Arc<D>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Inactive);
        Self {
            driver,
            state: SessionState::Inactive,
            browser: None,
            page: None,
            cart_items: Vec::new(),
            state_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Follows state changes without going through the task queue.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn cart_items(&self) -> &[CartItem] {
        &self.cart_items
    }

    pub fn has_browser(&self) -> bool {
        self.browser.is_some()
    }

    fn page_is_open(&self) -> bool {
        self.page
            .as_ref()
            .is_some_and(|page| !self.driver.is_page_closed(page))
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active && self.page_is_open()
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "Session state changed");
        }
        self.state = next;
        self.state_tx.send_replace(next);
    }

    /// Closes both handles and falls back to `Inactive`.
    pub async fn teardown(&mut self) {
        self.page = None;
        if let Some(browser) = self.browser.take() {
            self.driver.close(browser).await;
        }
        self.cart_items.clear();
        self.transition(SessionState::Inactive);
    }

    /// Repairs whatever an earlier task may have left behind. Run at the
    /// start of every task.
    pub async fn normalize(&mut self) {
        if self.page.is_some() && self.browser.is_none() {
            warn!("Page handle without a browser, dropping it");
            self.page = None;
        }
        let consistent = if self.state.requires_page() {
            self.page_is_open()
        } else {
            // Initializing is only ever observed mid-task; seeing it here
            // means a task died.
            self.state == SessionState::Inactive && self.browser.is_none()
        };
        if !consistent {
            warn!(state = %self.state, "Inconsistent session, tearing down");
            self.teardown().await;
        }
    }

    /// Tears down on anything that leaves the page unusable. Cart errors on
    /// a live page pass through unchanged.
    async fn settle_error(&mut self, err: Error) -> Error {
        if self.page_is_open() && matches!(err, Error::CartOperation(_)) {
            return err;
        }
        warn!(error = %err, "Browser session unusable, tearing down");
        self.teardown().await;
        match err {
            Error::Session(_) => err,
            other => Error::Session(other.to_string()),
        }
    }

    /// Acquires browser and page, then either confirms an existing login
    /// (`Active`) or starts a new one (`AwaitingCode`).
    pub async fn begin_order(&mut self, reply: &Replier) -> Result<SessionState> {
        self.normalize().await;
        self.transition(SessionState::Initializing);

        if self.browser.is_none() {
            reply.say("Starting browser session...").await;
            match self.driver.launch().await {
                Ok(browser) => self.browser = Some(browser),
                Err(e) => {
                    self.teardown().await;
                    return Err(Error::Session(format!("could not start browser session: {}", e)));
                }
            }
        }

        if !self.page_is_open() {
            reply.say("Initializing browser page...").await;
            self.page = None;
            let opened = match self.browser.as_ref() {
                Some(browser) => self.driver.open_page(browser).await,
                None => Err(Error::Session("browser handle missing".to_string())),
            };
            match opened {
                Ok(page) => self.page = Some(page),
                Err(e) => {
                    self.teardown().await;
                    return Err(Error::Session(format!("failed to initialize browser page: {}", e)));
                }
            }
        }

        let logged_in = match self.check_login().await {
            Ok(logged_in) => logged_in,
            Err(e) => return Err(self.settle_error(e).await),
        };

        if logged_in {
            self.transition(SessionState::Active);
            return Ok(SessionState::Active);
        }

        reply.say("Not logged in. Navigating to login page...").await;
        let login = match self.page.as_ref() {
            Some(page) => self.driver.begin_login(page).await,
            None => Err(Error::Session("page handle missing".to_string())),
        };
        if let Err(e) = login {
            return Err(self.settle_error(e).await);
        }
        self.transition(SessionState::AwaitingCode);
        Ok(SessionState::AwaitingCode)
    }

    async fn check_login(&self) -> Result<bool> {
        match self.page.as_ref() {
            Some(page) => self.driver.is_authenticated(page).await,
            None => Err(Error::Session("page handle missing".to_string())),
        }
    }

    /// Submits the SMS code. A malformed code leaves the state untouched;
    /// an unconfirmed login tears the session down.
    pub async fn submit_code(&mut self, code: &str, reply: &Replier) -> Result<()> {
        if self.state != SessionState::AwaitingCode {
            return Err(Error::Other(format!(
                "not waiting for a verification code (state {})",
                self.state
            )));
        }
        if !is_valid_code(code) {
            debug!("Rejected verification code with wrong format");
            return Err(Error::AuthFormat("Please enter exactly 4 digits.".to_string()));
        }
        if !self.page_is_open() {
            return Err(self
                .settle_error(Error::Session("browser page is no longer available".to_string()))
                .await);
        }

        reply.say("Processing verification code...").await;
        let submitted = match self.page.as_ref() {
            Some(page) => self.driver.submit_code(page, code).await,
            None => Err(Error::Session("page handle missing".to_string())),
        };
        if let Err(e) = submitted {
            return Err(self.settle_error(e).await);
        }

        match self.check_login().await {
            Ok(true) => {
                self.transition(SessionState::Active);
                Ok(())
            }
            Ok(false) => {
                self.teardown().await;
                Err(Error::AuthFailure(
                    "Login attempt unsuccessful. Please try again with /neworder.".to_string(),
                ))
            }
            Err(e) => Err(self.settle_error(e).await),
        }
    }

    async fn ensure_active(&mut self) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(Error::Other(format!(
                "session is not active (state {})",
                self.state
            )));
        }
        if !self.page_is_open() {
            return Err(self
                .settle_error(Error::Session("browser page is closed".to_string()))
                .await);
        }
        Ok(())
    }

    /// Re-verifies the login on an active session. A logged-out page tears
    /// the session down and yields `false`.
    pub async fn verify_login(&mut self) -> Result<bool> {
        self.ensure_active().await?;
        match self.check_login().await {
            Ok(true) => Ok(true),
            Ok(false) => {
                info!("Session no longer logged in");
                self.teardown().await;
                Ok(false)
            }
            Err(e) => Err(self.settle_error(e).await),
        }
    }

    /// Reads the live cart into the cache. Read failures leave the cache as
    /// it was.
    pub async fn check_cart(&mut self) -> Result<CartStatus> {
        self.ensure_active().await?;
        let has_items = match self.page.as_ref() {
            Some(page) => self.driver.cart_has_items(page).await,
            None => Err(Error::Session("page handle missing".to_string())),
        };
        let has_items = match has_items {
            Ok(has_items) => has_items,
            Err(e) => return Err(self.settle_error(e).await),
        };

        if !has_items {
            self.cart_items.clear();
            return Ok(CartStatus::Empty);
        }

        let items = match self.page.as_ref() {
            Some(page) => self.driver.read_cart_items(page).await,
            None => Err(Error::Session("page handle missing".to_string())),
        };
        match items {
            Ok(items) => {
                info!(count = items.len(), "Cart items cached");
                self.cart_items = items.clone();
                Ok(CartStatus::HasItems(items))
            }
            Err(e) => Err(self.settle_error(e).await),
        }
    }

    /// Empties the live cart. The cache is cleared only once the page
    /// confirms it.
    pub async fn clean_cart(&mut self) -> Result<()> {
        self.ensure_active().await?;
        let cleared = match self.page.as_ref() {
            Some(page) => self.driver.clear_cart(page).await,
            None => Err(Error::Session("page handle missing".to_string())),
        };
        match cleared {
            Ok(true) => {
                info!("Cart cleaned");
                self.cart_items.clear();
                Ok(())
            }
            Ok(false) => Err(Error::CartOperation("the page did not confirm the clear".to_string())),
            Err(e) => Err(self.settle_error(e).await),
        }
    }

    /// Returns whether there was a browser to close.
    pub async fn close(&mut self) -> bool {
        let had_browser = self.browser.is_some();
        self.teardown().await;
        had_browser
    }
}
