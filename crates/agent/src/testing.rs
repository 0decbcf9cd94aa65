//! Scripted collaborators for unit tests.

use async_trait::async_trait;
use grocerbot_browser::ShopDriver;
use grocerbot_core::{CartItem, Error, Result};
use grocerbot_providers::Provider;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct Script {
    pub launch_error: Option<String>,
    pub open_error: Option<String>,
    /// Consumed one per login check; `false` once exhausted.
    pub auth_answers: VecDeque<bool>,
    pub login_error: Option<String>,
    pub cart_has_items: bool,
    pub cart_items: Vec<CartItem>,
    pub read_error: Option<String>,
    /// `None` means the clear raises an error.
    pub clear_confirms: Option<bool>,
}

pub struct MockBrowser;

pub struct MockPage {
    closed: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct MockDriver {
    pub script: Mutex<Script>,
    pub calls: Mutex<Vec<String>>,
    pub page_closed: Arc<AtomicBool>,
}

impl MockDriver {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn close_page(&self) {
        self.page_closed.store(true, Ordering::SeqCst);
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

pub fn milk() -> CartItem {
    CartItem::new("Молоко Простоквашино 2.5% 930мл", 89.99, "2 шт")
}

pub fn cheese() -> CartItem {
    CartItem::new("Сыр Российский 200г", 210.5, "1 шт")
}

#[async_trait]
impl ShopDriver for MockDriver {
    type Browser = MockBrowser;
    type Page = MockPage;

    async fn launch(&self) -> Result<MockBrowser> {
        self.log("launch");
        match self.script.lock().unwrap().launch_error.clone() {
            Some(e) => Err(Error::Browser(e)),
            None => Ok(MockBrowser),
        }
    }

    async fn open_page(&self, _browser: &MockBrowser) -> Result<MockPage> {
        self.log("open_page");
        if let Some(e) = self.script.lock().unwrap().open_error.clone() {
            return Err(Error::Browser(e));
        }
        self.page_closed.store(false, Ordering::SeqCst);
        Ok(MockPage {
            closed: self.page_closed.clone(),
        })
    }

    fn is_page_closed(&self, page: &MockPage) -> bool {
        page.closed.load(Ordering::SeqCst)
    }

    async fn is_authenticated(&self, _page: &MockPage) -> Result<bool> {
        self.log("is_authenticated");
        Ok(self
            .script
            .lock()
            .unwrap()
            .auth_answers
            .pop_front()
            .unwrap_or(false))
    }

    async fn begin_login(&self, _page: &MockPage) -> Result<()> {
        self.log("begin_login");
        match self.script.lock().unwrap().login_error.clone() {
            Some(e) => Err(Error::Browser(e)),
            None => Ok(()),
        }
    }

    async fn submit_code(&self, _page: &MockPage, code: &str) -> Result<()> {
        self.log(&format!("submit_code:{}", code));
        Ok(())
    }

    async fn cart_has_items(&self, page: &MockPage) -> Result<bool> {
        self.log("cart_has_items");
        if self.is_page_closed(page) {
            return Err(Error::Session("Browser page is closed".to_string()));
        }
        Ok(self.script.lock().unwrap().cart_has_items)
    }

    async fn read_cart_items(&self, _page: &MockPage) -> Result<Vec<CartItem>> {
        self.log("read_cart_items");
        let script = self.script.lock().unwrap();
        match &script.read_error {
            Some(e) => Err(Error::CartOperation(e.clone())),
            None => Ok(script.cart_items.clone()),
        }
    }

    async fn clear_cart(&self, _page: &MockPage) -> Result<bool> {
        self.log("clear_cart");
        let mut script = self.script.lock().unwrap();
        match script.clear_confirms {
            Some(true) => {
                script.cart_has_items = false;
                script.cart_items.clear();
                Ok(true)
            }
            Some(false) => Ok(false),
            None => Err(Error::CartOperation("clear button missing".to_string())),
        }
    }

    async fn close(&self, _browser: MockBrowser) {
        self.log("close");
    }
}

/// Returns canned answers in order; errors once they run out.
pub struct ScriptedProvider {
    answers: Mutex<VecDeque<Result<String>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(answers: Vec<Result<String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            prompts: Mutex::new(vec![]),
        }
    }

    pub fn answering(raw: &str) -> Self {
        Self::new(vec![Ok(raw.to_string())])
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::ModelUnavailable("no scripted answer".to_string())))
    }
}
