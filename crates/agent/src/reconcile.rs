//! Cart reconciliation: what the live cart looks like after login, and the
//! clean-or-continue decision it may require.

use grocerbot_core::{CartItem, InlineButton};

pub const CLEAN_CART: &str = "clean_cart";
pub const CONTINUE_WITH_CART: &str = "continue_with_cart";

#[derive(Debug, Clone, PartialEq)]
pub enum CartStatus {
    Empty,
    /// Items already in the cart; the user must decide before mutating it.
    HasItems(Vec<CartItem>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartDecision {
    Clean,
    Continue,
}

impl CartDecision {
    pub fn from_callback(data: &str) -> Option<Self> {
        match data {
            CLEAN_CART => Some(CartDecision::Clean),
            CONTINUE_WITH_CART => Some(CartDecision::Continue),
            _ => None,
        }
    }

    pub fn callback_data(&self) -> &'static str {
        match self {
            CartDecision::Clean => CLEAN_CART,
            CartDecision::Continue => CONTINUE_WITH_CART,
        }
    }
}

pub fn decision_buttons() -> Vec<InlineButton> {
    vec![
        InlineButton::new("Clean cart", CLEAN_CART),
        InlineButton::new("Continue with items", CONTINUE_WITH_CART),
    ]
}

pub fn format_price(value: f64) -> String {
    format!("{:.2}", value)
}

pub fn cart_total(items: &[CartItem]) -> f64 {
    items.iter().map(|item| item.price).sum()
}

pub fn format_cart_summary(items: &[CartItem]) -> String {
    if items.is_empty() {
        return "Your cart is currently empty.".to_string();
    }
    let mut message = String::from("Your cart contains the following items:\n\n");
    for (i, item) in items.iter().enumerate() {
        message.push_str(&format!(
            "{}. {} - {} - {} ₽\n",
            i + 1,
            item.name,
            item.quantity,
            format_price(item.price)
        ));
    }
    message.push_str(&format!("\nTotal: {} ₽", format_price(cart_total(items))));
    message
}
