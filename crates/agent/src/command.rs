use grocerbot_core::InboundMessage;

use crate::reconcile::CartDecision;

/// What an inbound chat event asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NewOrder,
    Close,
    CartItems,
    Status,
    Start,
    CartDecision(CartDecision),
    /// Verification code or a shopping request, depending on session state.
    Text(String),
    Unknown(String),
}

impl Command {
    pub fn parse(msg: &InboundMessage) -> Option<Self> {
        if let Some(data) = msg.callback_data.as_deref() {
            return Some(match CartDecision::from_callback(data) {
                Some(decision) => Command::CartDecision(decision),
                None => Command::Unknown(data.to_string()),
            });
        }
        Self::parse_text(&msg.content)
    }

    pub fn parse_text(content: &str) -> Option<Self> {
        let text = content.trim();
        if text.is_empty() {
            return None;
        }
        let Some(command) = text.strip_prefix('/') else {
            // Verbatim: a verification code must match exactly.
            return Some(Command::Text(content.to_string()));
        };
        let name = command
            .split_whitespace()
            .next()
            .unwrap_or("")
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();
        Some(match name.as_str() {
            "neworder" => Command::NewOrder,
            "close" => Command::Close,
            "cartitems" => Command::CartItems,
            "status" => Command::Status,
            "start" | "help" => Command::Start,
            _ => Command::Unknown(name),
        })
    }

    /// Shown in the queue acknowledgement and in logs.
    pub fn description(&self) -> &'static str {
        match self {
            Command::NewOrder => "Processing new order",
            Command::Close => "Closing browser session",
            Command::CartItems => "Checking cart",
            Command::Status => "Reporting status",
            Command::Start => "Showing help",
            Command::CartDecision(CartDecision::Clean) => "Cleaning cart",
            Command::CartDecision(CartDecision::Continue) => "Continuing with current items",
            Command::Text(_) => "Processing text message",
            Command::Unknown(_) => "Unknown command",
        }
    }

    /// Commands that touch the session go through the queue; the rest are
    /// answered on the spot.
    pub fn is_queued(&self) -> bool {
        matches!(
            self,
            Command::NewOrder
                | Command::Close
                | Command::CartItems
                | Command::CartDecision(_)
                | Command::Text(_)
        )
    }
}

pub const HELP_TEXT: &str = "Commands:\n\
/neworder - open the shop and log in\n\
/cartitems - show what is in the cart\n\
/status - session state and queue length\n\
/close - close the browser session\n\
\n\
After /neworder, send the 4-digit SMS code, then describe what to buy in plain words.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse_text("/neworder"), Some(Command::NewOrder));
        assert_eq!(Command::parse_text("/NewOrder@grocer_bot"), Some(Command::NewOrder));
        assert_eq!(Command::parse_text(" /cartitems "), Some(Command::CartItems));
        assert_eq!(Command::parse_text("/status"), Some(Command::Status));
        assert_eq!(
            Command::parse_text("/checkout"),
            Some(Command::Unknown("checkout".to_string()))
        );
        assert_eq!(
            Command::parse_text("2 литра молока"),
            Some(Command::Text("2 литра молока".to_string()))
        );
        assert_eq!(Command::parse_text("   "), None);
        assert_eq!(
            Command::parse_text(" 1234 "),
            Some(Command::Text(" 1234 ".to_string()))
        );
    }

    #[test]
    fn test_parse_button_press() {
        let msg = InboundMessage::callback("telegram", "99", "clean_cart");
        assert_eq!(
            Command::parse(&msg),
            Some(Command::CartDecision(CartDecision::Clean))
        );
        let msg = InboundMessage::callback("telegram", "99", "continue_with_cart");
        assert_eq!(Command::parse(&msg).unwrap().description(), "Continuing with current items");
    }

    #[test]
    fn test_status_is_not_queued() {
        assert!(!Command::Status.is_queued());
        assert!(!Command::Start.is_queued());
        assert!(Command::Text("1234".to_string()).is_queued());
        assert!(Command::CartDecision(CartDecision::Continue).is_queued());
    }
}
