use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;

/// Lifecycle of the single shop session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Inactive,
    Initializing,
    AwaitingCode,
    Active,
}

impl SessionState {
    /// States in which the page handle must be present.
    pub fn requires_page(&self) -> bool {
        matches!(self, SessionState::AwaitingCode | SessionState::Active)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Inactive => write!(f, "INACTIVE"),
            SessionState::Initializing => write!(f, "INITIALIZING"),
            SessionState::AwaitingCode => write!(f, "AWAITING_CODE"),
            SessionState::Active => write!(f, "ACTIVE"),
        }
    }
}

/// One line of the live cart, as read from the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub name: String,
    /// Rubles, two decimal places.
    pub price: f64,
    /// Display string such as "2 шт" or "0.5 кг".
    pub quantity: String,
}

impl CartItem {
    pub fn new(name: &str, price: f64, quantity: &str) -> Self {
        Self {
            name: name.to_string(),
            price: price.max(0.0),
            quantity: quantity.to_string(),
        }
    }
}

/// Catalog entry: what users may type, and the concrete goods it stands for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Highest priority first.
    #[serde(default)]
    pub specific_products: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: Catalog = serde_yaml::from_str(content)?;
        let total = raw.products.len();
        let products: Vec<Product> = raw
            .products
            .into_iter()
            .filter(|p| {
                let keep = p.aliases.iter().any(|a| !a.trim().is_empty());
                if !keep {
                    warn!(specific = ?p.specific_products, "Skipping product with no aliases");
                }
                keep
            })
            .collect();
        if products.len() != total {
            warn!(skipped = total - products.len(), "Some catalog entries were dropped");
        }
        Ok(Self { products })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_yaml(&content)?;
        info!(path = %path.display(), products = catalog.products.len(), "Catalog loaded");
        Ok(catalog)
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
products:
  - aliases: ["Молоко 2.5% 1л", "молоко"]
    specificProducts: ["Молоко Простоквашино 2.5% 930мл", "Молоко Домик в деревне 2.5%"]
  - aliases: []
    specificProducts: ["Сиротский товар"]
  - aliases: ["сыр"]
    specificProducts: ["Сыр Российский 200г"]
"#;

    #[test]
    fn test_catalog_skips_products_without_aliases() {
        let catalog = Catalog::from_yaml(SAMPLE).unwrap();
        assert_eq!(catalog.products.len(), 2);
        assert_eq!(catalog.products[0].specific_products[0], "Молоко Простоквашино 2.5% 930мл");
        assert_eq!(catalog.products[1].aliases, vec!["сыр".to_string()]);
    }

    #[test]
    fn test_catalog_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let catalog = Catalog::load(&path).unwrap();
        assert!(!catalog.is_empty());
    }

    #[test]
    fn test_catalog_missing_file_is_io_error() {
        let err = Catalog::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }

    #[test]
    fn test_state_display_and_page_requirement() {
        assert_eq!(SessionState::AwaitingCode.to_string(), "AWAITING_CODE");
        assert!(SessionState::Active.requires_page());
        assert!(!SessionState::Initializing.requires_page());
        assert_eq!(SessionState::default(), SessionState::Inactive);
    }

    #[test]
    fn test_cart_item_price_never_negative() {
        assert_eq!(CartItem::new("x", -3.0, "1 шт").price, 0.0);
    }
}
