use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single line of the shopper's cart as supplied by the Cart Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    #[serde(alias = "price")]
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartLine {
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        unit_price: Decimal,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            unit_price,
            quantity,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Cart contents plus the client-side subtotal reported alongside them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    #[serde(alias = "items")]
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub subtotal: Decimal,
}

impl CartSnapshot {
    /// Builds a snapshot whose subtotal is derived from the lines.
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        let subtotal = lines.iter().map(CartLine::line_total).sum();
        Self { lines, subtotal }
    }

    /// A cart with no lines, or only zero-quantity lines, counts as empty.
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.quantity == 0)
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.subtotal = Decimal::ZERO;
    }
}
