use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Whether a [`Totals`] value was computed locally or confirmed by the Order Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TotalsKind {
    /// Client-side estimate, for display only.
    Preview,
    /// Returned by order creation; the only value ever charged.
    Authoritative,
}

/// Money breakdown of a checkout, all amounts in the store currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub kind: TotalsKind,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub grand_total: Decimal,
}

impl Totals {
    pub fn is_authoritative(&self) -> bool {
        self.kind == TotalsKind::Authoritative
    }
}
