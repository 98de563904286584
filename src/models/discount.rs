use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a discount line came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountSource {
    /// Coupon code entered by the shopper.
    ManualCoupon(String),
    /// Promotion rule applied automatically by the Discount Service.
    AutomaticRule(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountLine {
    pub source: DiscountSource,
    pub amount: Decimal,
}

impl DiscountLine {
    pub fn coupon(code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            source: DiscountSource::ManualCoupon(code.into()),
            amount,
        }
    }

    pub fn automatic(rule_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            source: DiscountSource::AutomaticRule(rule_id.into()),
            amount,
        }
    }

    pub fn coupon_code(&self) -> Option<&str> {
        match &self.source {
            DiscountSource::ManualCoupon(code) => Some(code),
            DiscountSource::AutomaticRule(_) => None,
        }
    }
}

/// Discount Service view of the cart: applied lines plus its authoritative
/// cart-level totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscountSummary {
    pub discount_total: Decimal,
    pub shipping: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub total: Option<Decimal>,
    pub manual: Vec<DiscountLine>,
    pub automatic: Vec<DiscountLine>,
}

impl DiscountSummary {
    pub fn lines(&self) -> impl Iterator<Item = &DiscountLine> {
        self.manual.iter().chain(self.automatic.iter())
    }

    /// The coupon forwarded to the Order Service. Upstream accepts a single
    /// code per order, so the first applied coupon wins when several are stacked.
    pub fn forwarded_coupon(&self) -> Option<&str> {
        self.manual
            .iter()
            .filter_map(DiscountLine::coupon_code)
            .find(|code| !code.is_empty())
    }
}
