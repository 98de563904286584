use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::{CartLine, DiscountLine, Totals, TotalsKind};

const MONEY_SCALE: u32 = 2;

/// How shipping is priced for the preview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "amount", rename_all = "snake_case")]
pub enum ShippingPolicy {
    /// Flat free shipping, the current store policy.
    #[default]
    Free,
    /// Amount supplied by the Discount Service.
    Override(Decimal),
}

impl ShippingPolicy {
    pub fn amount(&self) -> Decimal {
        match self {
            ShippingPolicy::Free => Decimal::ZERO,
            ShippingPolicy::Override(amount) => round_money((*amount).max(Decimal::ZERO)),
        }
    }
}

/// Rounds to cents, half-up. Amounts are non-negative, so away-from-zero is half-up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Builds a [`Totals`] from its components, clamping the discount to the
/// subtotal and the grand total to zero.
pub fn assemble(
    kind: TotalsKind,
    subtotal: Decimal,
    discount_total: Decimal,
    shipping: Decimal,
    tax: Decimal,
) -> Totals {
    let subtotal = subtotal.max(Decimal::ZERO);
    let discount_total = discount_total.max(Decimal::ZERO).min(subtotal);
    let shipping = shipping.max(Decimal::ZERO);
    let tax = tax.max(Decimal::ZERO);
    let grand_total = (subtotal - discount_total + shipping + tax).max(Decimal::ZERO);

    Totals {
        kind,
        subtotal,
        discount_total,
        shipping,
        tax,
        grand_total,
    }
}

/// Pure preview calculator for cart totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalsCalculator {
    tax_rate: Decimal,
    shipping: ShippingPolicy,
    known_tax: Option<Decimal>,
}

impl TotalsCalculator {
    pub fn new(tax_rate: Decimal) -> Self {
        Self {
            tax_rate,
            shipping: ShippingPolicy::Free,
            known_tax: None,
        }
    }

    pub fn with_shipping(mut self, shipping: ShippingPolicy) -> Self {
        self.shipping = shipping;
        self
    }

    /// Tax already computed upstream replaces the rate-based estimate.
    pub fn with_known_tax(mut self, tax: Option<Decimal>) -> Self {
        self.known_tax = tax;
        self
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    /// The subtotal is the exact sum of `unit_price * quantity`; only the
    /// derived discount, shipping and tax amounts are rounded to cents.
    pub fn preview<'a, I>(&self, lines: &[CartLine], discounts: I) -> Totals
    where
        I: IntoIterator<Item = &'a DiscountLine>,
    {
        let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
        let discount_total = round_money(
            discounts
                .into_iter()
                .map(|line| line.amount.max(Decimal::ZERO))
                .sum::<Decimal>(),
        )
        .min(subtotal);
        let shipping = self.shipping.amount();
        let tax = match self.known_tax {
            Some(tax) => round_money(tax),
            None => round_money((subtotal - discount_total) * self.tax_rate),
        };

        assemble(TotalsKind::Preview, subtotal, discount_total, shipping, tax)
    }
}

/// Store-wide pricing inputs for the preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub tax_rate: Decimal,
    pub shipping: ShippingPolicy,
    pub currency: String,
}

impl PricingPolicy {
    pub fn calculator(&self) -> TotalsCalculator {
        TotalsCalculator::new(self.tax_rate).with_shipping(self.shipping)
    }
}

/// Per-component difference between a preview and the authoritative totals
/// (authoritative minus preview).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TotalsDrift {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub grand_total: Decimal,
}

impl TotalsDrift {
    pub fn is_zero(&self) -> bool {
        self.subtotal.is_zero()
            && self.discount_total.is_zero()
            && self.shipping.is_zero()
            && self.tax.is_zero()
            && self.grand_total.is_zero()
    }

    /// The shopper is charged something other than what the preview showed.
    pub fn changes_charge(&self) -> bool {
        !self.grand_total.is_zero()
    }
}

pub fn reconcile(preview: &Totals, authoritative: &Totals) -> TotalsDrift {
    TotalsDrift {
        subtotal: authoritative.subtotal - preview.subtotal,
        discount_total: authoritative.discount_total - preview.discount_total,
        shipping: authoritative.shipping - preview.shipping,
        tax: authoritative.tax - preview.tax,
        grand_total: authoritative.grand_total - preview.grand_total,
    }
}
