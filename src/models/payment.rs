use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::OrderId;
use crate::errors::CheckoutError;

const MIN_CARD_DIGITS: usize = 13;
const MAX_CARD_DIGITS: usize = 19;

/// Card fields entered inline on the payment step. Only format is checked here;
/// tokenization happens outside this crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub holder_name: String,
    pub number: String,
    /// `MM/YY`
    pub expiry: String,
    pub cvc: String,
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("holder_name", &self.holder_name)
            .field("number", &format_args!("**** {}", self.last_four()))
            .field("expiry", &self.expiry)
            .field("cvc", &"***")
            .finish()
    }
}

impl CardDetails {
    fn digits(&self) -> Vec<u32> {
        self.number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .map(|c| c.to_digit(10).unwrap_or(u32::MAX))
            .collect()
    }

    pub fn last_four(&self) -> String {
        let digits = self.digits();
        let start = digits.len().saturating_sub(4);
        digits[start..]
            .iter()
            .filter_map(|d| char::from_digit(*d, 10))
            .collect()
    }

    pub fn validate_format(&self) -> Result<(), CheckoutError> {
        if self.holder_name.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "card.holder_name cannot be empty".to_string(),
            ));
        }

        let digits = self.digits();
        if digits.iter().any(|d| *d > 9)
            || digits.len() < MIN_CARD_DIGITS
            || digits.len() > MAX_CARD_DIGITS
        {
            return Err(CheckoutError::Validation(format!(
                "card.number must contain {} to {} digits",
                MIN_CARD_DIGITS, MAX_CARD_DIGITS
            )));
        }
        if !passes_luhn(&digits) {
            return Err(CheckoutError::Validation(
                "card.number is not a valid card number".to_string(),
            ));
        }

        if !is_valid_expiry(self.expiry.trim()) {
            return Err(CheckoutError::Validation(
                "card.expiry must use the MM/YY format".to_string(),
            ));
        }

        let cvc = self.cvc.trim();
        if !(3..=4).contains(&cvc.len()) || !cvc.chars().all(|c| c.is_ascii_digit()) {
            return Err(CheckoutError::Validation(
                "card.cvc must be 3 or 4 digits".to_string(),
            ));
        }
        Ok(())
    }
}

fn passes_luhn(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                *d
            }
        })
        .sum();
    sum % 10 == 0
}

fn is_valid_expiry(expiry: &str) -> bool {
    let Some((month, year)) = expiry.split_once('/') else {
        return false;
    };
    if month.len() != 2 || year.len() != 2 {
        return false;
    }
    if !year.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    matches!(month.parse::<u8>(), Ok(1..=12))
}

/// Payment method chosen on the payment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard(CardDetails),
    Paypal,
    Other { tag: String },
}

impl PaymentMethod {
    /// Opaque tag forwarded to analytics and settlement.
    pub fn tag(&self) -> &str {
        match self {
            PaymentMethod::CreditCard(_) => "credit_card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Other { tag } => tag,
        }
    }

    pub fn validate(&self) -> Result<(), CheckoutError> {
        match self {
            PaymentMethod::CreditCard(card) => card.validate_format(),
            PaymentMethod::Paypal => Ok(()),
            PaymentMethod::Other { tag } if tag.trim().is_empty() => Err(
                CheckoutError::Validation("payment method tag cannot be empty".to_string()),
            ),
            PaymentMethod::Other { .. } => Ok(()),
        }
    }
}

/// Body of `POST /payments/settle`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRequest {
    pub order_id: OrderId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub payment_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    InFlight,
    Succeeded(String),
    Failed(String),
}

/// One settlement try against an existing order. Kept in memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub order_id: OrderId,
    pub outcome: AttemptOutcome,
    pub started_at: DateTime<Utc>,
}
