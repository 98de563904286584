use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::ids::AddressId;

/// Address typed in by the shopper during checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InlineAddress {
    #[validate(length(min = 1, max = 80), custom = "not_blank")]
    pub first_name: String,
    #[validate(length(min = 1, max = 80), custom = "not_blank")]
    pub last_name: String,
    #[validate(length(min = 1, max = 120), custom = "not_blank")]
    pub street: String,
    #[validate(length(min = 1, max = 120), custom = "not_blank")]
    pub city: String,
    #[validate(length(min = 1, max = 120), custom = "not_blank")]
    pub state: String,
    #[validate(length(min = 3, max = 12), custom = "not_blank")]
    pub postal_code: String,
    #[validate(length(min = 2, max = 56), custom = "not_blank")]
    pub country: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
}

impl InlineAddress {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// Address previously saved to the customer's account (Address Service shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAddress {
    pub id: AddressId,
    #[serde(default)]
    pub is_default: bool,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub phone: Option<String>,
    #[serde(rename = "type", default)]
    pub address_type: String,
}

/// The shipping destination chosen for a checkout. Exactly one shape can be
/// active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShippingSelection {
    SavedAddressRef { id: AddressId },
    InlineAddress { address: InlineAddress },
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}
