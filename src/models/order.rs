use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::address::{InlineAddress, ShippingSelection};
use super::ids::{AddressId, OrderId};
use super::totals::{Totals, TotalsKind};
use crate::errors::ServiceError;

/// Lifecycle status reported by the Order Service.
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Unknown,
}

impl From<String> for OrderStatus {
    fn from(status: String) -> Self {
        status.parse().unwrap_or(OrderStatus::Unknown)
    }
}

/// Shipping part of the order payload: a saved-address reference or the full
/// inline fields, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ShippingPayload {
    #[serde(rename_all = "camelCase")]
    Saved { address_id: AddressId },
    #[serde(rename_all = "camelCase")]
    Inline {
        shipping_name: String,
        shipping_street: String,
        shipping_city: String,
        shipping_state: String,
        shipping_zip: String,
        shipping_country: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        shipping_phone: Option<String>,
    },
}

impl From<&InlineAddress> for ShippingPayload {
    fn from(address: &InlineAddress) -> Self {
        ShippingPayload::Inline {
            shipping_name: address.full_name(),
            shipping_street: address.street.trim().to_string(),
            shipping_city: address.city.trim().to_string(),
            shipping_state: address.state.trim().to_string(),
            shipping_zip: address.postal_code.trim().to_string(),
            shipping_country: address.country.trim().to_string(),
            shipping_phone: address.phone.clone(),
        }
    }
}

impl From<&ShippingSelection> for ShippingPayload {
    fn from(selection: &ShippingSelection) -> Self {
        match selection {
            ShippingSelection::SavedAddressRef { id } => ShippingPayload::Saved {
                address_id: id.clone(),
            },
            ShippingSelection::InlineAddress { address } => ShippingPayload::from(address),
        }
    }
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(flatten)]
    pub shipping: ShippingPayload,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shipping_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
}

/// Order as confirmed by the Order Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub totals: Totals,
    pub created_at: Option<DateTime<Utc>>,
    /// Point-in-time copy of the shipping address; never edited after creation.
    pub shipping_address: serde_json::Value,
}

/// Envelope returned by `POST /orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<OrderResponseData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponseData {
    pub order: OrderRecord,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub total: Decimal,
    pub subtotal: Decimal,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shipping_address: serde_json::Value,
}

impl OrderRecord {
    /// The response has no discount field, so it is whatever closes the gap
    /// between the components and the charged total.
    pub fn authoritative_totals(&self) -> Totals {
        let discount_total =
            (self.subtotal + self.shipping_cost + self.tax - self.total).max(Decimal::ZERO);
        Totals {
            kind: TotalsKind::Authoritative,
            subtotal: self.subtotal,
            discount_total,
            shipping: self.shipping_cost,
            tax: self.tax,
            grand_total: self.total.max(Decimal::ZERO),
        }
    }
}

impl From<OrderRecord> for CreatedOrder {
    fn from(record: OrderRecord) -> Self {
        let totals = record.authoritative_totals();
        CreatedOrder {
            id: record.id,
            order_number: record.order_number,
            status: record.status,
            totals,
            created_at: record.created_at,
            shipping_address: record.shipping_address,
        }
    }
}

impl OrderResponse {
    pub fn into_created_order(self) -> Result<CreatedOrder, ServiceError> {
        if !self.success {
            return Err(ServiceError::Rejected(
                self.message
                    .unwrap_or_else(|| "Order service rejected the order".to_string()),
            ));
        }
        self.data
            .map(|data| CreatedOrder::from(data.order))
            .ok_or_else(|| ServiceError::InvalidResponse("Order payload missing".to_string()))
    }
}
