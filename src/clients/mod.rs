//! Ports onto the storefront backend. Every call returns a [`ServiceError`];
//! the orchestrator decides what that means for the checkout.

use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::models::{
    CartSnapshot, CreateOrderRequest, CreatedOrder, CustomerId, DiscountSummary, SavedAddress,
    SettlementReceipt, SettlementRequest,
};

pub mod http;

pub use http::HttpStorefrontClient;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartService: Send + Sync {
    async fn load_cart(&self, customer: &CustomerId) -> Result<CartSnapshot, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscountService: Send + Sync {
    /// Applied coupons, automatic promotions and the authoritative cart totals.
    async fn cart_discounts(&self, customer: &CustomerId)
        -> Result<DiscountSummary, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressService: Send + Sync {
    async fn saved_addresses(&self, customer: &CustomerId)
        -> Result<Vec<SavedAddress>, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Persists the order and returns it with authoritative totals.
    async fn create_order(
        &self,
        customer: &CustomerId,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentSettlementService: Send + Sync {
    /// Moves money against an existing order. A decline is `ServiceError::Declined`.
    async fn settle(
        &self,
        customer: &CustomerId,
        request: SettlementRequest,
    ) -> Result<SettlementReceipt, ServiceError>;
}
